pub mod codec;
pub mod keys;
pub mod service;
