use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub library: LibraryConfig,
    pub auth: AuthConfig,
    pub observability: ObservabilityConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend: "memory" or "s3".
    pub backend: String,
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    #[serde(default)]
    pub path_style: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// How manifest appends are written back to the store.
///
/// `LastWriteWins` is the historical behavior: plain read-modify-write with
/// no version check, so two concurrent appends to the same folder can lose
/// one update. `Conditional` uses version-token writes (If-Match /
/// If-None-Match) with bounded retry instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestWriteMode {
    LastWriteWins,
    Conditional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub manifest_write_mode: ManifestWriteMode,
    /// Whether an empty subfolder listing is reported as "not found".
    ///
    /// The historical behavior conflates "folder does not exist" with
    /// "folder has files but no subfolders"; both produce an empty
    /// common-prefix listing. Set to false to return an empty list instead.
    pub empty_subfolders_as_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in the `x-api-key` request header.
    /// Empty means open mode (no authentication, development only).
    pub api_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Cap on the multipart upload body, in bytes.
    pub max_upload_body_bytes: usize,
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. config/default.toml
    /// 2. config/{env}.toml (based on PLAYBOX_ENV)
    /// 3. Environment variables (PLAYBOX_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        let default_path = Path::new("config/default.toml");
        let default_content = std::fs::read_to_string(default_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", default_path.display(), e))?;

        let mut config: AppConfig = toml::from_str(&default_content)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e))?;

        // Layer 2: environment-specific overrides
        let env_name = std::env::var("PLAYBOX_ENV").unwrap_or_else(|_| "development".to_string());
        let env_path = format!("config/{}.toml", env_name);
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            let env_config: AppConfig = toml::from_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path, e))?;
            config = env_config;
        }

        // Layer 3: environment variable overrides (selected keys)
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(v) = std::env::var("PLAYBOX_SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                config.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("PLAYBOX_STORAGE_BACKEND") {
            config.storage.backend = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_STORAGE_ENDPOINT") {
            config.storage.endpoint = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_STORAGE_BUCKET") {
            config.storage.bucket = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_STORAGE_ACCESS_KEY_ID") {
            config.storage.access_key_id = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_STORAGE_SECRET_ACCESS_KEY") {
            config.storage.secret_access_key = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_STORAGE_REGION") {
            config.storage.region = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_AUTH_API_SECRET") {
            config.auth.api_secret = v;
        }
        if let Ok(v) = std::env::var("PLAYBOX_OBSERVABILITY_LOG_LEVEL") {
            config.observability.log_level = v;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                backend: "memory".to_string(),
                endpoint: "http://localhost:9000".to_string(),
                bucket: "playbox-media".to_string(),
                access_key_id: String::new(),
                secret_access_key: String::new(),
                region: "us-east-1".to_string(),
                path_style: true,
                request_timeout_secs: 30,
            },
            library: LibraryConfig {
                manifest_write_mode: ManifestWriteMode::LastWriteWins,
                empty_subfolders_as_missing: true,
            },
            auth: AuthConfig {
                api_secret: String::new(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "json".to_string(),
            },
            security: SecurityConfig {
                max_upload_body_bytes: 104_857_600, // 100 MB
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_write_mode_is_last_write_wins() {
        let config = AppConfig::default();
        assert_eq!(
            config.library.manifest_write_mode,
            ManifestWriteMode::LastWriteWins
        );
        assert!(config.library.empty_subfolders_as_missing);
    }

    #[test]
    fn test_write_mode_parses_kebab_case() {
        let parsed: ManifestWriteMode = toml::Value::String("conditional".to_string())
            .try_into()
            .unwrap();
        assert_eq!(parsed, ManifestWriteMode::Conditional);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.storage.bucket, config.storage.bucket);
        assert_eq!(
            parsed.library.manifest_write_mode,
            config.library.manifest_write_mode
        );
    }
}
