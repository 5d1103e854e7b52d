use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "STACKS_ENV";
const CONFIG_DIR_ENV: &str = "STACKS_CONFIG_DIR";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, and environment overlay.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Default to repo root `config` directory.
                std::env::current_dir()
                    .map(|cwd| cwd.join("config"))
                    .expect("unable to resolve current directory")
            });

        let base_path = config_dir.join("base.toml");
        let environment_filename = format!("{}.toml", environment);
        let environment_path = config_dir.join(environment_filename);

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            // Double-underscore separator so snake_case keys stay addressable:
            // STACKS_STORAGE__ACCESS_KEY -> storage.access_key.
            .add_source(
                config::Environment::with_prefix("STACKS")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // Override environment field with parsed enum variant.
        settings.environment = match environment.as_str() {
            "local" => Environment::Local,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                return Err(anyhow!(
                    "unsupported environment '{}'; expected local/staging/production",
                    other
                ));
            }
        };

        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        3000
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Document-store connection parameters (endpoint + master key pair).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_endpoint")]
    pub endpoint: String,
    /// Base64-encoded master key. Empty means "not configured"; the store
    /// client rejects it at connect time.
    #[serde(default)]
    pub key: String,
    #[serde(default = "DatabaseSettings::default_database")]
    pub database: String,
    #[serde(default = "DatabaseSettings::default_collection")]
    pub collection: String,
}

impl DatabaseSettings {
    fn default_endpoint() -> String {
        "https://127.0.0.1:8081".to_string()
    }

    fn default_database() -> String {
        "BookstoreDB".to_string()
    }

    fn default_collection() -> String {
        "Books".to_string()
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            key: String::new(),
            database: Self::default_database(),
            collection: Self::default_collection(),
        }
    }
}

/// Blob storage account parameters for cover images.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "StorageSettings::default_account")]
    pub account: String,
    /// Base64-encoded account access key.
    #[serde(default = "StorageSettings::default_access_key")]
    pub access_key: String,
    #[serde(default = "StorageSettings::default_container")]
    pub container: String,
    /// Optional endpoint override for local emulators. When absent the
    /// canonical `https://{account}.blob.core.windows.net` endpoint is used.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl StorageSettings {
    fn default_account() -> String {
        // Azurite well-known development account.
        "devstoreaccount1".to_string()
    }

    fn default_access_key() -> String {
        // Azurite well-known development key (a published constant, not a secret).
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw=="
            .to_string()
    }

    fn default_container() -> String {
        "covers".to_string()
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            account: Self::default_account(),
            access_key: Self::default_access_key(),
            container: Self::default_container(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Routing-layer guard configuration. With no key configured every route is
/// open, matching the reference deployment.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn default_listen_port_is_3000() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn default_catalog_names() {
        let settings = Settings::default();
        assert_eq!(settings.database.database, "BookstoreDB");
        assert_eq!(settings.database.collection, "Books");
        assert_eq!(settings.storage.container, "covers");
    }

    #[test]
    fn guard_is_open_by_default() {
        let settings = Settings::default();
        assert!(settings.auth.api_key.is_none());
    }

    #[test]
    fn env_overrides_reach_underscored_keys() {
        std::env::set_var("STACKS_STORAGE__ACCESS_KEY", "a2V5LWZyb20tZW52");
        std::env::set_var("STACKS_SERVER__REQUEST_TIMEOUT_MS", "2500");
        std::env::set_var("STACKS_DATABASE__KEY", "ZGIta2V5");

        let settings = Settings::load().unwrap();

        std::env::remove_var("STACKS_STORAGE__ACCESS_KEY");
        std::env::remove_var("STACKS_SERVER__REQUEST_TIMEOUT_MS");
        std::env::remove_var("STACKS_DATABASE__KEY");

        assert_eq!(settings.storage.access_key, "a2V5LWZyb20tZW52");
        assert_eq!(settings.server.request_timeout_ms, 2500);
        assert_eq!(settings.database.key, "ZGIta2V5");
    }
}
