//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the file named by `PAPERBOOK_CONFIG`) and
//! deserializes it into strongly-typed structs. Secrets (API keys, the admin
//! token) are referenced by env-var name in the config and resolved once at
//! startup into [`Secrets`].

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

/// Env var holding the config file path.
pub const CONFIG_PATH_ENV: &str = "PAPERBOOK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub odds: OddsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `["*"]` allows any.
    pub cors_origins: Vec<String>,
    /// Env var holding the token required by privileged routes.
    /// When unset or empty, privileged routes are disabled.
    pub admin_token_env: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            cors_origins: vec!["*".to_string()],
            admin_token_env: Some("PAPERBOOK_ADMIN_TOKEN".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://paperbook.db".to_string(),
            max_connections: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WalletConfig {
    /// Wallet row used by this deployment (single-user variant).
    pub id: String,
    pub initial_balance: Decimal,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            id: "main_wallet".to_string(),
            initial_balance: dec!(1000),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OddsConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub regions: String,
    pub odds_format: String,
    pub default_markets: String,
    pub cache_ttl_hours: i64,
    pub request_timeout_secs: u64,
    /// Store provider failures as (empty) cache entries for the full TTL.
    pub cache_failures: bool,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.the-odds-api.com/v4".to_string(),
            api_key_env: "ODDS_API_KEY".to_string(),
            regions: "us".to_string(),
            odds_format: "american".to_string(),
            default_markets: "h2h,spreads,totals".to_string(),
            cache_ttl_hours: 24,
            request_timeout_secs: 30,
            cache_failures: false,
        }
    }
}

impl OddsConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }
}

/// Secrets resolved from the environment at startup.
#[derive(Clone, Default)]
pub struct Secrets {
    pub odds_api_key: Option<SecretString>,
    pub admin_token: Option<SecretString>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `PAPERBOOK_CONFIG` or `config.toml`, falling back to
    /// defaults when the default file does not exist.
    pub fn load_default() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(&path),
            Err(_) if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load(DEFAULT_CONFIG_PATH)
            }
            Err(_) => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.wallet.initial_balance >= Decimal::ZERO,
            "wallet.initial_balance must not be negative"
        );
        anyhow::ensure!(
            self.odds.cache_ttl_hours > 0,
            "odds.cache_ttl_hours must be positive"
        );
        anyhow::ensure!(
            self.storage.max_connections > 0,
            "storage.max_connections must be positive"
        );
        Ok(())
    }

    /// Resolve secrets referenced by env-var name. Missing values are
    /// treated as "not configured".
    pub fn resolve_secrets(&self) -> Secrets {
        let lookup = |name: &str| {
            Self::resolve_env(name)
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::new)
        };
        Secrets {
            odds_api_key: lookup(&self.odds.api_key_env),
            admin_token: self.server.admin_token_env.as_deref().and_then(lookup),
        }
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
