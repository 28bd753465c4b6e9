//! # Configuration Management Module
//!
//! Centralized, TOML-backed configuration for the BetLine gateway.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - HTTP listener and callback path
//! - [`SessionConfig`] - Session time-to-live and sweep cadence
//! - [`StorageConfig`] - Session store location
//! - [`BettingConfig`] - Stake limits and list sizes shown to callers
//! - [`ServicesConfig`] - Which adapter backend to use and its timeout
//! - [`LoggingConfig`] - Logging level and optional log file
//! - [`SecurityConfig`] - Argon2 parameters for PIN hashing (local backend)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use betline::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on {}", config.server.bind);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! name = "BetLine"
//! bind = "0.0.0.0:8080"
//! callback_path = "/ussd"
//!
//! [session]
//! ttl_minutes = 5
//! sweep_interval_seconds = 60
//!
//! [services]
//! mode = "local"
//! timeout_seconds = 5
//! ```

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub betting: BettingConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
    pub security: Option<SecurityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Brand shown in the main menu header
    pub name: String,
    /// Socket address for the callback listener
    pub bind: String,
    /// Path the gateway POSTs callbacks to
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_callback_path() -> String {
    "/ussd".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Rolling inactivity window; every successful update extends it by this much
    pub ttl_minutes: u32,
    /// How often the background sweeper deletes expired records (0 disables)
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 5,
            sweep_interval_seconds: 60,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ttl_minutes.max(1) as i64)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Keep sessions in memory instead of sled (single-node development)
    #[serde(default)]
    pub in_memory: bool,
}

impl StorageConfig {
    pub fn sessions_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("sessions")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingConfig {
    pub currency: String,
    pub min_stake: Decimal,
    #[serde(default)]
    pub max_stake: Option<Decimal>,
    /// Markets shown for one event
    pub max_markets: usize,
    /// Sports, events and bets shown per list screen
    pub max_list_items: usize,
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self {
            currency: "KES".to_string(),
            min_stake: Decimal::new(10, 0),
            max_stake: Some(Decimal::new(100_000, 0)),
            max_markets: 5,
            max_list_items: 5,
        }
    }
}

/// Which adapter backend serves the user directory, wallet, catalog and betting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// In-process backend seeded from a JSON file (development, demos)
    Local,
    /// Remote JSON/HTTP collaborators
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub mode: ServiceMode,
    /// Base URL of the remote services (http mode)
    #[serde(default)]
    pub base_url: String,
    /// Bound applied to every adapter call
    pub timeout_seconds: u64,
    /// Catalog and demo-account seed for local mode
    #[serde(default)]
    pub seed_file: Option<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            mode: ServiceMode::Local,
            base_url: "http://127.0.0.1:9000".to_string(),
            timeout_seconds: 5,
            seed_file: Some("data/seeds/catalog.json".to_string()),
        }
    }
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

impl Argon2Config {
    /// Build argon2 params, falling back to the library defaults for unset fields.
    pub fn params(&self) -> Result<argon2::Params> {
        let d = argon2::Params::default();
        argon2::Params::new(
            self.memory_kib.unwrap_or(d.m_cost()),
            self.time_cost.unwrap_or(d.t_cost()),
            self.parallelism.unwrap_or(d.p_cost()),
            None,
        )
        .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject settings that would make the menus unusable.
    pub fn validate(&self) -> Result<()> {
        if self.betting.max_list_items == 0 || self.betting.max_list_items > 9 {
            return Err(anyhow!("betting.max_list_items must be between 1 and 9"));
        }
        if self.betting.max_markets == 0 || self.betting.max_markets > 9 {
            return Err(anyhow!("betting.max_markets must be between 1 and 9"));
        }
        if self.betting.min_stake <= Decimal::ZERO {
            return Err(anyhow!("betting.min_stake must be positive"));
        }
        if let Some(max) = self.betting.max_stake {
            if max < self.betting.min_stake {
                return Err(anyhow!("betting.max_stake must be >= min_stake"));
            }
        }
        if self.services.mode == ServiceMode::Http && self.services.base_url.is_empty() {
            return Err(anyhow!("services.base_url is required in http mode"));
        }
        if !self.server.callback_path.starts_with('/') {
            return Err(anyhow!("server.callback_path must start with '/'"));
        }
        Ok(())
    }

    /// Argon2 parameters for the local backend, if configured
    pub fn argon2_params(&self) -> Result<Option<argon2::Params>> {
        match self.security.as_ref().and_then(|s| s.argon2.as_ref()) {
            Some(cfg) => cfg.params().map(Some),
            None => Ok(None),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                name: "BetLine".to_string(),
                bind: "0.0.0.0:8080".to_string(),
                callback_path: default_callback_path(),
            },
            session: SessionConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                in_memory: false,
            },
            betting: BettingConfig::default(),
            services: ServicesConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("betline.log".to_string()),
                security_file: Some("betline-security.log".to_string()),
            },
            security: Some(SecurityConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.server.callback_path, "/ussd");
    }

    #[test]
    fn test_config_toml_roundtrip_keeps_money_exact() {
        let mut config = Config::default();
        config.betting.min_stake = Decimal::new(2550, 2);
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.betting.min_stake, Decimal::new(2550, 2));
        assert_eq!(parsed.services.mode, ServiceMode::Local);
    }

    #[test]
    fn test_minimal_file_uses_section_defaults() {
        let text = r#"
            [server]
            name = "Test"
            bind = "127.0.0.1:0"

            [storage]
            data_dir = "/tmp/x"

            [logging]
            level = "debug"
        "#;
        let parsed: Config = toml::from_str(text).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.session.ttl_minutes, 5);
        assert_eq!(parsed.betting.max_list_items, 5);
        assert!(parsed.security.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut config = Config::default();
        config.betting.max_list_items = 12;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.betting.max_stake = Some(Decimal::new(1, 0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sweep_interval_zero_disables() {
        let cfg = SessionConfig {
            ttl_minutes: 5,
            sweep_interval_seconds: 0,
        };
        assert!(cfg.sweep_interval().is_none());
    }
}
