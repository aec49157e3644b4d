// src/config/config.rs
use crate::{
    network::{backoff::BackoffPolicy, pool::ClientOptions, pool::PoolConfig},
    stats::ledger::LedgerConfig,
    utils::error::MinerError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to run a pool session: search
/// parallelism, the pool account, reconnect policy, connection
/// timings, and the rejection-rate diagnostic.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Number of search lanes to run
    /// (default: number of CPU cores; 0 also means auto-detect)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Nonces each lane hashes between job-version checks
    /// (default: 50000)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Seconds between statistics log lines
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Pool connection settings
    pub pool: PoolConfig,

    /// Reconnect backoff
    #[serde(default)]
    pub reconnect: BackoffPolicy,

    /// Connection timings
    #[serde(default)]
    pub session: SessionTimings,

    /// Rejection-rate diagnostic
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Connection timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTimings {
    /// TCP connect timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for subscribe plus authorize
    #[serde(default = "default_timeout_secs")]
    pub handshake_timeout_secs: u64,

    /// Seconds between `mining.ping` requests (0 disables)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Consecutive authorization failures before giving up
    #[serde(default = "default_max_auth_failures")]
    pub max_auth_failures: u32,
}

impl Default for SessionTimings {
    fn default() -> Self {
        SessionTimings {
            connect_timeout_secs: default_timeout_secs(),
            handshake_timeout_secs: default_timeout_secs(),
            keepalive_secs: default_keepalive_secs(),
            max_auth_failures: default_max_auth_failures(),
        }
    }
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

fn default_batch_size() -> u32 {
    50_000
}

fn default_report_interval() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_max_auth_failures() -> u32 {
    5
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(MinerError)` - If file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&config_str)
    }

    /// Parses and validates a TOML document
    pub fn from_toml(config_str: &str) -> Result<Self, MinerError> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde can't
    pub fn validate(&self) -> Result<(), MinerError> {
        self.pool.endpoint()?;

        if self.pool.username.trim().is_empty() {
            return Err(MinerError::ConfigError("pool.username is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(MinerError::ConfigError("batch_size must be positive".into()));
        }
        if self.ledger.window == 0 {
            return Err(MinerError::ConfigError("ledger.window must be positive".into()));
        }
        if !(self.ledger.rejection_threshold > 0.0 && self.ledger.rejection_threshold <= 1.0) {
            return Err(MinerError::ConfigError(format!(
                "ledger.rejection_threshold must be in (0, 1], got {}",
                self.ledger.rejection_threshold
            )));
        }
        if self.session.connect_timeout_secs == 0 || self.session.handshake_timeout_secs == 0 {
            return Err(MinerError::ConfigError("session timeouts must be positive".into()));
        }

        Ok(())
    }

    /// Lane count with 0 resolved to the number of CPUs
    pub fn effective_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    /// Pool client settings derived from this configuration
    pub fn client_options(&self) -> ClientOptions {
        let timings = &self.session;
        ClientOptions {
            connect_timeout: Duration::from_secs(timings.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(timings.handshake_timeout_secs),
            keepalive_interval: (timings.keepalive_secs > 0)
                .then(|| Duration::from_secs(timings.keepalive_secs)),
            backoff: self.reconnect.clone(),
            max_auth_failures: timings.max_auth_failures,
        }
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Stratum Miner Configuration\n\n");
        template.push_str("# Number of search lanes (0 = auto-detect)\n");
        template.push_str("worker_threads = 0\n");
        template.push_str("# Nonces per lane between job checks\n");
        template.push_str("batch_size = 50000\n");
        template.push_str("# Seconds between statistics lines\n");
        template.push_str("report_interval_secs = 60\n\n");

        template.push_str("# Pool account\n");
        template.push_str("[pool]\n");
        template.push_str("url = \"stratum+tcp://pool.example.com:3333\"\n");
        template.push_str("username = \"your_username\"\n");
        template.push_str("worker_id = \"worker01\"\n");
        template.push_str("password = \"x\"\n\n");

        template.push_str("# Reconnect policy: delay = initial * multiplier^n, capped\n");
        template.push_str("[reconnect]\n");
        template.push_str("initial_delay_ms = 5000\n");
        template.push_str("max_delay_ms = 60000\n");
        template.push_str("multiplier = 1.0\n");
        template.push_str("# Consecutive failures before giving up (0 = never)\n");
        template.push_str("max_attempts = 10\n\n");

        template.push_str("[session]\n");
        template.push_str("connect_timeout_secs = 30\n");
        template.push_str("handshake_timeout_secs = 30\n");
        template.push_str("# mining.ping period (0 = off)\n");
        template.push_str("keepalive_secs = 30\n");
        template.push_str("max_auth_failures = 5\n\n");

        template.push_str("# Warn when more than this fraction of recent shares is rejected\n");
        template.push_str("[ledger]\n");
        template.push_str("window = 20\n");
        template.push_str("rejection_threshold = 0.5\n");
        template.push_str("min_samples = 10\n");

        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [pool]
        url = "stratum+tcp://pool.example.com:3333"
        username = "alice"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.batch_size, 50_000);
        assert_eq!(config.pool.password, "x");
        assert_eq!(config.pool.worker_identity(), "alice.worker01");
        assert_eq!(config.reconnect, BackoffPolicy::default());
        assert_eq!(config.ledger, LedgerConfig::default());
        assert!(config.effective_threads() >= 1);

        let options = config.client_options();
        assert_eq!(options.handshake_timeout, Duration::from_secs(30));
        assert_eq!(options.max_auth_failures, 5);
    }

    #[test]
    fn template_is_a_valid_config() {
        let config = Config::from_toml(&Config::generate_template()).unwrap();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.session.keepalive_secs, 30);
    }

    #[test]
    fn keepalive_zero_disables_ping() {
        let config = Config::from_toml(&format!("{}\n[session]\nkeepalive_secs = 0\n", MINIMAL)).unwrap();
        assert_eq!(config.client_options().keepalive_interval, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let missing_port = MINIMAL.replace(":3333", "");
        assert!(matches!(
            Config::from_toml(&missing_port),
            Err(MinerError::ConfigError(_))
        ));

        let zero_batch = format!("batch_size = 0\n{}", MINIMAL);
        assert!(Config::from_toml(&zero_batch).is_err());

        let bad_threshold = format!("{}\n[ledger]\nrejection_threshold = 1.5\n", MINIMAL);
        assert!(Config::from_toml(&bad_threshold).is_err());

        assert!(Config::from_toml("worker_threads = 2").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/stratum-miner.toml").unwrap_err();
        assert!(matches!(err, MinerError::ConfigError(_)));
    }
}
