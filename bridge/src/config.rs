use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://fullnode.devnet.aptoslabs.com/v1";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub coin: CoinConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Fullnode REST endpoint, including the `/v1` prefix
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Upper bound for a single HTTP request to the node
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Where the GreenPoints module lives under the admin address
#[derive(Debug, Deserialize, Clone)]
pub struct CoinConfig {
    #[serde(default = "default_module")]
    pub module: String,
    #[serde(default = "default_coin_struct")]
    pub coin_struct: String,
    #[serde(default = "default_decimals")]
    pub default_decimals: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    #[serde(default = "default_confirmation_interval_ms")]
    pub confirmation_interval_ms: u64,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

/// Fixed-interval poll with an overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Number of checks that fit in the window, counting the immediate one.
    pub fn attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        u32::try_from(self.timeout.as_millis() / interval)
            .unwrap_or(u32::MAX)
            .max(1)
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_module() -> String {
    "green_points".to_string()
}

fn default_coin_struct() -> String {
    "GreenPoints".to_string()
}

fn default_decimals() -> u8 {
    8
}

fn default_discovery_interval_ms() -> u64 {
    500
}

fn default_discovery_timeout_ms() -> u64 {
    10_000
}

fn default_confirmation_interval_ms() -> u64 {
    800
}

fn default_confirmation_timeout_ms() -> u64 {
    20_000
}

fn default_relay_timeout_ms() -> u64 {
    10_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for CoinConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            coin_struct: default_coin_struct(),
            default_decimals: default_decimals(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            discovery_interval_ms: default_discovery_interval_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            confirmation_interval_ms: default_confirmation_interval_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_relay_timeout_ms(),
        }
    }
}

impl LedgerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CoinConfig {
    /// `<admin>::<module>::<struct>`
    pub fn coin_type(&self, admin: &str) -> String {
        format!("{}::{}::{}", admin, self.module, self.coin_struct)
    }

    /// `<admin>::<module>::<entry>`
    pub fn entry_function(&self, admin: &str, entry: &str) -> String {
        format!("{}::{}::{}", admin, self.module, entry)
    }
}

impl WalletConfig {
    pub fn discovery(&self) -> PollSettings {
        PollSettings::new(
            Duration::from_millis(self.discovery_interval_ms),
            Duration::from_millis(self.discovery_timeout_ms),
        )
    }

    pub fn confirmation(&self) -> PollSettings {
        PollSettings::new(
            Duration::from_millis(self.confirmation_interval_ms),
            Duration::from_millis(self.confirmation_timeout_ms),
        )
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BridgeConfig {
    /// Load from a TOML file. A missing file means "all defaults".
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BridgeConfig =
            toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!(
            "Loaded bridge config: rpc={}, coin=<admin>::{}::{}",
            config.ledger.rpc_url,
            config.coin.module,
            config.coin.coin_struct
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ledger.rpc_url.trim().is_empty() {
            anyhow::bail!("ledger.rpc_url must not be empty");
        }
        if self.ledger.request_timeout_ms == 0 {
            anyhow::bail!("ledger.request_timeout_ms must be greater than zero");
        }

        for (name, poll) in [
            ("wallet.discovery", self.wallet.discovery()),
            ("wallet.confirmation", self.wallet.confirmation()),
        ] {
            if poll.interval.is_zero() {
                anyhow::bail!("{} interval must be greater than zero", name);
            }
            if poll.interval > poll.timeout {
                anyhow::bail!(
                    "{} interval ({:?}) exceeds its timeout ({:?})",
                    name,
                    poll.interval,
                    poll.timeout
                );
            }
        }

        if self.relay.timeout_ms == 0 {
            anyhow::bail!("relay.timeout_ms must be greater than zero");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config.ledger.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.coin.default_decimals, 8);
        assert_eq!(config.wallet.discovery().attempts(), 20);
        assert_eq!(config.wallet.confirmation().interval, Duration::from_millis(800));
        assert_eq!(config.relay.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_sections() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [ledger]
            rpc_url = "http://localhost:8080/v1"

            [wallet]
            confirmation_timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.rpc_url, "http://localhost:8080/v1");
        assert_eq!(config.wallet.confirmation_timeout_ms, 5000);
        assert_eq!(config.wallet.discovery_interval_ms, 500);
        assert_eq!(config.coin.coin_type("0xA"), "0xA::green_points::GreenPoints");
        assert_eq!(
            config.coin.entry_function("0xA", "award"),
            "0xA::green_points::award"
        );
    }

    #[test]
    fn test_rejects_interval_longer_than_timeout() {
        let err = BridgeConfig::from_toml_str(
            r#"
            [wallet]
            discovery_interval_ms = 2000
            discovery_timeout_ms = 1000
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("wallet.discovery"));
    }

    #[test]
    fn test_attempts_saturate_instead_of_wrapping() {
        let poll = PollSettings::new(Duration::from_millis(1), Duration::from_secs(u64::MAX / 1_000));
        assert_eq!(poll.attempts(), u32::MAX);

        let tiny = PollSettings::new(Duration::from_millis(500), Duration::from_millis(100));
        assert_eq!(tiny.attempts(), 1);
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        let err = BridgeConfig::from_toml_str("[ledger]\nrequest_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("request_timeout_ms"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = BridgeConfig::load("/nonexistent/greenpoints.toml").unwrap();
        assert_eq!(config.coin.module, "green_points");
    }
}
