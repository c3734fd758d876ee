//! Configuration for xrplink-node.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root directory for node data.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Signing platform configuration.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Ledger provider configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Escrow execution service configuration (absent = escrow flows disabled).
    #[serde(default)]
    pub escrow: Option<EscrowConfig>,

    /// Pending-request bookkeeping configuration.
    #[serde(default)]
    pub pending: PendingConfig,

    /// Number of (origin, application) policies kept in the in-memory cache.
    #[serde(default = "default_policy_cache_capacity")]
    pub policy_cache_capacity: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Signing platform endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the signing platform API.
    #[serde(default = "default_platform_url")]
    pub base_url: String,

    /// API key for platform requests.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
}

/// Endpoints for one ledger network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEndpoints {
    /// Primary JSON-RPC node.
    pub primary_node: String,

    /// Secondary JSON-RPC node, tried when the primary is unreachable.
    pub secondary_node: String,

    /// Stateless REST transaction-lookup fallback.
    pub rest_lookup: String,
}

/// Ledger provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Mainnet endpoints.
    #[serde(default = "default_main_endpoints")]
    pub main: NetworkEndpoints,

    /// Testnet endpoints.
    #[serde(default = "default_test_endpoints")]
    pub test: NetworkEndpoints,

    /// Per-hop connect/query timeout in milliseconds.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

/// Escrow execution service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Base URL of the escrow execution REST service.
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_escrow_timeout")]
    pub timeout_secs: u64,
}

/// Pending-request bookkeeping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfig {
    /// How often the sweep runs, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Fallback time-to-live for pending records whose payload carries no
    /// expiry of its own, in seconds.
    #[serde(default = "default_pending_ttl")]
    pub default_ttl_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            platform: PlatformConfig::default(),
            ledger: LedgerConfig::default(),
            escrow: None,
            pending: PendingConfig::default(),
            policy_cache_capacity: default_policy_cache_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            api_key: None,
            timeout_secs: default_platform_timeout(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            main: default_main_endpoints(),
            test: default_test_endpoints(),
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            default_ttl_secs: default_pending_ttl(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "xrplink")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".xrplink"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_platform_url() -> String {
    "https://platform.xrplink.dev/api/v1".to_string()
}

fn default_main_endpoints() -> NetworkEndpoints {
    NetworkEndpoints {
        primary_node: "https://xrplcluster.com".to_string(),
        secondary_node: "https://s2.ripple.com:51234".to_string(),
        rest_lookup: "https://api.xrpscan.com/api/v1/tx".to_string(),
    }
}

fn default_test_endpoints() -> NetworkEndpoints {
    NetworkEndpoints {
        primary_node: "https://s.altnet.rippletest.net:51234".to_string(),
        secondary_node: "https://testnet.xrpl-labs.com".to_string(),
        rest_lookup: "https://testnet.data.xrpl.org/v1/tx".to_string(),
    }
}

const fn default_platform_timeout() -> u64 {
    15
}

const fn default_escrow_timeout() -> u64 {
    10
}

const fn default_lookup_timeout() -> u64 {
    7_500
}

const fn default_sweep_interval() -> u64 {
    600 // 10 minutes
}

const fn default_pending_ttl() -> u64 {
    86_400 // 24 hours
}

const fn default_policy_cache_capacity() -> usize {
    10_000
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
