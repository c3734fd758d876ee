//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;
use xrplink_node::config::EscrowConfig;
use xrplink_node::NodeConfig;

/// Payload ownership and ledger validation service.
#[derive(Debug, Parser)]
#[command(name = "xrplink-node", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "XRPLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory for node data (overrides the config file).
    #[arg(long)]
    pub root_dir: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value = "info", env = "XRPLINK_LOG")]
    pub log_level: String,

    /// Signing platform API key.
    #[arg(long, env = "XRPLINK_PLATFORM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Escrow execution service base URL; enables escrow flows.
    #[arg(long, env = "XRPLINK_ESCROW_URL")]
    pub escrow_url: Option<String>,
}

impl Cli {
    /// Build the node configuration from file and CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn into_config(self) -> xrplink_node::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None => NodeConfig::default(),
        };

        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(api_key) = self.api_key {
            config.platform.api_key = Some(api_key);
        }
        if let Some(base_url) = self.escrow_url {
            config.escrow = Some(EscrowConfig {
                base_url,
                timeout_secs: 10,
            });
        }
        config.log_level = self.log_level;

        Ok(config)
    }
}
