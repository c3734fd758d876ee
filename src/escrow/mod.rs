//! Escrow execution record reconciliation.
//!
//! The downstream execution service owns the records; this client only
//! creates, checks and deletes them. All three operations are idempotent:
//! adding an existing record and deleting an absent one are not errors,
//! per the downstream contract.

use crate::config::EscrowConfig;
use crate::error::{Error, Result};
use crate::ledger::Network;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Key of one escrow execution record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscrowKey {
    /// Escrow owner account.
    pub account: String,
    /// Sequence number of the escrow create transaction.
    pub sequence: u32,
    /// Whether the escrow lives on the test network.
    pub testnet: bool,
}

impl EscrowKey {
    /// Whether a settlement confirmed on `network` may satisfy this escrow.
    ///
    /// A test escrow accepts either network; a main escrow only main.
    #[must_use]
    pub fn accepts_network(&self, network: Network) -> bool {
        self.testnet || !network.is_test()
    }
}

/// REST client for the escrow execution service.
pub struct EscrowClient {
    base_url: String,
    client: reqwest::Client,
}

impl EscrowClient {
    /// Create a client from escrow configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &EscrowConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn record_url(&self, key: &EscrowKey) -> String {
        let network = if key.testnet { "test" } else { "main" };
        format!(
            "{}/records/{network}/{}/{}",
            self.base_url, key.account, key.sequence
        )
    }

    /// Whether an execution record exists for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the service is unreachable.
    pub async fn exists(&self, key: &EscrowKey) -> Result<bool> {
        let response = self
            .client
            .get(self.record_url(key))
            .send()
            .await
            .map_err(|e| Error::Escrow(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response
            .error_for_status()
            .map_err(|e| Error::Escrow(e.to_string()))?;
        Ok(true)
    }

    /// Create an execution record. A record that already exists is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the service is unreachable or rejects the
    /// record for any reason other than prior existence.
    pub async fn add(&self, key: &EscrowKey) -> Result<()> {
        debug!(account = %key.account, sequence = key.sequence, "Adding escrow record");
        let response = self
            .client
            .put(self.record_url(key))
            .send()
            .await
            .map_err(|e| Error::Escrow(e.to_string()))?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!(account = %key.account, sequence = key.sequence, "Escrow record already exists");
            return Ok(());
        }
        response
            .error_for_status()
            .map_err(|e| Error::Escrow(e.to_string()))?;
        Ok(())
    }

    /// Delete an execution record. Deleting an absent record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the service is unreachable.
    pub async fn delete(&self, key: &EscrowKey) -> Result<()> {
        debug!(account = %key.account, sequence = key.sequence, "Deleting escrow record");
        let response = self
            .client
            .delete(self.record_url(key))
            .send()
            .await
            .map_err(|e| Error::Escrow(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        response
            .error_for_status()
            .map_err(|e| Error::Escrow(e.to_string()))?;
        Ok(())
    }
}
