//! Multi-source settlement verifier.
//!
//! For each network an ordered provider chain is tried: primary node,
//! secondary node, REST lookup. A provider error (unreachable, timed out,
//! unusable response) falls through to the next source; a definitive answer
//! (found, or a clean not-found) ends the chain for that network. Exhausting
//! every source without confirmation is a definitive negative verdict, not
//! an error.

use crate::config::LedgerConfig;
use crate::error::Result;
use crate::ledger::{
    ExpectedPayment, JsonRpcProvider, LedgerProvider, LedgerTx, Network, RestLookupProvider,
    TxLookup,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered providers for one network.
pub struct ProviderChain {
    /// Network every provider in the chain reads from.
    pub network: Network,
    /// Providers in fallback order.
    pub providers: Vec<Arc<dyn LedgerProvider>>,
}

/// A confirmed settlement.
#[derive(Debug, Clone)]
pub struct Confirmation {
    /// Network the transaction was confirmed on.
    pub network: Network,
    /// The confirming transaction.
    pub tx: LedgerTx,
}

/// Settlement verifier over ordered provider chains.
pub struct LedgerVerifier {
    chains: Vec<ProviderChain>,
    hop_timeout: Duration,
}

impl LedgerVerifier {
    /// Create a verifier over explicit provider chains.
    ///
    /// Chains are consulted in the given order; callers are expected to put
    /// the main network first.
    #[must_use]
    pub fn new(chains: Vec<ProviderChain>, hop_timeout: Duration) -> Self {
        Self {
            chains,
            hop_timeout,
        }
    }

    /// Build the standard two-network verifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.lookup_timeout_ms);
        let chains = vec![
            Self::chain(Network::Main, &config.main, timeout)?,
            Self::chain(Network::Test, &config.test, timeout)?,
        ];
        Ok(Self::new(chains, timeout))
    }

    fn chain(
        network: Network,
        endpoints: &crate::config::NetworkEndpoints,
        timeout: Duration,
    ) -> Result<ProviderChain> {
        let tag = network.as_str();
        Ok(ProviderChain {
            network,
            providers: vec![
                Arc::new(JsonRpcProvider::new(
                    network,
                    format!("{tag}/primary"),
                    &endpoints.primary_node,
                    timeout,
                )?),
                Arc::new(JsonRpcProvider::new(
                    network,
                    format!("{tag}/secondary"),
                    &endpoints.secondary_node,
                    timeout,
                )?),
                Arc::new(RestLookupProvider::new(
                    network,
                    format!("{tag}/rest"),
                    &endpoints.rest_lookup,
                    timeout,
                )?),
            ],
        })
    }

    /// Verify that `txid` settled as `expected` on some network.
    ///
    /// Chains are exhausted in order; the first network on which the
    /// transaction is found and satisfies the expectation wins. `None`
    /// means no network confirmed.
    pub async fn verify(&self, txid: &str, expected: &ExpectedPayment) -> Option<Confirmation> {
        for chain in &self.chains {
            if let Some(tx) = self.check_network(chain, txid, expected).await {
                info!(
                    network = chain.network.as_str(),
                    %txid,
                    "Settlement confirmed"
                );
                return Some(Confirmation {
                    network: chain.network,
                    tx,
                });
            }
        }

        debug!(%txid, "Settlement not confirmed on any network");
        None
    }

    /// Walk one network's provider chain until a definitive answer.
    async fn check_network(
        &self,
        chain: &ProviderChain,
        txid: &str,
        expected: &ExpectedPayment,
    ) -> Option<LedgerTx> {
        for provider in &chain.providers {
            let lookup = tokio::time::timeout(self.hop_timeout, provider.lookup(txid)).await;
            match lookup {
                Ok(Ok(TxLookup::Found(tx))) => {
                    if tx.satisfies(expected) {
                        debug!(provider = provider.label(), %txid, "Transaction accepted");
                        return Some(tx);
                    }
                    debug!(
                        provider = provider.label(),
                        %txid,
                        "Transaction found but does not satisfy expectation"
                    );
                    return None;
                }
                Ok(Ok(TxLookup::NotFound)) => {
                    debug!(provider = provider.label(), %txid, "Transaction not found");
                    return None;
                }
                Ok(Err(e)) => {
                    warn!(provider = provider.label(), %txid, "Provider failed: {e}");
                }
                Err(_) => {
                    warn!(provider = provider.label(), %txid, "Provider timed out");
                }
            }
        }

        debug!(
            network = chain.network.as_str(),
            %txid,
            "All providers exhausted without a definitive answer"
        );
        None
    }
}
