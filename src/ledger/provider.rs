//! Ledger read providers.
//!
//! Two provider kinds exist: JSON-RPC nodes queried with the `tx` method,
//! and a stateless REST transaction lookup used as the last fallback. Both
//! normalize their responses into [`LedgerTx`] so the verifier treats every
//! source identically.

use crate::error::{Error, Result};
use crate::ledger::{drops_to_xrp_value, DeliveredAmount, LedgerTx, Network, NATIVE_CURRENCY};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Outcome of a transaction lookup on one provider.
#[derive(Debug, Clone)]
pub enum TxLookup {
    /// The transaction exists on this network.
    Found(LedgerTx),
    /// The provider answered definitively: no such transaction.
    NotFound,
}

/// A read-only source of ledger transaction data.
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    /// Label used in logs, e.g. `main/primary`.
    fn label(&self) -> &str;

    /// The network this provider reads from.
    fn network(&self) -> Network;

    /// Look up a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider is unreachable or its response is
    /// unusable; the verifier falls through to the next source.
    async fn lookup(&self, txid: &str) -> Result<TxLookup>;
}

/// Raw amount as ledger APIs report it: a drops string for native, an
/// object for issued currencies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Drops(String),
    Issued {
        currency: String,
        issuer: Option<String>,
        value: String,
    },
}

impl RawAmount {
    fn normalize(self) -> Option<DeliveredAmount> {
        match self {
            Self::Drops(drops) => {
                let drops: u64 = drops.trim().parse().ok()?;
                Some(DeliveredAmount {
                    currency: NATIVE_CURRENCY.to_string(),
                    issuer: None,
                    value: drops_to_xrp_value(drops),
                })
            }
            Self::Issued {
                currency,
                issuer,
                value,
            } => Some(DeliveredAmount {
                currency,
                issuer,
                value,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxMeta {
    #[serde(rename = "TransactionResult")]
    transaction_result: Option<String>,
    #[serde(default)]
    delivered_amount: Option<RawAmount>,
}

/// Transaction body shared by the JSON-RPC `tx` result and the REST lookup
/// response.
#[derive(Debug, Deserialize)]
struct TxBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "TransactionType", default)]
    tx_type: Option<String>,
    #[serde(rename = "Destination", default)]
    destination: Option<String>,
    #[serde(rename = "DestinationTag", default)]
    destination_tag: Option<u32>,
    #[serde(default)]
    validated: bool,
    #[serde(default)]
    meta: Option<TxMeta>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: TxBody,
}

const TXN_NOT_FOUND: &str = "txnNotFound";

impl TxBody {
    fn normalize(self, label: &str) -> Result<TxLookup> {
        if let Some(error) = self.error {
            if error == TXN_NOT_FOUND {
                return Ok(TxLookup::NotFound);
            }
            return Err(Error::Ledger(format!("{label}: {error}")));
        }
        if self.status.as_deref() == Some("error") {
            return Err(Error::Ledger(format!("{label}: error status")));
        }

        let meta = self
            .meta
            .ok_or_else(|| Error::Ledger(format!("{label}: response carries no meta")))?;
        let tx_type = self
            .tx_type
            .ok_or_else(|| Error::Ledger(format!("{label}: response carries no type")))?;

        Ok(TxLookup::Found(LedgerTx {
            tx_type,
            result_code: meta.transaction_result.unwrap_or_default(),
            destination: self.destination,
            destination_tag: self.destination_tag,
            delivered: meta.delivered_amount.and_then(RawAmount::normalize),
            validated: self.validated,
        }))
    }
}

/// Stateful node access over JSON-RPC.
pub struct JsonRpcProvider {
    label: String,
    network: Network,
    endpoint: String,
    client: reqwest::Client,
}

impl JsonRpcProvider {
    /// Create a provider for one JSON-RPC node endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        network: Network,
        label: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            label: label.into(),
            network,
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl LedgerProvider for JsonRpcProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn network(&self) -> Network {
        self.network
    }

    async fn lookup(&self, txid: &str) -> Result<TxLookup> {
        debug!(provider = %self.label, %txid, "Querying node");

        let body = json!({
            "method": "tx",
            "params": [{ "transaction": txid, "binary": false }],
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let envelope: RpcEnvelope = response.json().await?;
        envelope.result.normalize(&self.label)
    }
}

/// Stateless REST transaction lookup, the last fallback of a chain.
pub struct RestLookupProvider {
    label: String,
    network: Network,
    base_url: String,
    client: reqwest::Client,
}

impl RestLookupProvider {
    /// Create a provider for one REST lookup endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        network: Network,
        label: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            label: label.into(),
            network,
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl LedgerProvider for RestLookupProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn network(&self) -> Network {
        self.network
    }

    async fn lookup(&self, txid: &str) -> Result<TxLookup> {
        debug!(provider = %self.label, %txid, "Querying REST lookup");

        let url = format!("{}/{txid}", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(TxLookup::NotFound);
        }
        let response = response.error_for_status()?;

        let body: TxBody = response.json().await?;
        body.normalize(&self.label)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_native_delivered_amount() {
        let body: TxBody = serde_json::from_str(
            r#"{
                "TransactionType": "Payment",
                "Destination": "rDest",
                "DestinationTag": 42,
                "validated": true,
                "meta": {
                    "TransactionResult": "tesSUCCESS",
                    "delivered_amount": "1500000"
                }
            }"#,
        )
        .expect("should parse");

        let TxLookup::Found(tx) = body.normalize("test").expect("should normalize") else {
            panic!("expected a found transaction");
        };
        assert_eq!(tx.tx_type, "Payment");
        assert_eq!(tx.destination_tag, Some(42));
        let delivered = tx.delivered.expect("delivered");
        assert_eq!(delivered.currency, NATIVE_CURRENCY);
        assert_eq!(delivered.value, "1.5");
    }

    #[test]
    fn test_normalize_issued_delivered_amount() {
        let body: TxBody = serde_json::from_str(
            r#"{
                "TransactionType": "Payment",
                "Destination": "rDest",
                "validated": true,
                "meta": {
                    "TransactionResult": "tesSUCCESS",
                    "delivered_amount": {
                        "currency": "USD",
                        "issuer": "rIssuer",
                        "value": "5"
                    }
                }
            }"#,
        )
        .expect("should parse");

        let TxLookup::Found(tx) = body.normalize("test").expect("should normalize") else {
            panic!("expected a found transaction");
        };
        let delivered = tx.delivered.expect("delivered");
        assert_eq!(delivered.issuer.as_deref(), Some("rIssuer"));
        assert_eq!(delivered.value, "5");
    }

    #[test]
    fn test_txn_not_found_is_definitive() {
        let body: TxBody =
            serde_json::from_str(r#"{"error": "txnNotFound", "status": "error"}"#)
                .expect("should parse");
        assert!(matches!(
            body.normalize("test").expect("should normalize"),
            TxLookup::NotFound
        ));
    }

    #[test]
    fn test_other_rpc_error_falls_through_as_error() {
        let body: TxBody =
            serde_json::from_str(r#"{"error": "noNetwork", "status": "error"}"#)
                .expect("should parse");
        assert!(body.normalize("test").is_err());
    }
}
