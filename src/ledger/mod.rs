//! Ledger verification: normalized transaction shapes, read providers and
//! the multi-source settlement verifier.
//!
//! Two ledger networks exist (main, test). A verification pass always
//! exhausts the main network's provider chain before consulting test; a
//! transaction confirmed only on test yields a testnet verdict.

mod amount;
mod provider;
mod verifier;

pub use amount::{amount_matches, drops_to_xrp_value, xrp_value_to_drops};
pub use provider::{JsonRpcProvider, LedgerProvider, RestLookupProvider, TxLookup};
pub use verifier::{Confirmation, LedgerVerifier, ProviderChain};

use serde::{Deserialize, Serialize};

/// Currency code of the native ledger asset.
pub const NATIVE_CURRENCY: &str = "XRP";

/// Ledger result code of a successful transaction.
pub const RESULT_SUCCESS: &str = "tesSUCCESS";

/// Transaction type of payment transactions.
pub const TX_TYPE_PAYMENT: &str = "Payment";

/// One of the two ledger networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production ledger.
    Main,
    /// Test ledger.
    Test,
}

impl Network {
    /// Whether this is the test network.
    #[must_use]
    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }

    /// Stable string tag for logging.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
        }
    }
}

/// Amount a payment is expected to have delivered.
///
/// An integer is interpreted as native-currency drops; the object form
/// names an issued currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedAmount {
    /// Native amount, in drops.
    Drops(u64),
    /// Issued currency amount.
    Issued {
        /// Currency code.
        currency: String,
        /// Issuing account.
        issuer: String,
        /// Decimal value.
        value: String,
    },
}

/// Amount actually delivered by a ledger transaction, normalized so that
/// native amounts carry currency `XRP` and a value in XRP (not drops).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredAmount {
    /// Currency code, `XRP` for native.
    pub currency: String,
    /// Issuing account; absent for native amounts.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Decimal value in currency units.
    pub value: String,
}

/// Normalized transaction shape returned by every ledger provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTx {
    /// Transaction type, e.g. `Payment`.
    pub tx_type: String,
    /// Ledger result code, e.g. `tesSUCCESS`.
    pub result_code: String,
    /// Destination account, for payments.
    #[serde(default)]
    pub destination: Option<String>,
    /// Destination tag, when present.
    #[serde(default)]
    pub destination_tag: Option<u32>,
    /// Delivered amount, when present.
    #[serde(default)]
    pub delivered: Option<DeliveredAmount>,
    /// Whether the transaction is in a validated ledger.
    pub validated: bool,
}

/// What a settled payment is expected to look like.
#[derive(Debug, Clone, Default)]
pub struct ExpectedPayment {
    /// Expected destination account, when one is fixed.
    pub destination: Option<String>,
    /// Expected destination tag, when one is fixed.
    pub destination_tag: Option<u32>,
    /// Expected delivered amount; `None` accepts any amount.
    pub amount: Option<ExpectedAmount>,
}

impl LedgerTx {
    /// Whether this transaction satisfies the expectation.
    ///
    /// Payments must be validated and successful, match the expected
    /// destination (and tag when one was expected) and deliver the expected
    /// amount. Non-payment types are accepted on a successful result code
    /// alone.
    #[must_use]
    pub fn satisfies(&self, expected: &ExpectedPayment) -> bool {
        if self.result_code != RESULT_SUCCESS || !self.validated {
            return false;
        }

        if self.tx_type != TX_TYPE_PAYMENT {
            return true;
        }

        if let Some(expected_destination) = &expected.destination {
            if self.destination.as_ref() != Some(expected_destination) {
                return false;
            }
        }

        if let Some(expected_tag) = expected.destination_tag {
            if self.destination_tag != Some(expected_tag) {
                return false;
            }
        }

        amount_matches(expected.amount.as_ref(), self.delivered.as_ref())
    }
}
