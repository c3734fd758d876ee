//! Per-tenant origin policies.
//!
//! An origin policy describes one tenant application: which origins it may
//! serve, fixed payment destinations and amount overrides per referrer, how
//! long a settled payment remains acceptable as proof, and where to send the
//! user back after signing. Policies are loaded lazily through the
//! [`PolicyCache`] and invalidated only by an explicit reset.

mod cache;
mod window;

pub use cache::{PolicyCache, PolicyCacheStats};
pub use window::{is_within_window, resolve_window};

use crate::ledger::ExpectedAmount;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Wildcard key matching any referrer.
pub const ANY_REFERRER: &str = "*";

/// Fixed payment destination for a referrer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Destination ledger account.
    pub account: String,
    /// Destination tag, when one is required.
    #[serde(default)]
    pub tag: Option<u32>,
}

/// One return-URL rule. Rules are evaluated in order; first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnUrlRule {
    /// Referrer this rule applies to, or `*`.
    pub from: String,
    /// Return URL for the native app flow.
    #[serde(default)]
    pub app_url: Option<String>,
    /// Return URL for the web flow.
    #[serde(default)]
    pub web_url: Option<String>,
}

/// How long after settlement a payment remains acceptable as proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationWindow {
    /// Acceptable for this many milliseconds after the payload resolved.
    Millis(u64),
    /// Never expires.
    Never,
}

// Stored as a plain integer: any negative value means "never expires".
impl Serialize for ValidationWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Millis(ms) => serializer.serialize_i64(i64::try_from(*ms).map_err(|_| {
                serde::ser::Error::custom("validation window exceeds i64 milliseconds")
            })?),
            Self::Never => serializer.serialize_i64(-1),
        }
    }
}

impl<'de> Deserialize<'de> for ValidationWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw < 0 {
            Ok(Self::Never)
        } else {
            u64::try_from(raw)
                .map(Self::Millis)
                .map_err(D::Error::custom)
        }
    }
}

/// Policy for one tenant application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginPolicy {
    /// Tenant application id.
    pub application: String,

    /// Origins this application may serve. `*` allows any origin.
    pub origins: Vec<String>,

    /// Fixed payment destination per referrer (`*` = any referrer).
    #[serde(default)]
    pub destinations: HashMap<String, Destination>,

    /// Fixed amount override per referrer (`*` = any referrer).
    #[serde(default)]
    pub amounts: HashMap<String, ExpectedAmount>,

    /// Validation window per referrer, `origin + "/*"`, or `*`.
    #[serde(default)]
    pub validation_windows: HashMap<String, ValidationWindow>,

    /// Ordered return-URL rules.
    #[serde(default)]
    pub return_urls: Vec<ReturnUrlRule>,
}

impl OriginPolicy {
    /// Whether this policy serves the given origin.
    #[must_use]
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.origins
            .iter()
            .any(|o| o == origin || o == ANY_REFERRER)
    }

    /// Fixed destination for `referrer`: exact key, then wildcard.
    #[must_use]
    pub fn destination_for(&self, referrer: &str) -> Option<&Destination> {
        self.destinations
            .get(referrer)
            .or_else(|| self.destinations.get(ANY_REFERRER))
    }

    /// Fixed amount override for `referrer`: exact key, then wildcard.
    #[must_use]
    pub fn amount_for(&self, referrer: &str) -> Option<&ExpectedAmount> {
        self.amounts
            .get(referrer)
            .or_else(|| self.amounts.get(ANY_REFERRER))
    }

    /// First return-URL rule matching `from`.
    #[must_use]
    pub fn return_url_for(&self, from: &str) -> Option<&ReturnUrlRule> {
        self.return_urls
            .iter()
            .find(|rule| rule.from == from || rule.from == ANY_REFERRER)
    }
}
