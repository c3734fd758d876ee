//! Multi-space payload ownership index.
//!
//! Tracks which identities are entitled to read the result of a given
//! payload. The same index shape serves three identity spaces (front-end id,
//! wallet user id, ledger account); records are partitioned by payload type
//! and keyed by the full (space, origin, referrer, application, identity)
//! tuple.
//!
//! Reads and writes deliberately never surface storage errors to callers:
//! a failed read behaves as "not found" and a failed write is logged and
//! reported through the boolean return of [`OwnershipIndex::record`].

mod resolver;

pub use resolver::IdentityResolver;

use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bucket used for payloads submitted without an explicit type tag.
pub const CATCH_ALL_PAYLOAD_TYPE: &str = "*";

/// Payload type tag of sign-in payloads.
pub const SIGNIN_PAYLOAD_TYPE: &str = "SignIn";

/// Payload type tag of payment payloads.
pub const PAYMENT_PAYLOAD_TYPE: &str = "Payment";

/// The identity space an ownership record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySpace {
    /// Caller-supplied front-end identifier.
    FrontEnd,
    /// Wallet-platform issued user id.
    WalletUser,
    /// Ledger account address.
    LedgerAccount,
}

impl IdentitySpace {
    /// All identity spaces, in propagation order.
    pub const ALL: [Self; 3] = [Self::FrontEnd, Self::WalletUser, Self::LedgerAccount];

    /// Stable string tag for logging and storage keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontEnd => "front_end",
            Self::WalletUser => "wallet_user",
            Self::LedgerAccount => "ledger_account",
        }
    }
}

/// Full key of one ownership record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnershipKey {
    /// Identity space of `identity`.
    pub space: IdentitySpace,
    /// Origin the payload was requested from.
    pub origin: String,
    /// Referrer within the origin.
    pub referrer: String,
    /// Tenant application id.
    pub application: String,
    /// Identity value within `space`.
    pub identity: String,
}

/// One ownership record: payload ids grouped by payload type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipRecord {
    /// Record key.
    pub key: OwnershipKey,
    /// Wallet user id known to be associated with this identity, if any.
    pub wallet_user_id: Option<String>,
    /// Payload ids per payload-type bucket. Duplicates are suppressed.
    pub payloads: HashMap<String, BTreeSet<Uuid>>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every write; used for most-recent-first resolution.
    pub updated_at: DateTime<Utc>,
}

impl OwnershipRecord {
    /// Payload ids recorded under the given type bucket.
    #[must_use]
    pub fn payload_ids(&self, payload_type: &str) -> BTreeSet<Uuid> {
        self.payloads.get(payload_type).cloned().unwrap_or_default()
    }

    /// Whether any payload id exists under the given type bucket.
    #[must_use]
    pub fn has_payload_type(&self, payload_type: &str) -> bool {
        self.payloads
            .get(payload_type)
            .is_some_and(|ids| !ids.is_empty())
    }
}

/// Map an optional/blank payload type to its storage bucket.
#[must_use]
pub fn normalize_payload_type(payload_type: Option<&str>) -> &str {
    match payload_type {
        Some(t) if !t.trim().is_empty() => t,
        _ => CATCH_ALL_PAYLOAD_TYPE,
    }
}

/// Payload ownership index over a document store.
#[derive(Clone)]
pub struct OwnershipIndex {
    store: Arc<dyn Store>,
}

impl OwnershipIndex {
    /// Create an index over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Add `payload_id` to the record identified by `key`, upserting the
    /// record. Idempotent: recording the same id twice leaves the set
    /// unchanged. Every write refreshes the record's `updated_at`.
    ///
    /// Returns `true` when the write was persisted. Storage failures are
    /// logged, never raised.
    pub async fn record(
        &self,
        key: &OwnershipKey,
        payload_id: Uuid,
        payload_type: Option<&str>,
        wallet_user_id: Option<&str>,
    ) -> bool {
        let bucket = normalize_payload_type(payload_type);
        match self
            .store
            .upsert_ownership(key, bucket, payload_id, wallet_user_id)
            .await
        {
            Ok(()) => {
                debug!(
                    space = key.space.as_str(),
                    application = %key.application,
                    %payload_id,
                    bucket,
                    "Ownership recorded"
                );
                true
            }
            Err(e) => {
                warn!(
                    space = key.space.as_str(),
                    application = %key.application,
                    %payload_id,
                    "Failed to record ownership: {e}"
                );
                false
            }
        }
    }

    /// Payload ids owned by `identity` under the given type bucket.
    ///
    /// With both `origin` and `referrer` supplied the exact record is
    /// consulted; otherwise all records for the identity are aggregated,
    /// filtered by whichever of the two is present.
    ///
    /// Storage failures yield the empty set.
    pub async fn query(
        &self,
        space: IdentitySpace,
        origin: Option<&str>,
        referrer: Option<&str>,
        application: &str,
        identity: &str,
        payload_type: Option<&str>,
    ) -> BTreeSet<Uuid> {
        let bucket = normalize_payload_type(payload_type);

        if let (Some(origin), Some(referrer)) = (origin, referrer) {
            let key = OwnershipKey {
                space,
                origin: origin.to_string(),
                referrer: referrer.to_string(),
                application: application.to_string(),
                identity: identity.to_string(),
            };
            return match self.store.ownership_exact(&key).await {
                Ok(Some(record)) => record.payload_ids(bucket),
                Ok(None) => BTreeSet::new(),
                Err(e) => {
                    warn!(space = space.as_str(), %application, "Ownership lookup failed: {e}");
                    BTreeSet::new()
                }
            };
        }

        match self
            .store
            .ownership_for_identity(space, application, identity, origin)
            .await
        {
            Ok(records) => records
                .iter()
                .filter(|r| referrer.map_or(true, |referrer| r.key.referrer == referrer))
                .flat_map(|r| r.payload_ids(bucket))
                .collect(),
            Err(e) => {
                warn!(space = space.as_str(), %application, "Ownership scan failed: {e}");
                BTreeSet::new()
            }
        }
    }

    /// Whether `payload_id` belongs to `identity` under the given bucket.
    #[allow(clippy::too_many_arguments)]
    pub async fn is_owner(
        &self,
        space: IdentitySpace,
        origin: Option<&str>,
        referrer: Option<&str>,
        application: &str,
        identity: &str,
        payload_type: Option<&str>,
        payload_id: Uuid,
    ) -> bool {
        self.query(space, origin, referrer, application, identity, payload_type)
            .await
            .contains(&payload_id)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn key(space: IdentitySpace, referrer: &str, identity: &str) -> OwnershipKey {
        OwnershipKey {
            space,
            origin: "https://shop.example".to_string(),
            referrer: referrer.to_string(),
            application: "app-1".to_string(),
            identity: identity.to_string(),
        }
    }

    fn index() -> OwnershipIndex {
        OwnershipIndex::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_record_then_exact_and_aggregate_query() {
        let index = index();
        let k = key(IdentitySpace::FrontEnd, "checkout", "fe-123");
        let payload = Uuid::new_v4();

        assert!(index.record(&k, payload, Some("Payment"), None).await);

        // Exact lookup.
        let exact = index
            .query(
                IdentitySpace::FrontEnd,
                Some("https://shop.example"),
                Some("checkout"),
                "app-1",
                "fe-123",
                Some("Payment"),
            )
            .await;
        assert!(exact.contains(&payload));

        // Aggregated (no referrer) lookup.
        let aggregated = index
            .query(
                IdentitySpace::FrontEnd,
                None,
                None,
                "app-1",
                "fe-123",
                Some("Payment"),
            )
            .await;
        assert!(aggregated.contains(&payload));

        assert!(
            index
                .is_owner(
                    IdentitySpace::FrontEnd,
                    None,
                    None,
                    "app-1",
                    "fe-123",
                    Some("Payment"),
                    payload,
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_other_identity_and_other_type_do_not_own() {
        let index = index();
        let k = key(IdentitySpace::FrontEnd, "checkout", "fe-123");
        let payload = Uuid::new_v4();
        index.record(&k, payload, Some("Payment"), None).await;

        assert!(
            !index
                .is_owner(
                    IdentitySpace::FrontEnd,
                    None,
                    None,
                    "app-1",
                    "fe-other",
                    Some("Payment"),
                    payload,
                )
                .await
        );
        assert!(
            !index
                .is_owner(
                    IdentitySpace::FrontEnd,
                    None,
                    None,
                    "app-1",
                    "fe-123",
                    Some("SignIn"),
                    payload,
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let index = index();
        let k = key(IdentitySpace::WalletUser, "checkout", "wallet-9");
        let payload = Uuid::new_v4();

        index.record(&k, payload, Some("Payment"), None).await;
        index.record(&k, payload, Some("Payment"), None).await;

        let ids = index
            .query(
                IdentitySpace::WalletUser,
                Some("https://shop.example"),
                Some("checkout"),
                "app-1",
                "wallet-9",
                Some("Payment"),
            )
            .await;
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_type_maps_to_catch_all_bucket() {
        let index = index();
        let k = key(IdentitySpace::FrontEnd, "checkout", "fe-123");
        let payload = Uuid::new_v4();

        index.record(&k, payload, Some("  "), None).await;

        let ids = index
            .query(IdentitySpace::FrontEnd, None, None, "app-1", "fe-123", None)
            .await;
        assert!(ids.contains(&payload));
    }

    #[tokio::test]
    async fn test_storage_failure_reads_as_not_found() {
        use crate::error::Error;
        use crate::pending::PendingRequest;
        use crate::policy::OriginPolicy;
        use async_trait::async_trait;
        use chrono::{DateTime, Utc};

        /// Store whose every operation fails.
        struct BrokenStore;

        #[async_trait]
        impl crate::store::Store for BrokenStore {
            async fn upsert_ownership(
                &self,
                _key: &OwnershipKey,
                _payload_type: &str,
                _payload_id: Uuid,
                _wallet_user_id: Option<&str>,
            ) -> crate::Result<()> {
                Err(Error::Store("down".to_string()))
            }
            async fn ownership_exact(
                &self,
                _key: &OwnershipKey,
            ) -> crate::Result<Option<OwnershipRecord>> {
                Err(Error::Store("down".to_string()))
            }
            async fn ownership_for_identity(
                &self,
                _space: IdentitySpace,
                _application: &str,
                _identity: &str,
                _origin: Option<&str>,
            ) -> crate::Result<Vec<OwnershipRecord>> {
                Err(Error::Store("down".to_string()))
            }
            async fn put_account_link(
                &self,
                _application: &str,
                _account: &str,
                _wallet_user_id: &str,
            ) -> crate::Result<()> {
                Err(Error::Store("down".to_string()))
            }
            async fn account_link(
                &self,
                _application: &str,
                _account: &str,
            ) -> crate::Result<Option<String>> {
                Err(Error::Store("down".to_string()))
            }
            async fn put_pending(&self, _pending: &PendingRequest) -> crate::Result<()> {
                Err(Error::Store("down".to_string()))
            }
            async fn pending(
                &self,
                _application: &str,
                _payload_id: Uuid,
            ) -> crate::Result<Option<PendingRequest>> {
                Err(Error::Store("down".to_string()))
            }
            async fn delete_pending(
                &self,
                _application: &str,
                _payload_id: Uuid,
            ) -> crate::Result<()> {
                Err(Error::Store("down".to_string()))
            }
            async fn expired_pending(
                &self,
                _cutoff: DateTime<Utc>,
            ) -> crate::Result<Vec<PendingRequest>> {
                Err(Error::Store("down".to_string()))
            }
            async fn policy(
                &self,
                _origin: &str,
                _application: &str,
            ) -> crate::Result<Option<OriginPolicy>> {
                Err(Error::Store("down".to_string()))
            }
            async fn put_policy(&self, _policy: OriginPolicy) -> crate::Result<()> {
                Err(Error::Store("down".to_string()))
            }
        }

        let index = OwnershipIndex::new(Arc::new(BrokenStore));
        let k = key(IdentitySpace::FrontEnd, "checkout", "fe-123");
        let payload = Uuid::new_v4();

        // Writes report failure through the boolean, never an error.
        assert!(!index.record(&k, payload, Some("Payment"), None).await);

        // Reads collapse to empty / not-owner.
        let ids = index
            .query(
                IdentitySpace::FrontEnd,
                Some("https://shop.example"),
                Some("checkout"),
                "app-1",
                "fe-123",
                Some("Payment"),
            )
            .await;
        assert!(ids.is_empty());
        assert!(
            !index
                .is_owner(
                    IdentitySpace::FrontEnd,
                    None,
                    None,
                    "app-1",
                    "fe-123",
                    Some("Payment"),
                    payload,
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_aggregation_spans_referrers() {
        let index = index();
        let a = key(IdentitySpace::LedgerAccount, "checkout", "rAccount1");
        let b = key(IdentitySpace::LedgerAccount, "donate", "rAccount1");
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        index.record(&a, p1, Some("Payment"), None).await;
        index.record(&b, p2, Some("Payment"), None).await;

        let ids = index
            .query(
                IdentitySpace::LedgerAccount,
                None,
                None,
                "app-1",
                "rAccount1",
                Some("Payment"),
            )
            .await;
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&p1) && ids.contains(&p2));
    }
}
