//! Document-store capability.
//!
//! The engine only relies on a handful of store primitives: upsert with
//! atomic add-to-set semantics for ownership records, equality lookups and
//! identity scans, and plain put/get/delete for pending requests, account
//! links and origin policies. Any driver providing these can back the node;
//! [`MemoryStore`] is the in-process implementation used by tests and
//! single-process deployments.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::ownership::{IdentitySpace, OwnershipKey, OwnershipRecord};
use crate::pending::PendingRequest;
use crate::policy::OriginPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage operations required by the engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Add `payload_id` to the set for `payload_type` on the record at
    /// `key`, creating the record if absent. Must be idempotent and must
    /// refresh the record's `updated_at`. A known wallet user id is
    /// attached to the record when supplied.
    async fn upsert_ownership(
        &self,
        key: &OwnershipKey,
        payload_type: &str,
        payload_id: Uuid,
        wallet_user_id: Option<&str>,
    ) -> Result<()>;

    /// Fetch the record at exactly `key`.
    async fn ownership_exact(&self, key: &OwnershipKey) -> Result<Option<OwnershipRecord>>;

    /// All records for one identity, newest creation first, optionally
    /// restricted to one origin.
    async fn ownership_for_identity(
        &self,
        space: IdentitySpace,
        application: &str,
        identity: &str,
        origin: Option<&str>,
    ) -> Result<Vec<OwnershipRecord>>;

    /// Record a direct ledger-account-to-wallet-user link.
    async fn put_account_link(
        &self,
        application: &str,
        account: &str,
        wallet_user_id: &str,
    ) -> Result<()>;

    /// Most recent direct account link, if any.
    async fn account_link(&self, application: &str, account: &str) -> Result<Option<String>>;

    /// Insert a pending request (idempotent on its key).
    async fn put_pending(&self, pending: &PendingRequest) -> Result<()>;

    /// Fetch a pending request by (application, payload id).
    async fn pending(&self, application: &str, payload_id: Uuid) -> Result<Option<PendingRequest>>;

    /// Delete a pending request. Deleting an absent record is not an error.
    async fn delete_pending(&self, application: &str, payload_id: Uuid) -> Result<()>;

    /// All pending requests whose expiry is at or before `cutoff`.
    async fn expired_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingRequest>>;

    /// Policy serving the (origin, application) pair, if configured.
    async fn policy(&self, origin: &str, application: &str) -> Result<Option<OriginPolicy>>;

    /// Create or replace the policy for a tenant application.
    async fn put_policy(&self, policy: OriginPolicy) -> Result<()>;
}
