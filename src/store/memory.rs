//! In-memory document store.

use crate::error::Result;
use crate::ownership::{IdentitySpace, OwnershipKey, OwnershipRecord};
use crate::pending::PendingRequest;
use crate::policy::OriginPolicy;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

struct StoredOwnership {
    /// Insertion sequence, tie-breaker for same-instant creations.
    seq: u64,
    record: OwnershipRecord,
}

/// In-process store backing tests and single-process deployments.
///
/// All operations are plain map updates behind short-lived locks; the
/// add-to-set upsert is atomic by construction.
#[derive(Default)]
pub struct MemoryStore {
    ownership: RwLock<HashMap<OwnershipKey, StoredOwnership>>,
    links: RwLock<HashMap<(String, String), String>>,
    pending: RwLock<HashMap<(String, Uuid), PendingRequest>>,
    policies: RwLock<HashMap<String, OriginPolicy>>,
    seq: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ownership records currently held.
    #[must_use]
    pub fn ownership_len(&self) -> usize {
        self.ownership.read().len()
    }

    /// Number of pending requests currently held.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.read().len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_ownership(
        &self,
        key: &OwnershipKey,
        payload_type: &str,
        payload_id: Uuid,
        wallet_user_id: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut ownership = self.ownership.write();
        let entry = ownership.entry(key.clone()).or_insert_with(|| StoredOwnership {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            record: OwnershipRecord {
                key: key.clone(),
                wallet_user_id: None,
                payloads: HashMap::new(),
                created_at: now,
                updated_at: now,
            },
        });

        entry
            .record
            .payloads
            .entry(payload_type.to_string())
            .or_default()
            .insert(payload_id);
        if let Some(wallet_user_id) = wallet_user_id {
            entry.record.wallet_user_id = Some(wallet_user_id.to_string());
        }
        entry.record.updated_at = now;
        Ok(())
    }

    async fn ownership_exact(&self, key: &OwnershipKey) -> Result<Option<OwnershipRecord>> {
        Ok(self.ownership.read().get(key).map(|s| s.record.clone()))
    }

    async fn ownership_for_identity(
        &self,
        space: IdentitySpace,
        application: &str,
        identity: &str,
        origin: Option<&str>,
    ) -> Result<Vec<OwnershipRecord>> {
        let ownership = self.ownership.read();
        let mut matches: Vec<&StoredOwnership> = ownership
            .values()
            .filter(|s| {
                s.record.key.space == space
                    && s.record.key.application == application
                    && s.record.key.identity == identity
                    && origin.map_or(true, |origin| s.record.key.origin == origin)
            })
            .collect();

        // Newest creation first, insertion order as the tie-breaker.
        matches.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matches.into_iter().map(|s| s.record.clone()).collect())
    }

    async fn put_account_link(
        &self,
        application: &str,
        account: &str,
        wallet_user_id: &str,
    ) -> Result<()> {
        self.links.write().insert(
            (application.to_string(), account.to_string()),
            wallet_user_id.to_string(),
        );
        Ok(())
    }

    async fn account_link(&self, application: &str, account: &str) -> Result<Option<String>> {
        Ok(self
            .links
            .read()
            .get(&(application.to_string(), account.to_string()))
            .cloned())
    }

    async fn put_pending(&self, pending: &PendingRequest) -> Result<()> {
        self.pending.write().insert(
            (pending.application.clone(), pending.payload_id),
            pending.clone(),
        );
        Ok(())
    }

    async fn pending(&self, application: &str, payload_id: Uuid) -> Result<Option<PendingRequest>> {
        Ok(self
            .pending
            .read()
            .get(&(application.to_string(), payload_id))
            .cloned())
    }

    async fn delete_pending(&self, application: &str, payload_id: Uuid) -> Result<()> {
        self.pending
            .write()
            .remove(&(application.to_string(), payload_id));
        Ok(())
    }

    async fn expired_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingRequest>> {
        Ok(self
            .pending
            .read()
            .values()
            .filter(|p| p.expires_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn policy(&self, origin: &str, application: &str) -> Result<Option<OriginPolicy>> {
        Ok(self
            .policies
            .read()
            .get(application)
            .filter(|p| p.allows_origin(origin))
            .cloned())
    }

    async fn put_policy(&self, policy: OriginPolicy) -> Result<()> {
        self.policies
            .write()
            .insert(policy.application.clone(), policy);
        Ok(())
    }
}
