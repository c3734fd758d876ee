//! Pending-request bookkeeping.
//!
//! A pending record remembers the identity/origin linkage of an outstanding
//! payload until the platform's webhook reports the final disposition. On
//! resolution the linkage is propagated into the ownership index for every
//! identity space with a known value; the pending record is deleted only
//! after every propagation write succeeded, so the linkage can never be
//! lost to a partial failure. The sweep removes records past their expiry,
//! but only once the platform confirms the payload expired unsigned.

use crate::ownership::{IdentitySpace, OwnershipIndex, OwnershipKey, PAYMENT_PAYLOAD_TYPE};
use crate::platform::SigningPlatform;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One outstanding payload awaiting its webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Origin the payload was requested from.
    pub origin: String,
    /// Referrer within the origin.
    pub referrer: String,
    /// Tenant application id.
    pub application: String,
    /// Caller-supplied front-end id.
    pub front_end_id: String,
    /// Wallet user id, when already known at submission.
    #[serde(default)]
    pub wallet_user_id: Option<String>,
    /// Platform-assigned payload id.
    pub payload_id: Uuid,
    /// When this record becomes eligible for the sweep.
    pub expires_at: DateTime<Utc>,
}

/// Out-of-band notification carrying a payload's definitive outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadNotification {
    /// Tenant application id.
    pub application: String,
    /// Payload id the notification refers to.
    pub payload_id: Uuid,
    /// Whether the payload was signed.
    pub signed: bool,
    /// Payload type tag, when known.
    #[serde(default)]
    pub payload_type: Option<String>,
    /// Wallet user token issued for the signer.
    #[serde(default)]
    pub wallet_user_id: Option<String>,
    /// Ledger account that signed.
    #[serde(default)]
    pub ledger_account: Option<String>,
    /// Transaction id, for dispatched payments.
    #[serde(default)]
    pub txid: Option<String>,
}

/// Statistics from one sweep pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    /// Records removed as confirmed stale.
    pub removed: u64,
    /// Records retained because the payload may still resolve.
    pub retained: u64,
    /// Records whose state could not be confirmed this pass.
    pub failed: u64,
}

/// Pending-request ledger over the store, ownership index and platform.
#[derive(Clone)]
pub struct PendingLedger {
    store: Arc<dyn Store>,
    ownership: OwnershipIndex,
    platform: Arc<dyn SigningPlatform>,
}

impl PendingLedger {
    /// Create a pending ledger.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ownership: OwnershipIndex,
        platform: Arc<dyn SigningPlatform>,
    ) -> Self {
        Self {
            store,
            ownership,
            platform,
        }
    }

    /// Record an outstanding payload. Called right after submission, before
    /// the webhook can arrive.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be persisted.
    pub async fn record(&self, pending: PendingRequest) -> crate::Result<()> {
        debug!(
            application = %pending.application,
            payload_id = %pending.payload_id,
            "Recording pending request"
        );
        self.store.put_pending(&pending).await
    }

    /// Resolve a webhook notification into the ownership index.
    ///
    /// Unknown (application, payload id) pairs are a no-op: duplicates and
    /// unrelated notifications are expected. Returns `true` when a pending
    /// record was resolved and removed.
    pub async fn resolve(&self, notification: &PayloadNotification) -> bool {
        let pending = match self
            .store
            .pending(&notification.application, notification.payload_id)
            .await
        {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                debug!(
                    application = %notification.application,
                    payload_id = %notification.payload_id,
                    "No pending record for notification"
                );
                return false;
            }
            Err(e) => {
                warn!(
                    application = %notification.application,
                    payload_id = %notification.payload_id,
                    "Pending lookup failed: {e}"
                );
                return false;
            }
        };

        let wallet_user_id = notification
            .wallet_user_id
            .as_deref()
            .or(pending.wallet_user_id.as_deref());
        let payload_type = notification.payload_type.as_deref();

        let mut identities: Vec<(IdentitySpace, &str)> = Vec::new();
        if !pending.front_end_id.is_empty() {
            identities.push((IdentitySpace::FrontEnd, pending.front_end_id.as_str()));
        }
        if let Some(wallet_user_id) = wallet_user_id {
            identities.push((IdentitySpace::WalletUser, wallet_user_id));
        }
        if let Some(account) = notification.ledger_account.as_deref() {
            identities.push((IdentitySpace::LedgerAccount, account));
        }

        let writes = identities.into_iter().map(|(space, identity)| {
            let key = OwnershipKey {
                space,
                origin: pending.origin.clone(),
                referrer: pending.referrer.clone(),
                application: pending.application.clone(),
                identity: identity.to_string(),
            };
            let ownership = self.ownership.clone();
            async move {
                ownership
                    .record(&key, notification.payload_id, payload_type, wallet_user_id)
                    .await
            }
        });
        let mut all_persisted = futures::future::join_all(writes)
            .await
            .into_iter()
            .all(|persisted| persisted);

        // Payments may arrive without a sign-in; keep the direct link so the
        // account stays resolvable.
        if payload_type == Some(PAYMENT_PAYLOAD_TYPE) {
            if let (Some(account), Some(wallet_user_id)) =
                (notification.ledger_account.as_deref(), wallet_user_id)
            {
                if let Err(e) = self
                    .store
                    .put_account_link(&pending.application, account, wallet_user_id)
                    .await
                {
                    warn!(%account, "Account link write failed: {e}");
                    all_persisted = false;
                }
            }
        }

        // The pending record is the only durable copy of this linkage;
        // keep it until every propagation write has landed.
        if !all_persisted {
            warn!(
                payload_id = %notification.payload_id,
                "Ownership propagation incomplete, retaining pending record"
            );
            return false;
        }

        if let Err(e) = self
            .store
            .delete_pending(&notification.application, notification.payload_id)
            .await
        {
            warn!(
                payload_id = %notification.payload_id,
                "Pending delete failed, sweep will retry: {e}"
            );
        }

        info!(
            application = %notification.application,
            payload_id = %notification.payload_id,
            signed = notification.signed,
            "Pending request resolved"
        );
        true
    }

    /// Remove pending records that are past expiry and whose payload the
    /// platform confirms as expired without signed transaction data.
    pub async fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        let expired = match self.store.expired_pending(Utc::now()).await {
            Ok(expired) => expired,
            Err(e) => {
                warn!("Expired-pending scan failed: {e}");
                return stats;
            }
        };

        for pending in expired {
            let reference = pending.payload_id.to_string();
            match self.platform.fetch(&pending.application, &reference).await {
                Ok(payload) => {
                    let stale =
                        payload.meta.expired && !payload.meta.signed && !payload.has_signed_blob();
                    if stale {
                        match self
                            .store
                            .delete_pending(&pending.application, pending.payload_id)
                            .await
                        {
                            Ok(()) => stats.removed += 1,
                            Err(e) => {
                                warn!(payload_id = %pending.payload_id, "Sweep delete failed: {e}");
                                stats.failed += 1;
                            }
                        }
                    } else {
                        debug!(
                            payload_id = %pending.payload_id,
                            "Payload may still resolve, retaining pending record"
                        );
                        stats.retained += 1;
                    }
                }
                Err(e) => {
                    // Unconfirmed state: never delete on a fetch failure.
                    warn!(payload_id = %pending.payload_id, "Sweep fetch failed: {e}");
                    stats.failed += 1;
                }
            }
        }

        if stats.removed > 0 || stats.failed > 0 {
            info!(
                removed = stats.removed,
                retained = stats.retained,
                failed = stats.failed,
                "Pending sweep completed"
            );
        }
        stats
    }
}
