//! Cross-space identity resolution.
//!
//! Finds the wallet user id most recently associated with a front-end id or
//! a ledger account, to pre-fill or validate a new signing request. A
//! sign-in payload is the strongest proof of account-to-wallet linkage, so
//! account resolution consults sign-in ownership records first and only then
//! the direct account link map populated by payment payloads.

use crate::ownership::{IdentitySpace, SIGNIN_PAYLOAD_TYPE};
use crate::store::Store;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves identities across identity spaces.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    /// Create a resolver over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Wallet user id most recently associated with `front_end_id`.
    ///
    /// Records are scanned newest-creation-first; the first one carrying a
    /// known wallet user id wins. Storage failures resolve to `None`.
    pub async fn resolve_wallet_identity(
        &self,
        application: &str,
        front_end_id: &str,
    ) -> Option<String> {
        let records = match self
            .store
            .ownership_for_identity(IdentitySpace::FrontEnd, application, front_end_id, None)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(%application, "Front-end identity scan failed: {e}");
                return None;
            }
        };

        records.into_iter().find_map(|r| r.wallet_user_id)
    }

    /// Wallet user id most recently associated with the ledger `account`.
    ///
    /// Tier 1: ledger-account ownership records restricted to sign-in
    /// payloads, newest first, first record with a known wallet user id.
    /// Tier 2: the direct account link map, populated by payment payloads
    /// that arrive without an accompanying sign-in.
    pub async fn resolve_wallet_identity_by_account(
        &self,
        application: &str,
        account: &str,
    ) -> Option<String> {
        match self
            .store
            .ownership_for_identity(IdentitySpace::LedgerAccount, application, account, None)
            .await
        {
            Ok(records) => {
                let from_signin = records
                    .into_iter()
                    .filter(|r| r.has_payload_type(SIGNIN_PAYLOAD_TYPE))
                    .find_map(|r| r.wallet_user_id);
                if let Some(wallet_user_id) = from_signin {
                    debug!(%application, %account, "Resolved wallet identity via sign-in record");
                    return Some(wallet_user_id);
                }
            }
            Err(e) => {
                warn!(%application, %account, "Ledger-account identity scan failed: {e}");
            }
        }

        match self.store.account_link(application, account).await {
            Ok(link) => {
                if link.is_some() {
                    debug!(%application, %account, "Resolved wallet identity via account link");
                }
                link
            }
            Err(e) => {
                warn!(%application, %account, "Account link lookup failed: {e}");
                None
            }
        }
    }
}
