//! Node orchestrator tying the engine's components together.
//!
//! The running node owns the store, signing platform client, policy cache,
//! settlement verifier and pending-request ledger, and exposes the
//! caller-facing operations: submit/get/delete payload, the sign-in and
//! payment checks, escrow reconciliation and the cache reset.
//!
//! Error policy: component failures are caught here, logged, and collapsed
//! into the check-result flags; no internal fault propagates to the route
//! layer as an exception.

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::escrow::{EscrowClient, EscrowKey};
use crate::event::{create_event_channel, ServiceEvent, ServiceEventsChannel, ServiceEventsSender};
use crate::ledger::{ExpectedPayment, LedgerVerifier, Network};
use crate::ownership::{
    IdentityResolver, IdentitySpace, OwnershipIndex, CATCH_ALL_PAYLOAD_TYPE, SIGNIN_PAYLOAD_TYPE,
};
use crate::pending::{PayloadNotification, PendingLedger, PendingRequest};
use crate::platform::{HttpSigningPlatform, Payload, SigningPlatform, SubmitReceipt};
use crate::policy::{is_within_window, resolve_window, PolicyCache};
use crate::store::{MemoryStore, Store};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Recognized per-request options with defined defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Caller-supplied front-end identifier.
    pub front_end_id: Option<String>,
    /// Whether the caller runs in a web (not native app) context.
    pub web: bool,
    /// Suppress push delivery of the signing request.
    pub push_disabled: bool,
    /// Referrer within the origin.
    pub referrer: Option<String>,
    /// Ledger account the caller claims to act for.
    pub ledger_account: Option<String>,
    /// Treat a sign-in payload as the proof being validated.
    pub signin_to_validate: bool,
    /// Caller flow deals in issued currencies.
    pub issuing: bool,
}

/// Outcome of a sign-in, payment or escrow check.
///
/// Produced fresh per check and never persisted; the ledger stays the
/// authority.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Verification {
    /// The check passed.
    pub success: bool,
    /// Settlement was confirmed only on the test network.
    pub testnet: bool,
    /// Transaction id that settled, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    /// Account that signed, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// The proof fell outside the tenant's validation window.
    pub payload_expired: bool,
    /// The tenant has no validation window configured at all.
    pub no_validation_window: bool,
    /// An upstream failure prevented a definitive answer.
    pub error: bool,
}

impl Verification {
    /// Generic failure: not entitled, not signed, or not confirmed.
    #[must_use]
    fn rejected() -> Self {
        Self::default()
    }

    /// Upstream failure prevented a definitive answer.
    #[must_use]
    fn faulted() -> Self {
        Self {
            error: true,
            ..Self::default()
        }
    }

    /// Proof exists but fell outside the validation window.
    #[must_use]
    fn expired() -> Self {
        Self {
            payload_expired: true,
            ..Self::default()
        }
    }

    /// Tenant has no validation window configured.
    #[must_use]
    fn unconfigured() -> Self {
        Self {
            no_validation_window: true,
            ..Self::default()
        }
    }
}

/// Builder for constructing a node.
pub struct NodeBuilder {
    config: NodeConfig,
    store: Option<Arc<dyn Store>>,
    platform: Option<Arc<dyn SigningPlatform>>,
    verifier: Option<LedgerVerifier>,
}

impl NodeBuilder {
    /// Create a new node builder with the given configuration.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            store: None,
            platform: None,
            verifier: None,
        }
    }

    /// Use a specific store instead of the in-memory default.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific signing platform client.
    #[must_use]
    pub fn with_platform(mut self, platform: Arc<dyn SigningPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Use a specific settlement verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: LedgerVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Build the node.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed from the
    /// configuration.
    pub async fn build(self) -> Result<RunningNode> {
        info!("Building xrplink-node");

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()) as Arc<dyn Store>,
        };
        let platform = match self.platform {
            Some(platform) => platform,
            None => Arc::new(HttpSigningPlatform::new(&self.config.platform)?)
                as Arc<dyn SigningPlatform>,
        };
        let verifier = match self.verifier {
            Some(verifier) => verifier,
            None => LedgerVerifier::from_config(&self.config.ledger)?,
        };
        let escrow = match &self.config.escrow {
            Some(config) => Some(EscrowClient::new(config)?),
            None => None,
        };

        let ownership = OwnershipIndex::new(store.clone());
        let resolver = IdentityResolver::new(store.clone());
        let policies = PolicyCache::with_capacity(store.clone(), self.config.policy_cache_capacity);
        let pending = PendingLedger::new(store.clone(), ownership.clone(), platform.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        Ok(RunningNode {
            config: self.config,
            store,
            ownership,
            resolver,
            policies,
            verifier: Arc::new(verifier),
            escrow,
            platform,
            pending,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// A running node.
pub struct RunningNode {
    config: NodeConfig,
    store: Arc<dyn Store>,
    ownership: OwnershipIndex,
    resolver: IdentityResolver,
    policies: PolicyCache,
    verifier: Arc<LedgerVerifier>,
    escrow: Option<EscrowClient>,
    platform: Arc<dyn SigningPlatform>,
    pending: PendingLedger,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: ServiceEventsSender,
    events_rx: Option<ServiceEventsChannel>,
}

impl RunningNode {
    /// Get a receiver for service events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<ServiceEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to service events.
    #[must_use]
    pub fn subscribe_events(&self) -> ServiceEventsChannel {
        self.events_tx.subscribe()
    }

    /// The ownership index.
    #[must_use]
    pub fn ownership(&self) -> &OwnershipIndex {
        &self.ownership
    }

    /// The identity resolver.
    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Submit a payload to the signing platform on behalf of a tenant.
    ///
    /// Looks up the tenant policy, attaches the known wallet identity for
    /// push delivery, applies fixed destination/amount overrides and the
    /// matching return-URL rule, then records the pending linkage as an
    /// explicit background task once the platform accepted the payload.
    ///
    /// # Errors
    ///
    /// Returns an error when no policy serves the origin or the platform
    /// rejects the submission.
    pub async fn submit_payload(
        &self,
        origin: &str,
        application: &str,
        mut payload: Value,
        opts: &RequestOptions,
    ) -> Result<SubmitReceipt> {
        let policy = self
            .policies
            .get(origin, application)
            .await
            .ok_or_else(|| Error::Config(format!("no policy serves {origin}/{application}")))?;

        let referrer = opts
            .referrer
            .clone()
            .unwrap_or_else(|| origin.to_string());

        let wallet_user_id = if opts.push_disabled {
            None
        } else {
            self.resolve_known_identity(application, opts).await
        };

        if let Some(body) = payload.as_object_mut() {
            if let Some(wallet_user_id) = &wallet_user_id {
                body.insert("user_token".to_string(), Value::String(wallet_user_id.clone()));
            }

            let txjson = body
                .entry("txjson")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Some(txjson) = txjson.as_object_mut() {
                if let Some(destination) = policy.destination_for(&referrer) {
                    txjson.insert(
                        "Destination".to_string(),
                        Value::String(destination.account.clone()),
                    );
                    if let Some(tag) = destination.tag {
                        txjson.insert("DestinationTag".to_string(), Value::from(tag));
                    }
                }
                if let Some(amount) = policy.amount_for(&referrer) {
                    txjson.insert("Amount".to_string(), serde_json::to_value(amount)?);
                }
            }

            if let Some(rule) = policy.return_url_for(&referrer) {
                let url = if opts.web { &rule.web_url } else { &rule.app_url };
                if let Some(url) = url {
                    let options = body
                        .entry("options")
                        .or_insert_with(|| Value::Object(serde_json::Map::new()));
                    if let Some(options) = options.as_object_mut() {
                        options.insert(
                            "return_url".to_string(),
                            serde_json::json!({ "url": url }),
                        );
                    }
                }
            }
        }

        let receipt = self.platform.submit(application, &payload).await?;
        info!(%application, payload_id = %receipt.id, "Payload submitted");

        let expires_at = Utc::now()
            .checked_add_signed(ChronoDuration::seconds(self.pending_ttl_seconds(&payload)))
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
        let pending = PendingRequest {
            origin: origin.to_string(),
            referrer,
            application: application.to_string(),
            front_end_id: opts.front_end_id.clone().unwrap_or_default(),
            wallet_user_id,
            payload_id: receipt.id,
            expires_at,
        };

        // Bookkeeping runs after the response is sent; failures are logged,
        // the sweep and webhook path tolerate a missing record.
        let ledger = self.pending.clone();
        tokio::spawn(async move {
            if let Err(e) = ledger.record(pending).await {
                warn!("Post-submission pending record failed: {e}");
            }
        });

        let _ = self.events_tx.send(ServiceEvent::PayloadSubmitted {
            application: application.to_string(),
            payload_id: receipt.id,
        });
        Ok(receipt)
    }

    /// Fetch a payload by id or custom identifier, gated on ownership.
    ///
    /// Returns `None` for missing payloads and for callers that are not
    /// entitled; the two are deliberately indistinguishable.
    pub async fn get_payload(
        &self,
        origin: &str,
        application: &str,
        reference: &str,
        opts: &RequestOptions,
    ) -> Option<Payload> {
        let payload = match self.platform.fetch(application, reference).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%application, %reference, "Payload fetch failed: {e}");
                return None;
            }
        };
        if !payload.meta.exists {
            return None;
        }

        let Some(payload_id) = payload.meta.uuid else {
            return None;
        };
        if !self
            .entitled(origin, application, payload_id, &payload, opts)
            .await
        {
            debug!(%application, %payload_id, "Caller not entitled to payload");
            return None;
        }
        Some(payload)
    }

    /// Delete a payload, gated on ownership. Returns whether a delete was
    /// performed.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform delete itself fails.
    pub async fn delete_payload(
        &self,
        origin: &str,
        application: &str,
        payload_id: Uuid,
        opts: &RequestOptions,
    ) -> Result<bool> {
        let reference = payload_id.to_string();
        let payload = match self.platform.fetch(application, &reference).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%application, %payload_id, "Payload fetch failed: {e}");
                return Ok(false);
            }
        };
        if !payload.meta.exists
            || !self
                .entitled(origin, application, payload_id, &payload, opts)
                .await
        {
            return Ok(false);
        }

        self.platform.delete(application, payload_id).await?;
        if let Err(e) = self.store.delete_pending(application, payload_id).await {
            warn!(%payload_id, "Pending cleanup after delete failed: {e}");
        }
        Ok(true)
    }

    /// Resolve a platform webhook into the ownership index.
    pub async fn notify(&self, notification: &PayloadNotification) {
        if self.pending.resolve(notification).await {
            let _ = self.events_tx.send(ServiceEvent::PendingResolved {
                payload_id: notification.payload_id,
            });
        }
    }

    /// Check a sign-in payload: signed, of sign-in type, and owned by the
    /// caller.
    pub async fn check_signin(
        &self,
        origin: &str,
        application: &str,
        reference: &str,
        opts: &RequestOptions,
    ) -> Verification {
        let payload = match self.platform.fetch(application, reference).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%application, %reference, "Sign-in check fetch failed: {e}");
                return Verification::faulted();
            }
        };

        if !payload.meta.exists || !payload.is_signed() {
            return Verification::rejected();
        }
        if payload.request.payload_type.as_deref() != Some(SIGNIN_PAYLOAD_TYPE) {
            return Verification::rejected();
        }
        let Some(payload_id) = payload.meta.uuid else {
            return Verification::rejected();
        };
        if !self
            .entitled(origin, application, payload_id, &payload, opts)
            .await
        {
            return Verification::rejected();
        }

        Verification {
            success: true,
            account: payload.response.account.clone(),
            ..Verification::default()
        }
    }

    /// Check a payment payload immediately, without a validation window.
    pub async fn check_payment(
        &self,
        origin: &str,
        application: &str,
        reference: &str,
        opts: &RequestOptions,
    ) -> Verification {
        self.payment_check(origin, application, reference, opts, false)
            .await
    }

    /// Check a payment payload against the tenant's validation window.
    pub async fn check_payment_windowed(
        &self,
        origin: &str,
        application: &str,
        reference: &str,
        opts: &RequestOptions,
    ) -> Verification {
        self.payment_check(origin, application, reference, opts, true)
            .await
    }

    /// Check a payment and reconcile the matching escrow execution record.
    pub async fn check_escrow_payment(
        &self,
        origin: &str,
        application: &str,
        reference: &str,
        opts: &RequestOptions,
        escrow: &EscrowKey,
    ) -> Verification {
        let verification = self
            .payment_check(origin, application, reference, opts, true)
            .await;
        if !verification.success {
            return verification;
        }

        let Some(client) = &self.escrow else {
            warn!("Escrow check requested but no escrow service is configured");
            return Verification::faulted();
        };

        if verification.account.as_deref() != Some(escrow.account.as_str()) {
            debug!(account = %escrow.account, "Verified account does not match escrow owner");
            return Verification::rejected();
        }
        let network = if verification.testnet {
            Network::Test
        } else {
            Network::Main
        };
        if !escrow.accepts_network(network) {
            debug!(account = %escrow.account, "Escrow network mismatch");
            return Verification::rejected();
        }

        if let Err(e) = client.add(escrow).await {
            warn!(account = %escrow.account, sequence = escrow.sequence, "Escrow add failed: {e}");
            return Verification::faulted();
        }
        let _ = self.events_tx.send(ServiceEvent::EscrowRecorded {
            account: escrow.account.clone(),
            sequence: escrow.sequence,
        });
        verification
    }

    /// Invalidate the policy cache. The next read reloads from the store.
    pub fn reset_cache(&self) {
        self.policies.invalidate();
        let _ = self.events_tx.send(ServiceEvent::CacheInvalidated);
        info!("Policy cache reset");
    }

    /// Request shutdown of the run loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run periodic housekeeping until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown channel closes unexpectedly.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting xrplink-node");
        let _ = self.events_tx.send(ServiceEvent::Started);

        let mut sweep_interval = tokio::time::interval(Duration::from_secs(
            self.config.pending.sweep_interval_secs.max(1),
        ));
        sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it.
        sweep_interval.tick().await;

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = sweep_interval.tick() => {
                    let stats = self.pending.sweep().await;
                    let _ = self.events_tx.send(ServiceEvent::SweepCompleted {
                        removed: stats.removed,
                    });
                }
            }
        }

        let _ = self.events_tx.send(ServiceEvent::ShuttingDown);
        info!("xrplink-node stopped");
        Ok(())
    }

    /// Shared payment check body.
    async fn payment_check(
        &self,
        origin: &str,
        application: &str,
        reference: &str,
        opts: &RequestOptions,
        enforce_window: bool,
    ) -> Verification {
        let Some(policy) = self.policies.get(origin, application).await else {
            warn!(%origin, %application, "Payment check without a tenant policy");
            return Verification::faulted();
        };

        let payload = match self.platform.fetch(application, reference).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%application, %reference, "Payment check fetch failed: {e}");
                return Verification::faulted();
            }
        };
        if !payload.meta.exists || !payload.is_signed() {
            return Verification::rejected();
        }
        let Some(payload_id) = payload.meta.uuid else {
            return Verification::rejected();
        };
        if !self
            .entitled(origin, application, payload_id, &payload, opts)
            .await
        {
            return Verification::rejected();
        }

        let referrer = opts.referrer.as_deref().unwrap_or(origin);

        if enforce_window {
            let Some(window) = resolve_window(&policy, origin, referrer) else {
                return Verification::unconfigured();
            };
            if !is_within_window(payload.resolved_at_utc(), window) {
                return Verification::expired();
            }
        }

        // Sign-in-as-proof flows carry no ledger transaction to verify.
        if opts.signin_to_validate
            && payload.request.payload_type.as_deref() == Some(SIGNIN_PAYLOAD_TYPE)
        {
            return Verification {
                success: true,
                account: payload.response.account.clone(),
                ..Verification::default()
            };
        }

        let expected = ExpectedPayment {
            destination: policy
                .destination_for(referrer)
                .map(|d| d.account.clone())
                .or_else(|| payload.request.requested_destination.clone()),
            destination_tag: policy.destination_for(referrer).and_then(|d| d.tag),
            amount: policy
                .amount_for(referrer)
                .cloned()
                .or_else(|| payload.request.requested_amount.clone()),
        };
        let Some(txid) = payload.response.txid.clone() else {
            debug!(%payload_id, "Signed payload carries no transaction id");
            return Verification::rejected();
        };

        match self.verifier.verify(&txid, &expected).await {
            Some(confirmation) => {
                let _ = self.events_tx.send(ServiceEvent::PaymentVerified {
                    txid: txid.clone(),
                    testnet: confirmation.network.is_test(),
                });
                Verification {
                    success: true,
                    testnet: confirmation.network.is_test(),
                    txid: Some(txid),
                    account: payload.response.account.clone(),
                    ..Verification::default()
                }
            }
            None => Verification::rejected(),
        }
    }

    /// Whether the caller identified by `opts` owns `payload_id`.
    ///
    /// Both the payload's declared type bucket and the catch-all bucket are
    /// consulted: webhooks without a type tag land in the latter.
    async fn entitled(
        &self,
        origin: &str,
        application: &str,
        payload_id: Uuid,
        payload: &Payload,
        opts: &RequestOptions,
    ) -> bool {
        let referrer = opts.referrer.as_deref();
        let payload_type = payload.request.payload_type.as_deref();

        let mut candidates: Vec<(IdentitySpace, &str)> = Vec::new();
        if let Some(front_end_id) = opts.front_end_id.as_deref() {
            candidates.push((IdentitySpace::FrontEnd, front_end_id));
        }
        if let Some(account) = opts.ledger_account.as_deref() {
            candidates.push((IdentitySpace::LedgerAccount, account));
        }

        for (space, identity) in candidates {
            for bucket in [payload_type, Some(CATCH_ALL_PAYLOAD_TYPE)] {
                if self
                    .ownership
                    .is_owner(
                        space,
                        Some(origin),
                        referrer,
                        application,
                        identity,
                        bucket,
                        payload_id,
                    )
                    .await
                {
                    return true;
                }
            }
        }
        false
    }

    /// Resolve the wallet identity to attach to a new submission.
    async fn resolve_known_identity(
        &self,
        application: &str,
        opts: &RequestOptions,
    ) -> Option<String> {
        if let Some(front_end_id) = opts.front_end_id.as_deref() {
            if let Some(wallet_user_id) = self
                .resolver
                .resolve_wallet_identity(application, front_end_id)
                .await
            {
                return Some(wallet_user_id);
            }
        }
        if let Some(account) = opts.ledger_account.as_deref() {
            return self
                .resolver
                .resolve_wallet_identity_by_account(application, account)
                .await;
        }
        None
    }

    /// Time-to-live for the pending record, from the payload's own expiry
    /// when present (minutes, platform convention) or the configured
    /// default.
    fn pending_ttl_seconds(&self, payload: &Value) -> i64 {
        // Duration arithmetic needs a sane upper bound.
        const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 3600;
        payload
            .get("options")
            .and_then(|options| options.get("expire"))
            .and_then(Value::as_i64)
            .filter(|minutes| *minutes > 0)
            .map_or_else(
                || i64::try_from(self.config.pending.default_ttl_secs).unwrap_or(MAX_TTL_SECS),
                |minutes| minutes.saturating_mul(60),
            )
            .min(MAX_TTL_SECS)
    }
}
