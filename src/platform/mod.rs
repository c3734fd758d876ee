//! Signing platform client.
//!
//! The platform holds the authoritative payload state; this module forwards
//! requests opaquely and exposes the payload shape the engine needs for
//! entitlement checks, window policy and settlement verification.

use crate::error::{Error, Result};
use crate::ledger::ExpectedAmount;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Disposition flags of a payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PayloadMeta {
    /// Platform-assigned payload id; absent on placeholder responses.
    #[serde(default)]
    pub uuid: Option<Uuid>,
    /// The payload exists on the platform.
    pub exists: bool,
    /// The payload reached a final disposition.
    pub resolved: bool,
    /// The payload was signed.
    pub signed: bool,
    /// The signed transaction was submitted to the ledger.
    pub submit: bool,
    /// The payload expired before resolution.
    pub expired: bool,
}

/// What the payload asked the signer to do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRequest {
    /// Transaction type requested, e.g. `Payment` or `SignIn`.
    #[serde(rename = "type", default)]
    pub payload_type: Option<String>,
    /// Destination account requested, for payments.
    #[serde(default)]
    pub requested_destination: Option<String>,
    /// Amount requested, for payments.
    #[serde(default)]
    pub requested_amount: Option<ExpectedAmount>,
    /// When the payload stops being signable.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// What the signer produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadResponse {
    /// Signing account.
    #[serde(default)]
    pub account: Option<String>,
    /// Ledger transaction id of the signed transaction.
    #[serde(default)]
    pub txid: Option<String>,
    /// Hex-encoded signed transaction blob.
    #[serde(default)]
    pub signed_blob_hex: Option<String>,
    /// Result code reported when the platform dispatched the transaction.
    #[serde(default)]
    pub dispatched_result: Option<String>,
    /// When the payload resolved, as reported by the platform. Kept raw:
    /// an unparseable instant must count as expired, not fail the fetch.
    #[serde(default)]
    pub resolved_at: Option<String>,
}

/// Application context attached to a payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadApplication {
    /// Tenant application id.
    pub id: String,
    /// Wallet user token issued when the payload was opened.
    #[serde(default)]
    pub issued_user_token: Option<String>,
}

/// Full payload state as reported by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payload {
    /// Disposition flags.
    pub meta: PayloadMeta,
    /// Original request.
    #[serde(rename = "payload", default)]
    pub request: PayloadRequest,
    /// Signer response.
    #[serde(default)]
    pub response: PayloadResponse,
    /// Application context.
    #[serde(default)]
    pub application: PayloadApplication,
}

impl Payload {
    /// Whether the payload carries a well-formed signed transaction blob.
    /// A blob that does not decode as hex counts as not signed.
    #[must_use]
    pub fn has_signed_blob(&self) -> bool {
        self.response
            .signed_blob_hex
            .as_deref()
            .is_some_and(|blob| !blob.is_empty() && hex::decode(blob).is_ok())
    }

    /// Whether the payload was successfully signed.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.meta.signed && self.has_signed_blob()
    }

    /// Resolution instant, `None` when missing or unparseable.
    #[must_use]
    pub fn resolved_at_utc(&self) -> Option<DateTime<Utc>> {
        self.response
            .resolved_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Receipt returned when a payload is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Platform-assigned payload id.
    pub id: Uuid,
    /// Deep links for opening the payload in a wallet.
    #[serde(default)]
    pub links: HashMap<String, String>,
}

/// Client interface to the signing platform.
#[async_trait]
pub trait SigningPlatform: Send + Sync {
    /// Submit a payload for signing. The body is forwarded opaquely.
    async fn submit(&self, application: &str, payload: &serde_json::Value)
        -> Result<SubmitReceipt>;

    /// Fetch payload state by id or custom identifier.
    async fn fetch(&self, application: &str, reference: &str) -> Result<Payload>;

    /// Delete a payload.
    async fn delete(&self, application: &str, payload_id: Uuid) -> Result<()>;
}

/// HTTP client for the signing platform API.
pub struct HttpSigningPlatform {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpSigningPlatform {
    /// Create a client from platform configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &crate::config::PlatformConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        application: &str,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("x-application", application);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("x-api-key", api_key);
        }
        builder
    }
}

#[async_trait]
impl SigningPlatform for HttpSigningPlatform {
    async fn submit(
        &self,
        application: &str,
        payload: &serde_json::Value,
    ) -> Result<SubmitReceipt> {
        debug!(%application, "Submitting payload to signing platform");
        let response = self
            .request(reqwest::Method::POST, application, "/payload")
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch(&self, application: &str, reference: &str) -> Result<Payload> {
        debug!(%application, %reference, "Fetching payload from signing platform");
        let response = self
            .request(
                reqwest::Method::GET,
                application,
                &format!("/payload/{reference}"),
            )
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Platform(format!("payload {reference} not found")));
        }
        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn delete(&self, application: &str, payload_id: Uuid) -> Result<()> {
        debug!(%application, %payload_id, "Deleting payload on signing platform");
        self.request(
            reqwest::Method::DELETE,
            application,
            &format!("/payload/{payload_id}"),
        )
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }
}
