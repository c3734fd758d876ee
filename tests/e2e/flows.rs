//! End-to-end scenarios: submit, webhook, check.

use crate::harness::{settled_payment, TestHarness};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;
use xrplink_node::ledger::Network;
use xrplink_node::pending::PayloadNotification;
use xrplink_node::policy::{Destination, OriginPolicy, ValidationWindow, ANY_REFERRER};
use xrplink_node::RequestOptions;

const ORIGIN: &str = "https://shop.example";
const APP: &str = "app-1";
const MERCHANT: &str = "rMerchantAccount";
const SIGNER: &str = "rSignerAccount";
const FRONT_END: &str = "fe-1";
const WALLET: &str = "wallet-1";

fn tenant_policy(windows: HashMap<String, ValidationWindow>) -> OriginPolicy {
    OriginPolicy {
        application: APP.to_string(),
        origins: vec![ORIGIN.to_string()],
        destinations: HashMap::from([(
            ANY_REFERRER.to_string(),
            Destination {
                account: MERCHANT.to_string(),
                tag: None,
            },
        )]),
        amounts: HashMap::new(),
        validation_windows: windows,
        return_urls: Vec::new(),
    }
}

fn day_window() -> HashMap<String, ValidationWindow> {
    HashMap::from([(ANY_REFERRER.to_string(), ValidationWindow::Millis(86_400_000))])
}

fn opts(front_end_id: &str) -> RequestOptions {
    RequestOptions {
        front_end_id: Some(front_end_id.to_string()),
        ..RequestOptions::default()
    }
}

/// Poll until the condition holds or a short deadline passes.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within deadline");
}

/// Submit a payment payload, let the signer resolve it, and deliver the
/// webhook. Returns the payload id.
async fn submit_signed_payment(harness: &TestHarness, txid: &str) -> Uuid {
    let receipt = harness
        .node
        .submit_payload(
            ORIGIN,
            APP,
            json!({ "txjson": { "TransactionType": "Payment", "Amount": 1_000_000 } }),
            &opts(FRONT_END),
        )
        .await
        .expect("submit should succeed");

    // Post-submission bookkeeping is an async task; wait for it to land.
    let store = harness.store.clone();
    wait_until(move || store.pending_len() == 1).await;

    harness
        .platform
        .sign(receipt.id, SIGNER, txid, Utc::now());
    harness
        .node
        .notify(&PayloadNotification {
            application: APP.to_string(),
            payload_id: receipt.id,
            signed: true,
            payload_type: Some("Payment".to_string()),
            wallet_user_id: Some(WALLET.to_string()),
            ledger_account: Some(SIGNER.to_string()),
            txid: Some(txid.to_string()),
        })
        .await;

    receipt.id
}

#[tokio::test]
async fn test_payment_within_window_then_expired() {
    let harness = TestHarness::setup().await;
    harness.seed_policy(tenant_policy(day_window())).await;
    harness.settle(Network::Main, "TXPAY1", settled_payment(MERCHANT, None, "1"));

    let payload_id = submit_signed_payment(&harness, "TXPAY1").await;

    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(verification.success);
    assert!(!verification.testnet);
    assert_eq!(verification.account.as_deref(), Some(SIGNER));
    assert_eq!(verification.txid.as_deref(), Some("TXPAY1"));

    // The same check 25 hours after resolution falls outside the window.
    harness
        .platform
        .set_resolved_at(payload_id, Utc::now() - ChronoDuration::hours(25));
    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(!verification.success);
    assert!(verification.payload_expired);
    assert!(!verification.no_validation_window);
}

#[tokio::test]
async fn test_non_owner_is_indistinguishable_from_missing() {
    let harness = TestHarness::setup().await;
    harness.seed_policy(tenant_policy(day_window())).await;
    harness.settle(Network::Main, "TXPAY2", settled_payment(MERCHANT, None, "1"));

    let payload_id = submit_signed_payment(&harness, "TXPAY2").await;

    // A different front-end identity gets a plain failure, no flags.
    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts("fe-intruder"))
        .await;
    assert!(!verification.success);
    assert!(!verification.payload_expired);
    assert!(!verification.error);

    assert!(harness
        .node
        .get_payload(ORIGIN, APP, &payload_id.to_string(), &opts("fe-intruder"))
        .await
        .is_none());
    assert!(harness
        .node
        .get_payload(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await
        .is_some());
}

#[tokio::test]
async fn test_rest_fallback_confirms_when_nodes_are_down() {
    let harness = TestHarness::setup_with_unreachable_main_nodes().await;
    harness.seed_policy(tenant_policy(day_window())).await;
    harness.settle(Network::Main, "TXPAY3", settled_payment(MERCHANT, None, "1"));

    let payload_id = submit_signed_payment(&harness, "TXPAY3").await;

    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(verification.success, "REST fallback should confirm");
    assert!(!verification.testnet);
}

#[tokio::test]
async fn test_testnet_only_settlement_sets_flag() {
    let harness = TestHarness::setup().await;
    harness.seed_policy(tenant_policy(day_window())).await;
    harness.settle(Network::Test, "TXPAY4", settled_payment(MERCHANT, None, "1"));

    let payload_id = submit_signed_payment(&harness, "TXPAY4").await;

    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(verification.success);
    assert!(verification.testnet);
}

#[tokio::test]
async fn test_amount_mismatch_is_rejected() {
    let harness = TestHarness::setup().await;
    harness.seed_policy(tenant_policy(day_window())).await;
    // Delivered 2 XRP where 1,000,000 drops were requested.
    harness.settle(Network::Main, "TXPAY5", settled_payment(MERCHANT, None, "2"));

    let payload_id = submit_signed_payment(&harness, "TXPAY5").await;

    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(!verification.success);
    assert!(!verification.payload_expired);
}

#[tokio::test]
async fn test_missing_window_configuration_is_a_distinct_failure() {
    let harness = TestHarness::setup().await;
    harness.seed_policy(tenant_policy(HashMap::new())).await;
    harness.settle(Network::Main, "TXPAY6", settled_payment(MERCHANT, None, "1"));

    let payload_id = submit_signed_payment(&harness, "TXPAY6").await;

    let windowed = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(!windowed.success);
    assert!(windowed.no_validation_window);
    assert!(!windowed.payload_expired);

    // The immediate variant does not consult the window at all.
    let immediate = harness
        .node
        .check_payment(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(immediate.success);
}

#[tokio::test]
async fn test_cache_reset_picks_up_policy_change() {
    let harness = TestHarness::setup().await;
    harness.seed_policy(tenant_policy(day_window())).await;
    harness.settle(Network::Main, "TXPAY7", settled_payment(MERCHANT, None, "1"));

    let payload_id = submit_signed_payment(&harness, "TXPAY7").await;
    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(verification.success);

    // Remove the window configuration; the cached policy still serves.
    harness.seed_policy(tenant_policy(HashMap::new())).await;
    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(verification.success, "stale read before reset is accepted");

    harness.node.reset_cache();
    let verification = harness
        .node
        .check_payment_windowed(ORIGIN, APP, &payload_id.to_string(), &opts(FRONT_END))
        .await;
    assert!(verification.no_validation_window);
}

#[tokio::test]
async fn test_signin_flow_links_account_to_wallet() {
    let harness = TestHarness::setup().await;
    harness.seed_policy(tenant_policy(day_window())).await;

    let receipt = harness
        .node
        .submit_payload(
            ORIGIN,
            APP,
            json!({ "txjson": { "TransactionType": "SignIn" } }),
            &opts(FRONT_END),
        )
        .await
        .expect("submit should succeed");

    let store = harness.store.clone();
    wait_until(move || store.pending_len() == 1).await;

    harness
        .platform
        .sign(receipt.id, SIGNER, "TXSIGNIN", Utc::now());
    harness
        .node
        .notify(&PayloadNotification {
            application: APP.to_string(),
            payload_id: receipt.id,
            signed: true,
            payload_type: Some("SignIn".to_string()),
            wallet_user_id: Some(WALLET.to_string()),
            ledger_account: Some(SIGNER.to_string()),
            txid: None,
        })
        .await;

    let verification = harness
        .node
        .check_signin(ORIGIN, APP, &receipt.id.to_string(), &opts(FRONT_END))
        .await;
    assert!(verification.success);
    assert_eq!(verification.account.as_deref(), Some(SIGNER));

    // The sign-in is now the strongest account-to-wallet linkage.
    let resolved = harness
        .node
        .resolver()
        .resolve_wallet_identity_by_account(APP, SIGNER)
        .await;
    assert_eq!(resolved.as_deref(), Some(WALLET));
}

#[tokio::test]
async fn test_submit_without_policy_is_refused() {
    let harness = TestHarness::setup().await;

    let result = harness
        .node
        .submit_payload(
            "https://unknown.example",
            APP,
            json!({ "txjson": { "TransactionType": "Payment" } }),
            &opts(FRONT_END),
        )
        .await;
    assert!(result.is_err());
}
