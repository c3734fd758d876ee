//! Test harness wiring a node to mock collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use xrplink_node::error::{Error, Result};
use xrplink_node::ledger::{
    LedgerProvider, LedgerTx, LedgerVerifier, Network, ProviderChain, TxLookup,
};
use xrplink_node::platform::{Payload, SigningPlatform, SubmitReceipt};
use xrplink_node::policy::OriginPolicy;
use xrplink_node::store::{MemoryStore, Store};
use xrplink_node::{NodeBuilder, NodeConfig, RunningNode};

/// Signing platform mock holding payload state in memory.
#[derive(Default)]
pub struct MockPlatform {
    payloads: Mutex<HashMap<String, Payload>>,
}

impl MockPlatform {
    /// Mark a payload as signed and resolved.
    pub fn sign(
        &self,
        payload_id: Uuid,
        account: &str,
        txid: &str,
        resolved_at: DateTime<Utc>,
    ) {
        let mut payloads = self.payloads.lock();
        let payload = payloads
            .get_mut(&payload_id.to_string())
            .expect("payload must exist before signing");
        payload.meta.resolved = true;
        payload.meta.signed = true;
        payload.meta.submit = true;
        payload.response.account = Some(account.to_string());
        payload.response.txid = Some(txid.to_string());
        payload.response.signed_blob_hex = Some("deadbeef".to_string());
        payload.response.dispatched_result = Some("tesSUCCESS".to_string());
        payload.response.resolved_at = Some(resolved_at.to_rfc3339());
    }

    /// Rewrite a payload's resolution instant (to age a proof).
    pub fn set_resolved_at(&self, payload_id: Uuid, resolved_at: DateTime<Utc>) {
        let mut payloads = self.payloads.lock();
        let payload = payloads
            .get_mut(&payload_id.to_string())
            .expect("payload must exist");
        payload.response.resolved_at = Some(resolved_at.to_rfc3339());
    }
}

#[async_trait]
impl SigningPlatform for MockPlatform {
    async fn submit(&self, application: &str, body: &serde_json::Value) -> Result<SubmitReceipt> {
        let id = Uuid::new_v4();
        let txjson = body.get("txjson").cloned().unwrap_or_default();

        let mut payload = Payload::default();
        payload.meta.uuid = Some(id);
        payload.meta.exists = true;
        payload.application.id = application.to_string();
        payload.request.payload_type = txjson
            .get("TransactionType")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        payload.request.requested_destination = txjson
            .get("Destination")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        payload.request.requested_amount = txjson
            .get("Amount")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());

        self.payloads.lock().insert(id.to_string(), payload);
        Ok(SubmitReceipt {
            id,
            links: HashMap::new(),
        })
    }

    async fn fetch(&self, _application: &str, reference: &str) -> Result<Payload> {
        self.payloads
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::Platform(format!("payload {reference} not found")))
    }

    async fn delete(&self, _application: &str, payload_id: Uuid) -> Result<()> {
        self.payloads.lock().remove(&payload_id.to_string());
        Ok(())
    }
}

type TxMap = Arc<Mutex<HashMap<String, LedgerTx>>>;

/// Ledger provider serving a shared scripted transaction map, or scripted
/// to be unreachable.
struct ScriptedProvider {
    label: String,
    network: Network,
    unreachable: bool,
    transactions: TxMap,
}

#[async_trait]
impl LedgerProvider for ScriptedProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn network(&self) -> Network {
        self.network
    }

    async fn lookup(&self, txid: &str) -> Result<TxLookup> {
        if self.unreachable {
            return Err(Error::Ledger(format!("{}: connection refused", self.label)));
        }
        Ok(self
            .transactions
            .lock()
            .get(txid)
            .cloned()
            .map_or(TxLookup::NotFound, TxLookup::Found))
    }
}

/// A node over mock collaborators, plus handles to script them.
pub struct TestHarness {
    pub node: RunningNode,
    pub store: Arc<MemoryStore>,
    pub platform: Arc<MockPlatform>,
    pub main_txs: TxMap,
    pub test_txs: TxMap,
}

impl TestHarness {
    /// Set up a node with every ledger provider reachable.
    pub async fn setup() -> Self {
        Self::setup_with_node_health(true, true).await
    }

    /// Set up a node whose main-network node providers refuse connections,
    /// leaving only the REST fallback reachable there.
    pub async fn setup_with_unreachable_main_nodes() -> Self {
        Self::setup_with_node_health(false, true).await
    }

    async fn setup_with_node_health(main_nodes_up: bool, test_nodes_up: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(MockPlatform::default());
        let main_txs: TxMap = Arc::new(Mutex::new(HashMap::new()));
        let test_txs: TxMap = Arc::new(Mutex::new(HashMap::new()));

        let chain = |network: Network, nodes_up: bool, transactions: &TxMap| {
            let providers: Vec<Arc<dyn LedgerProvider>> = vec![
                Arc::new(ScriptedProvider {
                    label: format!("{}/primary", network.as_str()),
                    network,
                    unreachable: !nodes_up,
                    transactions: transactions.clone(),
                }),
                Arc::new(ScriptedProvider {
                    label: format!("{}/secondary", network.as_str()),
                    network,
                    unreachable: !nodes_up,
                    transactions: transactions.clone(),
                }),
                Arc::new(ScriptedProvider {
                    label: format!("{}/rest", network.as_str()),
                    network,
                    unreachable: false,
                    transactions: transactions.clone(),
                }),
            ];
            ProviderChain { network, providers }
        };

        let verifier = LedgerVerifier::new(
            vec![
                chain(Network::Main, main_nodes_up, &main_txs),
                chain(Network::Test, test_nodes_up, &test_txs),
            ],
            Duration::from_secs(1),
        );

        let node = NodeBuilder::new(NodeConfig::default())
            .with_store(store.clone())
            .with_platform(platform.clone())
            .with_verifier(verifier)
            .build()
            .await
            .expect("node should build");

        Self {
            node,
            store,
            platform,
            main_txs,
            test_txs,
        }
    }

    /// Store a tenant policy.
    pub async fn seed_policy(&self, policy: OriginPolicy) {
        self.store
            .put_policy(policy)
            .await
            .expect("policy should store");
    }

    /// Script a settled transaction on the given network.
    pub fn settle(&self, network: Network, txid: &str, tx: LedgerTx) {
        let map = if network.is_test() {
            &self.test_txs
        } else {
            &self.main_txs
        };
        map.lock().insert(txid.to_string(), tx);
    }
}

/// A validated, successful payment transaction.
pub fn settled_payment(destination: &str, tag: Option<u32>, xrp_value: &str) -> LedgerTx {
    LedgerTx {
        tx_type: "Payment".to_string(),
        result_code: "tesSUCCESS".to_string(),
        destination: Some(destination.to_string()),
        destination_tag: tag,
        delivered: Some(xrplink_node::ledger::DeliveredAmount {
            currency: "XRP".to_string(),
            issuer: None,
            value: xrp_value.to_string(),
        }),
        validated: true,
    }
}
