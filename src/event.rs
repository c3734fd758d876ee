//! Service event system.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the node.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// Node has started successfully.
    Started,

    /// Node is shutting down.
    ShuttingDown,

    /// A payload was submitted to the signing platform.
    PayloadSubmitted {
        /// Tenant application id.
        application: String,
        /// Platform-assigned payload id.
        payload_id: Uuid,
    },

    /// A pending request was resolved into the ownership index.
    PendingResolved {
        /// Payload id of the resolved request.
        payload_id: Uuid,
    },

    /// A payment was confirmed on the ledger.
    PaymentVerified {
        /// Transaction id.
        txid: String,
        /// True when only the test network confirmed.
        testnet: bool,
    },

    /// An escrow execution record was created downstream.
    EscrowRecorded {
        /// Escrow owner account.
        account: String,
        /// Escrow create sequence.
        sequence: u32,
    },

    /// The policy cache was invalidated.
    CacheInvalidated,

    /// A pending-record sweep finished.
    SweepCompleted {
        /// Number of stale records removed.
        removed: u64,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving service events.
pub type ServiceEventsChannel = broadcast::Receiver<ServiceEvent>;

/// Sender for service events.
pub type ServiceEventsSender = broadcast::Sender<ServiceEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (ServiceEventsSender, ServiceEventsChannel) {
    broadcast::channel(256)
}
