//! Payload ownership and ledger validation for XRP Ledger signing flows.
//!
//! xrplink-node mediates between tenant applications and a wallet signing
//! platform: it submits signing payloads, tracks which identities may read
//! a payload's result, and independently re-verifies on the ledger that a
//! signed payment actually settled.
//!
//! The engine is built from a handful of components:
//!
//! - [`ownership`] - the multi-space ownership index and identity resolver
//! - [`policy`] - per-tenant origin policies, validation windows and the
//!   process-wide policy cache
//! - [`ledger`] - the multi-source settlement verifier
//! - [`pending`] - pending-request bookkeeping between submission and the
//!   platform webhook
//! - [`escrow`] - idempotent reconciliation of escrow execution records
//! - [`node`] - the orchestrator exposing the caller-facing operations

pub mod config;
pub mod error;
pub mod escrow;
pub mod event;
pub mod ledger;
pub mod node;
pub mod ownership;
pub mod pending;
pub mod platform;
pub mod policy;
pub mod store;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use event::{ServiceEvent, ServiceEventsChannel};
pub use node::{NodeBuilder, RequestOptions, RunningNode, Verification};
