//! End-to-end tests for xrplink-node.
//!
//! Every scenario runs a real node over the in-memory store, a mock
//! signing platform and scripted ledger providers; only the process
//! boundary is faked.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod flows;
mod harness;
