//! Undertow — mean-reversion trading bot
//!
//! Library crate exposing the position and order lifecycle core: the
//! per-symbol signal state machine, the execution engine, the durable
//! trade ledger, and startup reconciliation.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod retry;
