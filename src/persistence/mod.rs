//! Persistence Layer
//!
//! Durable storage for the trading state: open positions keyed by symbol
//! plus an append-only closed-trade history, serialized as a single JSON
//! file. This file is the sole source of truth consulted by startup
//! reconciliation, so every mutating call persists immediately.
//!
//! # Ledger layout
//!
//! ```json
//! {
//!   "positions": { "<symbol>": { "quantity": ..., "entry_price": ...,
//!                                "entry_time": ..., "order_id": ...,
//!                                "tier_hits": [...], "sl_hit": false,
//!                                "status": "open" } },
//!   "closed_trades": [ { ...position fields..., "exit_price": ...,
//!                        "exit_time": ..., "exit_quantity": ...,
//!                        "exit_order_id": ..., "profit_loss": ...,
//!                        "exit_reason": "take_profit" } ],
//!   "last_updated": "<timestamp>"
//! }
//! ```
//!
//! Exactly one process may own the ledger file; there is no file locking.

pub mod ledger;
