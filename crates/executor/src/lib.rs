//! # Paper Desk Executor Crate
//!
//! This crate owns simulated account state and the only code allowed to change it.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** `ExecutionEngine::transition` is a pure function
//!   from a `Ledger` and an `Order` to a new `Ledger` plus a `TradeRecord`. The
//!   `Account` is the state holder that commits a transition only once it has
//!   succeeded, so opens, closes and forced exits share one code path and a failed
//!   order never leaves partial state behind.
//! - **No I/O:** prices and timestamps are always supplied by the caller.
//!
//! ## Public API
//!
//! - `Account`: the in-memory state manager for one simulated account.
//! - `ExecutionEngine`: the open/close/liquidation state machine.
//! - `TradeLog`: the append-only trade history with aggregate queries.
//! - `ExecutorError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod account;
pub mod engine;
pub mod error;
pub mod trade_log;

// Re-export the key components to provide a clean, public-facing API.
pub use account::{Account, Applied, MarkReport};
pub use engine::{ExecutionEngine, Ledger, Transition};
pub use error::ExecutorError;
pub use trade_log::TradeLog;
