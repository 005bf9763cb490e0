//! # Paper Desk Core Types
//!
//! The shared vocabulary of the workspace: signals coming from the agent, the orders
//! they are translated into, positions, trade records, snapshots and the rejection
//! taxonomy. As a Layer 0 crate it has no knowledge of configuration, execution or I/O.

pub mod enums;
pub mod error;
pub mod money;
pub mod rejection;
pub mod signal;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{ExitTrigger, PositionSide, SignalKind, SymbolState, TradeAction};
pub use error::{CoreError, SignalError};
pub use rejection::{RejectedSignal, Rejection, RejectionKind};
pub use signal::{EntryIntent, ExitPlan, RawSignal, Signal, Sizing, parse_signals};
pub use structs::{
    AccountSnapshot, MarketSnapshot, Order, Position, PositionSnapshot, TradeRecord,
};
