//! # Paper Desk Events
//!
//! This crate defines the event structures the trading desk broadcasts after every
//! decision cycle: fills, forced exits, rejected signals and account updates.
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the definitive
//! audit language for everything that happens to a simulated account.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{EngineEvent, LogLevel, LogMessage, RejectionNotice};
