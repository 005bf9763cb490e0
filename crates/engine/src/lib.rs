//! # Paper Desk Engine
//!
//! The decision-cycle driver. A [`TradingDesk`] owns every simulated account and,
//! once per tick, marks open positions to the caller's prices, forces out any that
//! breached their risk rules, then routes, translates and applies the agent's
//! signals. Results come back as a [`TickReport`] and are broadcast as
//! [`events::EngineEvent`]s.

pub mod desk;
pub mod equity;
pub mod error;

pub use desk::{TickReport, TradingDesk};
pub use equity::{EquityCurve, EquityPoint};
pub use error::EngineError;
