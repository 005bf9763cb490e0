//! # Paper Desk Risk
//!
//! Turns validated agent signals into sized, priced orders, or into a typed
//! [`Rejection`] explaining why no order was produced.
//!
//! - [`SignalTranslator`] sizes entries, enforces leverage, capital, minimum
//!   notional and exit-plan rules, and builds full-quantity closes.
//! - [`ConfidenceWeightedRouter`] settles conflicting signals for one symbol
//!   within a single decision cycle.

use core_types::{AccountSnapshot, Order, PositionSnapshot, Rejection, Signal};
use rust_decimal::Decimal;

pub mod error;
pub mod router;
pub mod translator;

pub use error::RiskError;
pub use router::{ConfidenceWeightedRouter, Routed};
pub use translator::SignalTranslator;

/// Converts a signal into an executable order against the current account state.
pub trait OrderTranslator: Send + Sync {
    /// Returns `Ok(None)` for signals that require no action (`hold`).
    ///
    /// `position` is the open position for the signal's symbol, if any, and `price`
    /// is the caller-supplied price the order will be filled at.
    fn translate(
        &self,
        signal: &Signal,
        account: &AccountSnapshot,
        position: Option<&PositionSnapshot>,
        price: Decimal,
    ) -> Result<Option<Order>, Rejection>;
}
