use crate::enums::{PositionSide, SignalKind};
use crate::error::SignalError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The three classes a rejected signal can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The signal or its inputs failed a sanity rule.
    ValidationRejected,
    /// The account cannot fund the order.
    InsufficientCapital,
    /// The signal does not fit the symbol's current position state.
    StateConflict,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RejectionKind::ValidationRejected => "validation_rejected",
            RejectionKind::InsufficientCapital => "insufficient_capital",
            RejectionKind::StateConflict => "state_conflict",
        };
        f.write_str(label)
    }
}

/// Why a signal did not produce an order. Rejections are ordinary values, not failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("Malformed signal: {message}")]
    MalformedSignal { message: String },

    #[error("Price for {symbol} must be positive, got {price}")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("No price for {symbol} in the market snapshot")]
    MissingPrice { symbol: String },

    #[error("Snapshot from {as_of} is older than the last processed snapshot from {last_seen}")]
    StalePrice {
        as_of: DateTime<Utc>,
        last_seen: DateTime<Utc>,
    },

    #[error("Leverage {requested} exceeds the maximum of {max}")]
    LeverageAboveLimit { requested: Decimal, max: Decimal },

    #[error("Superseded by a {winner} signal with confidence {winning_confidence}")]
    SupersededSignal {
        winner: SignalKind,
        winning_confidence: Decimal,
    },

    #[error("A {side} position in {symbol} is already open")]
    PositionAlreadyOpen { symbol: String, side: PositionSide },

    #[error("No open position in {symbol} to close")]
    NoOpenPosition { symbol: String },

    #[error("No cash available ({cash})")]
    NonPositiveCash { cash: Decimal },

    #[error("Margin {margin} plus fee {fee} exceeds available cash {cash}")]
    MarginExceedsCash {
        margin: Decimal,
        fee: Decimal,
        cash: Decimal,
    },

    #[error("Notional {notional} is below the minimum of {minimum}")]
    BelowMinimumNotional { notional: Decimal, minimum: Decimal },

    #[error("Profit target {profit_target} is on the wrong side of entry {entry} for a {side}")]
    ProfitTargetWrongSide {
        side: PositionSide,
        entry: Decimal,
        profit_target: Decimal,
    },

    #[error("Order for {symbol} could not be sized: {message}")]
    Unsizable { symbol: String, message: String },

    #[error("Stop loss {stop_loss} is on the wrong side of entry {entry} for a {side}")]
    StopLossWrongSide {
        side: PositionSide,
        entry: Decimal,
        stop_loss: Decimal,
    },
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::PositionAlreadyOpen { .. } | Rejection::NoOpenPosition { .. } => {
                RejectionKind::StateConflict
            }
            Rejection::NonPositiveCash { .. } | Rejection::MarginExceedsCash { .. } => {
                RejectionKind::InsufficientCapital
            }
            Rejection::MalformedSignal { .. }
            | Rejection::InvalidPrice { .. }
            | Rejection::MissingPrice { .. }
            | Rejection::StalePrice { .. }
            | Rejection::LeverageAboveLimit { .. }
            | Rejection::SupersededSignal { .. }
            | Rejection::BelowMinimumNotional { .. }
            | Rejection::ProfitTargetWrongSide { .. }
            | Rejection::Unsizable { .. }
            | Rejection::StopLossWrongSide { .. } => RejectionKind::ValidationRejected,
        }
    }
}

impl From<SignalError> for Rejection {
    fn from(err: SignalError) -> Self {
        Rejection::MalformedSignal {
            message: err.to_string(),
        }
    }
}

/// A rejection tied to the signal that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSignal {
    /// Empty when the payload was too broken to name a symbol.
    pub symbol: String,
    pub signal_kind: Option<SignalKind>,
    pub rejection: Rejection,
}

impl RejectedSignal {
    pub fn kind(&self) -> RejectionKind {
        self.rejection.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn kinds_follow_taxonomy() {
        let conflict = Rejection::NoOpenPosition { symbol: "ETH".into() };
        assert_eq!(conflict.kind(), RejectionKind::StateConflict);

        let capital = Rejection::NonPositiveCash { cash: dec!(0) };
        assert_eq!(capital.kind(), RejectionKind::InsufficientCapital);

        let stale = Rejection::StalePrice {
            as_of: DateTime::<Utc>::MIN_UTC,
            last_seen: DateTime::<Utc>::MAX_UTC,
        };
        assert_eq!(stale.kind(), RejectionKind::ValidationRejected);
    }

    #[test]
    fn signal_errors_become_validation_rejections() {
        let rejection = Rejection::from(SignalError::AmbiguousSizing);
        assert_eq!(rejection.kind(), RejectionKind::ValidationRejected);
        assert!(rejection.to_string().contains("exactly one"));
    }

    #[test]
    fn serializes_with_reason_tag() {
        let rejection = Rejection::BelowMinimumNotional {
            notional: dec!(5),
            minimum: dec!(10),
        };
        let value = serde_json::to_value(&rejection).unwrap();
        assert_eq!(value["reason"], "below_minimum_notional");
    }
}
