use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Arithmetic overflow while computing {0}")]
    Overflow(&'static str),
}

/// Shape errors raised while turning raw agent output into a [`crate::Signal`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("Signal payload is not valid JSON: {0}")]
    Json(String),

    #[error("Expected a signal object, found {0}")]
    NotAnObject(String),

    #[error("Unknown signal type '{0}'")]
    UnknownSignal(String),

    #[error("Missing required field '{field}' for a {kind} signal")]
    MissingField { field: &'static str, kind: String },

    #[error("Field '{field}' is out of range: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: Decimal,
        expected: &'static str,
    },

    #[error("Signal must size by exactly one of 'allocation_pct' or 'quantity'")]
    AmbiguousSizing,
}
