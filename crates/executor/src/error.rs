use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// An order violated a ledger invariant. The account is left untouched.
    #[error("Execution of {symbol} failed: {reason}")]
    ExecutionFailed { symbol: String, reason: String },

    #[error("Account {0} is archived")]
    AccountArchived(Uuid),

    #[error("Simulation parameters are invalid: {0}")]
    InvalidParameters(String),

    #[error("Cash is not conserved: expected {expected}, found {actual}")]
    ConservationBreach { expected: Decimal, actual: Decimal },
}

impl ExecutorError {
    pub(crate) fn failed(symbol: &str, reason: impl Into<String>) -> Self {
        ExecutorError::ExecutionFailed {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}
