use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::error::ConfigError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Account state error: {0}")]
    Executor(#[from] executor::ExecutorError),

    #[error("Signal payload error: {0}")]
    Signal(#[from] core_types::SignalError),

    #[error("Account '{0}' not found on the desk.")]
    AccountNotFound(Uuid),

    #[error("Account '{0}' is archived.")]
    AccountArchived(Uuid),
}
