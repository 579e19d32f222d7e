use intent_payment_engine::traits::{ChainError, LedgerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Could not initialize the ledger database. {0}")]
    InitializeError(#[from] LedgerError),
    #[error("Could not reach the chain endpoint. {0}")]
    ChainError(#[from] ChainError),
}
