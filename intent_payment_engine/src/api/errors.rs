use thiserror::Error;

use crate::traits::LedgerError;

#[derive(Debug, Clone, Error)]
pub enum QueryApiError {
    #[error("{0}")]
    LedgerError(#[from] LedgerError),
    #[error("The intent {0} is not present in the ledger")]
    IntentNotFound(String),
    #[error("Invalid query: {0}")]
    BadQuery(String),
}
