use ipg_common::{ChainAddress, TokenAmount};
use thiserror::Error;

use crate::{
    api::IntentQueryFilter,
    db_types::{Intent, MerchantEntry, NewIntent, NewReceipt, Receipt, Revocation, TopUp, Withdrawal},
    traits::{InsertResult, Paged, Pagination},
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Ledger database error: {0}")]
    DatabaseError(String),
    #[error("The intent {0} is not present in the ledger")]
    IntentNotFound(ChainAddress),
    #[error("Refusing to move the indexer cursor backwards from {current} to {requested}")]
    CursorRegression { current: i64, requested: i64 },
    #[error("Invalid query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// The ledger's write path.
///
/// The event indexer is the *only* caller of these methods; everything else consumes [`LedgerQueries`]. All writes
/// are idempotent (keyed on immutable identifiers) or monotonic-field updates, which is what makes a failed cycle
/// safe to re-run from the same cursor.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone + Send + Sync {
    /// The URL of the backing database.
    fn url(&self) -> &str;

    /// Insert the intent if it is not already present. Creation parameters never change, so observing the same
    /// `IntentCreated` event twice is a no-op.
    fn upsert_intent(&self, intent: NewIntent)
        -> impl std::future::Future<Output = Result<InsertResult, LedgerError>> + Send;

    /// Insert-or-ignore keyed by transaction id.
    fn record_receipt(&self, receipt: NewReceipt)
        -> impl std::future::Future<Output = Result<InsertResult, LedgerError>> + Send;

    fn record_topup(&self, topup: TopUp)
        -> impl std::future::Future<Output = Result<InsertResult, LedgerError>> + Send;

    fn record_withdrawal(&self, withdrawal: Withdrawal)
        -> impl std::future::Future<Output = Result<InsertResult, LedgerError>> + Send;

    /// Records the revocation row and marks the intent row `Revoked`. Terminal; repeat observations are no-ops.
    fn record_revocation(&self, revocation: Revocation)
        -> impl std::future::Future<Output = Result<InsertResult, LedgerError>> + Send;

    fn set_merchant_allowed(
        &self,
        intent: &ChainAddress,
        merchant: &ChainAddress,
        allowed: bool,
    ) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;

    /// Write the authoritative `spent` value read back from the contract after an execution was observed.
    fn update_spent(&self, intent: &ChainAddress, spent: TokenAmount)
        -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;

    /// The highest fully-processed block, or `None` before the first successful cycle.
    fn fetch_cursor(&self) -> impl std::future::Future<Output = Result<Option<u64>, LedgerError>> + Send;

    /// Advance the cursor to `block`. Fails with [`LedgerError::CursorRegression`] rather than ever moving it
    /// backwards.
    fn advance_cursor(&self, block: u64) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;

    /// Closes the database connection.
    fn close(&mut self) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send {
        async { Ok(()) }
    }
}

/// The ledger's read path, available to any concurrent consumer.
///
/// Readers see eventual consistency, not snapshot isolation: a query racing an indexing cycle may observe some but
/// not all of that cycle's new rows. The intent row's `spent` field is only written after its authoritative re-read,
/// so an intermediate view never reports spending the contract has not confirmed.
#[allow(async_fn_in_trait)]
pub trait LedgerQueries: Clone + Send + Sync {
    fn fetch_intent(&self, address: &ChainAddress)
        -> impl std::future::Future<Output = Result<Option<Intent>, LedgerError>> + Send;

    /// Every intent address the ledger knows about. The indexer scans each of these streams per cycle.
    fn intent_addresses(&self) -> impl std::future::Future<Output = Result<Vec<ChainAddress>, LedgerError>> + Send;

    fn search_intents(&self, filter: IntentQueryFilter)
        -> impl std::future::Future<Output = Result<Paged<Intent>, LedgerError>> + Send;

    /// Receipts for one intent, newest first.
    fn receipts_for_intent(
        &self,
        address: &ChainAddress,
        pagination: Pagination,
    ) -> impl std::future::Future<Output = Result<Paged<Receipt>, LedgerError>> + Send;

    fn receipt_count(&self, address: &ChainAddress)
        -> impl std::future::Future<Output = Result<i64, LedgerError>> + Send;

    fn receipt_by_txid(&self, txid: &str)
        -> impl std::future::Future<Output = Result<Option<Receipt>, LedgerError>> + Send;

    fn topups_for_intent(&self, address: &ChainAddress)
        -> impl std::future::Future<Output = Result<Vec<TopUp>, LedgerError>> + Send;

    fn withdrawals_for_intent(&self, address: &ChainAddress)
        -> impl std::future::Future<Output = Result<Vec<Withdrawal>, LedgerError>> + Send;

    fn revocations_for_intent(&self, address: &ChainAddress)
        -> impl std::future::Future<Output = Result<Vec<Revocation>, LedgerError>> + Send;

    fn merchants_for_intent(&self, address: &ChainAddress)
        -> impl std::future::Future<Output = Result<Vec<MerchantEntry>, LedgerError>> + Send;
}
