//! `SqliteDatabase` is a concrete implementation of the intent ledger backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the ledger traits defined in the
//! [`traits`](crate::traits) module.
use std::fmt::Debug;

use chrono::Utc;
use ipg_common::{ChainAddress, TokenAmount};
use log::*;
use sqlx::SqlitePool;

use super::db::{cursor, db_url, funding, intents, merchants, new_pool, receipts, revocations};
use crate::{
    api::IntentQueryFilter,
    db_types::{Intent, MerchantEntry, NewIntent, NewReceipt, Receipt, Revocation, TopUp, Withdrawal},
    traits::{InsertResult, LedgerDatabase, LedgerError, LedgerQueries, Paged, Pagination},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, LedgerError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies any outstanding schema migrations. Call once at startup.
    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./src/sqlite/db/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::DatabaseError(e.to_string()))?;
        info!("🗃️ Ledger migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn upsert_intent(&self, intent: NewIntent) -> Result<InsertResult, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::idempotent_insert(intent, &mut conn).await
    }

    async fn record_receipt(&self, receipt: NewReceipt) -> Result<InsertResult, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        receipts::idempotent_insert(receipt, &mut conn).await
    }

    async fn record_topup(&self, topup: TopUp) -> Result<InsertResult, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        funding::idempotent_insert_topup(topup, &mut conn).await
    }

    async fn record_withdrawal(&self, withdrawal: Withdrawal) -> Result<InsertResult, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        funding::idempotent_insert_withdrawal(withdrawal, &mut conn).await
    }

    /// The revocation row and the intent's terminal status land in one transaction, so a reader can never observe
    /// the revocation event without the revoked intent (or vice versa).
    async fn record_revocation(&self, revocation: Revocation) -> Result<InsertResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let address = revocation.intent_address.clone();
        let result = revocations::idempotent_insert(revocation, &mut tx).await?;
        if result.was_inserted() {
            intents::mark_revoked(&address, &mut tx).await?;
            debug!("🗃️ Intent {address} is now Revoked");
        }
        tx.commit().await?;
        Ok(result)
    }

    async fn set_merchant_allowed(
        &self,
        intent: &ChainAddress,
        merchant: &ChainAddress,
        allowed: bool,
    ) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        merchants::set_allowed(intent, merchant, allowed, &mut conn).await
    }

    async fn update_spent(&self, intent: &ChainAddress, spent: TokenAmount) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::update_spent(intent, spent, &mut conn).await
    }

    async fn fetch_cursor(&self) -> Result<Option<u64>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        cursor::fetch_cursor(&mut conn).await
    }

    async fn advance_cursor(&self, block: u64) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        cursor::advance_cursor(block, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl LedgerQueries for SqliteDatabase {
    async fn fetch_intent(&self, address: &ChainAddress) -> Result<Option<Intent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::fetch_intent(address, &mut conn).await
    }

    async fn intent_addresses(&self) -> Result<Vec<ChainAddress>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::all_addresses(&mut conn).await
    }

    async fn search_intents(&self, filter: IntentQueryFilter) -> Result<Paged<Intent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::search_intents(filter, Utc::now(), &mut conn).await
    }

    async fn receipts_for_intent(
        &self,
        address: &ChainAddress,
        pagination: Pagination,
    ) -> Result<Paged<Receipt>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        receipts::fetch_receipts(address, pagination, &mut conn).await
    }

    async fn receipt_count(&self, address: &ChainAddress) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        receipts::count_receipts(address, &mut conn).await
    }

    async fn receipt_by_txid(&self, txid: &str) -> Result<Option<Receipt>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        receipts::fetch_receipt(txid, &mut conn).await
    }

    async fn topups_for_intent(&self, address: &ChainAddress) -> Result<Vec<TopUp>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        funding::fetch_topups(address, &mut conn).await
    }

    async fn withdrawals_for_intent(&self, address: &ChainAddress) -> Result<Vec<Withdrawal>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        funding::fetch_withdrawals(address, &mut conn).await
    }

    async fn revocations_for_intent(&self, address: &ChainAddress) -> Result<Vec<Revocation>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        revocations::fetch_revocations(address, &mut conn).await
    }

    async fn merchants_for_intent(&self, address: &ChainAddress) -> Result<Vec<MerchantEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        merchants::fetch_merchants(address, &mut conn).await
    }
}
