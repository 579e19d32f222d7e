//! Read-side API over the ledger mirror.
//!
//! Everything here is display/audit material. Authorization decisions (caps, windows, allowlists) belong to the
//! escrow contract alone; a view served from the mirror may lag the chain by up to one indexing cycle.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use ipg_common::ChainAddress;
use log::trace;

use crate::{
    api::{errors::QueryApiError, IntentQueryFilter, ReceiptPage},
    db_types::{Intent, LifecycleStatus, MerchantEntry, TopUp, Withdrawal},
    projector::{self, IntentView},
    traits::{LedgerQueries, Paged, Pagination},
};

/// The `IntentQueryApi` provides a unified read API over the intent mirror.
pub struct IntentQueryApi<B> {
    db: B,
}

impl<B: Debug> Debug for IntentQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IntentQueryApi ({:?})", self.db)
    }
}

impl<B> IntentQueryApi<B>
where B: LedgerQueries
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Intents created by the given payer, optionally narrowed to a set of (derived) lifecycle states.
    pub async fn intents_for_payer(
        &self,
        payer: &ChainAddress,
        status: Option<Vec<LifecycleStatus>>,
        pagination: Pagination,
    ) -> Result<Paged<Intent>, QueryApiError> {
        let mut filter = IntentQueryFilter::default().with_payer(payer.clone()).paged(pagination);
        filter.status = status;
        let page = self.db.search_intents(filter).await?;
        trace!("{} of {} intents fetched for payer {payer}", page.items.len(), page.total);
        Ok(page)
    }

    /// Intents granted to the given agent, optionally narrowed to a set of (derived) lifecycle states.
    pub async fn intents_for_agent(
        &self,
        agent: &ChainAddress,
        status: Option<Vec<LifecycleStatus>>,
        pagination: Pagination,
    ) -> Result<Paged<Intent>, QueryApiError> {
        let mut filter = IntentQueryFilter::default().with_agent(agent.clone()).paged(pagination);
        filter.status = status;
        let page = self.db.search_intents(filter).await?;
        trace!("{} of {} intents fetched for agent {agent}", page.items.len(), page.total);
        Ok(page)
    }

    pub async fn search_intents(&self, filter: IntentQueryFilter) -> Result<Paged<Intent>, QueryApiError> {
        Ok(self.db.search_intents(filter).await?)
    }

    /// The full folded summary for one intent, or `None` if the mirror has never seen it.
    pub async fn intent_summary(&self, address: &ChainAddress) -> Result<Option<IntentView>, QueryApiError> {
        self.intent_summary_at(address, Utc::now()).await
    }

    /// As [`intent_summary`](Self::intent_summary), with an explicit clock for deterministic callers.
    pub async fn intent_summary_at(
        &self,
        address: &ChainAddress,
        now: DateTime<Utc>,
    ) -> Result<Option<IntentView>, QueryApiError> {
        let intent = match self.db.fetch_intent(address).await? {
            Some(intent) => intent,
            None => return Ok(None),
        };
        let receipts = self.db.receipts_for_intent(address, Pagination::new(0, crate::traits::MAX_PAGE_SIZE)).await?;
        let topups = self.db.topups_for_intent(address).await?;
        let withdrawals = self.db.withdrawals_for_intent(address).await?;
        let revocations = self.db.revocations_for_intent(address).await?;
        let merchants = self.db.merchants_for_intent(address).await?;
        let mut view =
            projector::project(&intent, &receipts.items, &topups, &withdrawals, &revocations, &merchants, now);
        // The summary page may be capped; the count column is not.
        view.receipt_count = self.db.receipt_count(address).await? as usize;
        Ok(Some(view))
    }

    /// Receipts for one intent, paginated, newest first.
    pub async fn receipts_for_intent(
        &self,
        address: &ChainAddress,
        pagination: Pagination,
    ) -> Result<ReceiptPage, QueryApiError> {
        Ok(self.db.receipts_for_intent(address, pagination).await?)
    }

    /// The funding side of the escrow's history: all top-ups and withdrawals.
    pub async fn funding_history(
        &self,
        address: &ChainAddress,
    ) -> Result<(Vec<TopUp>, Vec<Withdrawal>), QueryApiError> {
        let topups = self.db.topups_for_intent(address).await?;
        let withdrawals = self.db.withdrawals_for_intent(address).await?;
        Ok((topups, withdrawals))
    }

    /// The intent's allowlist entries. Empty means "no restriction" by contract convention.
    pub async fn merchants_for_intent(&self, address: &ChainAddress) -> Result<Vec<MerchantEntry>, QueryApiError> {
        Ok(self.db.merchants_for_intent(address).await?)
    }
}
