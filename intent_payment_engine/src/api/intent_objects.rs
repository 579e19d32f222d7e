use ipg_common::ChainAddress;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{LifecycleStatus, Receipt},
    traits::{Paged, Pagination},
};

/// Search criteria for intents. Statuses are matched against the *derived* lifecycle (an `Expired` filter matches
/// stored-active rows whose end time has passed), so filtering and display can never disagree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentQueryFilter {
    pub payer: Option<ChainAddress>,
    pub agent: Option<ChainAddress>,
    pub token: Option<ChainAddress>,
    pub status: Option<Vec<LifecycleStatus>>,
    pub created_after_block: Option<i64>,
    pub created_before_block: Option<i64>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl IntentQueryFilter {
    pub fn with_payer(mut self, payer: ChainAddress) -> Self {
        self.payer = Some(payer);
        self
    }

    pub fn with_agent(mut self, agent: ChainAddress) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_token(mut self, token: ChainAddress) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_status(mut self, status: LifecycleStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn created_after_block(mut self, block: i64) -> Self {
        self.created_after_block = Some(block);
        self
    }

    pub fn created_before_block(mut self, block: i64) -> Self {
        self.created_before_block = Some(block);
        self
    }

    pub fn paged(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.payer.is_none()
            && self.agent.is_none()
            && self.token.is_none()
            && self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.created_after_block.is_none()
            && self.created_before_block.is_none()
    }
}

/// A page of receipts for one intent, newest first.
pub type ReceiptPage = Paged<Receipt>;
