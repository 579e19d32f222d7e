use chrono::{DateTime, Utc};
use ipg_common::{ChainAddress, TokenAmount};
use serde::{Deserialize, Serialize};

use crate::db_types::Receipt;

/// Emitted by the indexer when a new receipt row is inserted (replays of an already-recorded receipt do not fire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecordedEvent {
    pub receipt: Receipt,
}

impl ReceiptRecordedEvent {
    pub fn new(receipt: Receipt) -> Self {
        Self { receipt }
    }
}

/// Emitted by the indexer the first time a revocation for an intent is observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRevokedEvent {
    pub intent: ChainAddress,
    pub revoked_by: ChainAddress,
    pub reason: Option<String>,
}

/// A single phase transition of a funded-payment run.
///
/// The orchestrator publishes one of these per transition, success or failure, so a UI can follow a run without the
/// engine knowing anything about rendering. `run_id` groups the transitions of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRunEvent {
    pub run_id: String,
    pub intent: ChainAddress,
    pub phase: String,
    pub detail: String,
    pub amount: TokenAmount,
    pub at: DateTime<Utc>,
}
