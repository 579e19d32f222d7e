//! The event indexer: a singleton polling worker that folds on-chain events into the ledger mirror.
//!
//! Exactly one cycle runs at a time. The ledger's write path has no other caller, so all indexing writes are
//! serialized by construction and need no locking beyond ordinary transactional commit. Readers may race a cycle
//! and see a partially-advanced view; that is eventual consistency, and it is safe because `spent` is only written
//! from the contract's own counter after the fact.
mod worker;

use std::{
    collections::HashMap,
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use ipg_common::ChainAddress;
use log::*;
use thiserror::Error;
pub use worker::start_indexer_worker;

use crate::{
    db_types::{NewIntent, NewReceipt, Revocation, TopUp, Withdrawal},
    events::{EventProducers, IntentRevokedEvent, ReceiptRecordedEvent},
    traits::{
        ChainError,
        ChainEvent,
        ChainReader,
        ContractReader,
        EventKind,
        EventPayload,
        ExecutedEvent,
        LedgerDatabase,
        LedgerError,
        LedgerQueries,
        RevokedEvent,
    },
};

/// How far back a cycle will reach when the cursor has fallen behind the chain tip. Events older than this are
/// never scanned again once the window has moved past them. See DESIGN.md for the catch-up discussion.
pub const DEFAULT_CATCHUP_WINDOW: u64 = 1000;

/// The timer period for the indexer worker.
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, Error)]
pub enum IndexerError {
    #[error("{0}")]
    Chain(#[from] ChainError),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    /// The factory contract that announces new intents.
    pub factory: ChainAddress,
    pub catchup_window: u64,
}

impl IndexerSettings {
    pub fn new(factory: ChainAddress) -> Self {
        Self { factory, catchup_window: DEFAULT_CATCHUP_WINDOW }
    }

    pub fn with_catchup_window(mut self, window: u64) -> Self {
        self.catchup_window = window;
        self
    }
}

/// What one polling cycle did. Returned from [`EventIndexer::poll_once`] and logged by the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// True when the tick found a cycle already in flight and did nothing.
    pub skipped: bool,
    /// The scanned block range, or `None` when there was nothing new to scan.
    pub range: Option<(u64, u64)>,
    pub intents_discovered: usize,
    pub receipts_recorded: usize,
    pub topups_recorded: usize,
    pub withdrawals_recorded: usize,
    pub revocations_recorded: usize,
    pub merchant_updates: usize,
}

impl CycleOutcome {
    pub fn skipped() -> Self {
        Self { skipped: true, ..Default::default() }
    }

    pub fn no_new_blocks() -> Self {
        Self::default()
    }
}

impl Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.skipped {
            return write!(f, "cycle skipped: another cycle is still running");
        }
        match self.range {
            None => write!(f, "no new blocks to scan"),
            Some((from, to)) => write!(
                f,
                "scanned blocks {from}..={to}: {} new intents, {} receipts, {} top-ups, {} withdrawals, {} \
                 revocations, {} merchant updates",
                self.intents_discovered,
                self.receipts_recorded,
                self.topups_recorded,
                self.withdrawals_recorded,
                self.revocations_recorded,
                self.merchant_updates
            ),
        }
    }
}

/// The singleton indexing worker. Clones share one Idle/Processing guard, so no matter how many handles exist,
/// only one cycle can be in flight.
#[derive(Clone)]
pub struct EventIndexer<DB, R, C> {
    db: DB,
    reader: R,
    contracts: C,
    settings: IndexerSettings,
    producers: EventProducers,
    busy: Arc<AtomicBool>,
}

impl<DB, R, C> EventIndexer<DB, R, C>
where
    DB: LedgerDatabase + LedgerQueries,
    R: ChainReader,
    C: ContractReader,
{
    pub fn new(db: DB, reader: R, contracts: C, settings: IndexerSettings, producers: EventProducers) -> Self {
        Self { db, reader, contracts, settings, producers, busy: Arc::new(AtomicBool::new(false)) }
    }

    /// Runs one polling cycle, unless a cycle is already in flight, in which case the request is dropped (never
    /// queued) and a `skipped` outcome is returned.
    ///
    /// This is also the hook for callers that just submitted a transaction and want the resulting events mirrored
    /// without waiting for the next timer tick.
    pub async fn poll_once(&self) -> Result<CycleOutcome, IndexerError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            debug!("🔎️ A cycle is already processing. This tick is skipped, not queued.");
            return Ok(CycleOutcome::skipped());
        }
        let result = self.run_cycle().await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    /// The cycle body. Any chain or ledger error aborts the whole cycle *before* the cursor moves, so the next
    /// tick re-requests the same range; every write on this path is idempotent, which makes the re-run safe.
    async fn run_cycle(&self) -> Result<CycleOutcome, IndexerError> {
        let cursor = self.db.fetch_cursor().await?;
        let tip = self.reader.latest_block_number().await?;
        let next = cursor.map(|c| c + 1).unwrap_or(0);
        let from = next.max(tip.saturating_sub(self.settings.catchup_window));
        if from > tip {
            trace!("🔎️ Cursor {cursor:?} is already at the tip {tip}");
            return Ok(CycleOutcome::no_new_blocks());
        }
        if from > next {
            warn!(
                "🔎️ The catch-up window ({} blocks) truncated the scan range. Blocks {next}..={} will never be \
                 scanned and any events in them are lost to the mirror.",
                self.settings.catchup_window,
                from - 1
            );
        }
        let mut outcome = CycleOutcome { range: Some((from, tip)), ..Default::default() };
        let mut block_times = HashMap::new();

        // Step 1: new intents announced by the factory in this range.
        let created = self.reader.get_event_logs(&self.settings.factory, EventKind::IntentCreated, from, tip).await?;
        for event in &created {
            if let EventPayload::IntentCreated(ev) = &event.payload {
                if self.mirror_new_intent(ev.intent.clone(), ev.payer.clone(), ev.agent.clone(), event).await? {
                    outcome.intents_discovered += 1;
                }
            }
        }

        // Step 2: per-intent event streams, for *every* intent the ledger knows about. An intent created in an
        // earlier cycle may still be emitting events now, so scanning only this range's newcomers would drop them.
        let known = self.db.intent_addresses().await?;
        for address in &known {
            for kind in EventKind::INTENT_STREAMS {
                let events = self.reader.get_event_logs(address, kind, from, tip).await?;
                for event in &events {
                    self.apply_intent_event(address, event, &mut block_times, &mut outcome).await?;
                }
            }
        }

        // Step 3: only now, with every write for the range committed, does the cursor advance.
        self.db.advance_cursor(tip).await?;
        info!("🔎️ {outcome}");
        Ok(outcome)
    }

    /// Mirrors a newly announced intent: its immutable parameters and current merchant list come from the contract,
    /// not the event, which only carries the participant addresses. Returns false if the intent was already known
    /// (creation parameters never change, so there is nothing to update).
    async fn mirror_new_intent(
        &self,
        intent: ChainAddress,
        payer: ChainAddress,
        agent: ChainAddress,
        event: &ChainEvent,
    ) -> Result<bool, IndexerError> {
        let limits = self.contracts.limits(&intent).await?;
        let token = self.contracts.token_address(&intent).await?;
        let metadata_uri = self.contracts.metadata_uri(&intent).await?;
        let new_intent = NewIntent {
            address: intent.clone(),
            payer,
            agent,
            token,
            total_cap: limits.total_cap,
            per_tx_cap: limits.per_tx_cap,
            spent: limits.spent,
            start_time: limits.start,
            end_time: limits.end,
            metadata_uri,
            created_tx: event.tx_hash.clone(),
            created_block: event.block_number as i64,
        };
        let inserted = self.db.upsert_intent(new_intent).await?.was_inserted();
        if inserted {
            for merchant in self.contracts.allowed_merchants(&intent).await? {
                self.db.set_merchant_allowed(&intent, &merchant, true).await?;
            }
            debug!("🔎️ New intent {intent} mirrored from block {}", event.block_number);
        }
        Ok(inserted)
    }

    async fn apply_intent_event(
        &self,
        address: &ChainAddress,
        event: &ChainEvent,
        block_times: &mut HashMap<u64, DateTime<Utc>>,
        outcome: &mut CycleOutcome,
    ) -> Result<(), IndexerError> {
        match &event.payload {
            EventPayload::Executed(ev) => {
                self.apply_execution(address, ev, event, block_times, outcome).await?;
            },
            EventPayload::Revoked(ev) => {
                self.apply_revocation(address, ev, event, block_times, outcome).await?;
            },
            EventPayload::ToppedUp(ev) => {
                let topup = TopUp {
                    txid: event.tx_hash.clone(),
                    intent_address: address.clone(),
                    amount: ev.amount,
                    block_number: event.block_number as i64,
                    timestamp: self.block_time(event.block_number, block_times).await?,
                };
                if self.db.record_topup(topup).await?.was_inserted() {
                    outcome.topups_recorded += 1;
                }
            },
            EventPayload::Withdrawn(ev) => {
                let withdrawal = Withdrawal {
                    txid: event.tx_hash.clone(),
                    intent_address: address.clone(),
                    recipient: ev.to.clone(),
                    amount: ev.amount,
                    block_number: event.block_number as i64,
                    timestamp: self.block_time(event.block_number, block_times).await?,
                };
                if self.db.record_withdrawal(withdrawal).await?.was_inserted() {
                    outcome.withdrawals_recorded += 1;
                }
            },
            EventPayload::MerchantUpdated(ev) => {
                self.db.set_merchant_allowed(address, &ev.merchant, ev.allowed).await?;
                outcome.merchant_updates += 1;
            },
            EventPayload::IntentCreated(_) => {
                // Only the factory emits these; an intent contract echoing one is unexpected but harmless.
                debug!("🔎️ Ignoring IntentCreated log emitted by intent contract {address}");
            },
        }
        Ok(())
    }

    async fn apply_execution(
        &self,
        address: &ChainAddress,
        ev: &ExecutedEvent,
        event: &ChainEvent,
        block_times: &mut HashMap<u64, DateTime<Utc>>,
        outcome: &mut CycleOutcome,
    ) -> Result<(), IndexerError> {
        let timestamp = self.block_time(event.block_number, block_times).await?;
        let tx_receipt = self.reader.get_transaction_receipt(&event.tx_hash).await?;
        let receipt = NewReceipt {
            txid: event.tx_hash.clone(),
            intent_address: address.clone(),
            merchant: ev.merchant.clone(),
            amount: ev.amount,
            token: ev.token.clone(),
            receipt_hash: ev.receipt_hash.clone(),
            receipt_uri: ev.receipt_uri.clone(),
            timestamp,
            block_number: event.block_number as i64,
            gas_used: tx_receipt.gas_used,
        };
        let inserted = self.db.record_receipt(receipt).await?.was_inserted();

        // The authoritative spend counter comes from the contract, never from summing receipts locally: local
        // summation cannot tell "this mirror saw every event" from "this mirror has gaps".
        let limits = self.contracts.limits(address).await?;
        self.db.update_spent(address, limits.spent).await?;

        if inserted {
            outcome.receipts_recorded += 1;
            if let Some(receipt) = self.db.receipt_by_txid(&event.tx_hash).await? {
                for producer in &self.producers.receipt_recorded_producer {
                    producer.publish_event(ReceiptRecordedEvent::new(receipt.clone())).await;
                }
            }
        }
        Ok(())
    }

    async fn apply_revocation(
        &self,
        address: &ChainAddress,
        ev: &RevokedEvent,
        event: &ChainEvent,
        block_times: &mut HashMap<u64, DateTime<Utc>>,
        outcome: &mut CycleOutcome,
    ) -> Result<(), IndexerError> {
        let revocation = Revocation {
            txid: event.tx_hash.clone(),
            intent_address: address.clone(),
            revoked_by: ev.by.clone(),
            reason: if ev.reason.is_empty() { None } else { Some(ev.reason.clone()) },
            block_number: event.block_number as i64,
            timestamp: self.block_time(event.block_number, block_times).await?,
        };
        let reason = revocation.reason.clone();
        if self.db.record_revocation(revocation).await?.was_inserted() {
            outcome.revocations_recorded += 1;
            info!("🔎️ Intent {address} was revoked by {}", ev.by);
            for producer in &self.producers.intent_revoked_producer {
                let event = IntentRevokedEvent {
                    intent: address.clone(),
                    revoked_by: ev.by.clone(),
                    reason: reason.clone(),
                };
                producer.publish_event(event).await;
            }
        }
        Ok(())
    }

    async fn block_time(
        &self,
        number: u64,
        cache: &mut HashMap<u64, DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, ChainError> {
        if let Some(t) = cache.get(&number) {
            return Ok(*t);
        }
        let info = self.reader.get_block(number).await?;
        cache.insert(number, info.timestamp);
        Ok(info.timestamp)
    }
}
