use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use ipg_common::ChainAddress;

use crate::traits::{BlockInfo, ChainError, ChainEvent, ChainReader, EventKind, EventPayload, TxReceiptInfo};

#[derive(Default)]
struct ChainState {
    tip: u64,
    events: Vec<ChainEvent>,
    receipts: HashMap<String, TxReceiptInfo>,
    block_times: HashMap<u64, DateTime<Utc>>,
    unavailable: bool,
}

/// A scripted chain: tests append events at block heights, move the tip, and can take the "endpoint" down to
/// exercise the indexer's retry path.
#[derive(Clone, Default)]
pub struct MemoryChainReader {
    state: Arc<Mutex<ChainState>>,
}

impl MemoryChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tip(&self, tip: u64) {
        self.state.lock().unwrap().tip = tip;
    }

    /// Simulates an RPC outage. While set, every reader call fails with `ChainError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Appends an event at the given block. Executed events get a successful transaction receipt registered
    /// automatically, since the indexer will ask for one.
    pub fn push_event(&self, emitter: &ChainAddress, block_number: u64, tx_hash: &str, payload: EventPayload) {
        let mut state = self.state.lock().unwrap();
        let log_index = state.events.iter().filter(|e| e.block_number == block_number).count() as u64;
        if matches!(payload, EventPayload::Executed(_)) {
            state.receipts.insert(
                tx_hash.to_string(),
                TxReceiptInfo { success: true, gas_used: 21_000, block_number },
            );
        }
        state.events.push(ChainEvent {
            emitter: emitter.clone(),
            block_number,
            tx_hash: tx_hash.to_string(),
            log_index,
            payload,
        });
        if state.tip < block_number {
            state.tip = block_number;
        }
    }

    pub fn set_block_time(&self, block_number: u64, timestamp: DateTime<Utc>) {
        self.state.lock().unwrap().block_times.insert(block_number, timestamp);
    }

    fn check_available(state: &ChainState) -> Result<(), ChainError> {
        if state.unavailable {
            Err(ChainError::Unavailable("scripted outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ChainReader for MemoryChainReader {
    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state.tip)
    }

    async fn get_block(&self, height: u64) -> Result<BlockInfo, ChainError> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        if height > state.tip {
            return Err(ChainError::NotFound(format!("block {height} is beyond the tip {}", state.tip)));
        }
        let timestamp = state
            .block_times
            .get(&height)
            .copied()
            .unwrap_or_else(|| Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(12 * height as i64));
        let transaction_hashes = state
            .events
            .iter()
            .filter(|e| e.block_number == height)
            .map(|e| e.tx_hash.clone())
            .collect();
        Ok(BlockInfo { number: height, timestamp, transaction_hashes })
    }

    async fn get_event_logs(
        &self,
        contract: &ChainAddress,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>, ChainError> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        let mut events: Vec<ChainEvent> = state
            .events
            .iter()
            .filter(|e| {
                e.emitter == *contract
                    && e.payload.kind() == kind
                    && e.block_number >= from_block
                    && e.block_number <= to_block
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<TxReceiptInfo, ChainError> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        state
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("no receipt for transaction {tx_hash}")))
    }
}
