//! HTTP JSON-RPC implementation of the read-only chain surface.

use std::str::FromStr;

use alloy::{
    primitives::{Address, B256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{BlockNumberOrTag, BlockTransactionsKind, Filter},
    transports::http::{Client, Http},
};
use chrono::{TimeZone, Utc};
use ipg_common::ChainAddress;
use log::*;

use super::events::{decode_event, signature_hash};
use crate::traits::{BlockInfo, ChainError, ChainEvent, ChainReader, EventKind, TxReceiptInfo};

/// Read-only adapter over an HTTP JSON-RPC endpoint. Purely observational; holds no keys and submits nothing.
#[derive(Clone)]
pub struct RpcChainReader {
    provider: RootProvider<Http<Client>>,
}

impl RpcChainReader {
    pub fn new(rpc_url: &str) -> Result<Self, ChainError> {
        let url = rpc_url.parse().map_err(|e| ChainError::Rpc(format!("Invalid RPC URL {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);
        Ok(Self { provider })
    }

    fn parse_address(address: &ChainAddress) -> Result<Address, ChainError> {
        Address::from_str(address.as_str())
            .map_err(|e| ChainError::Rpc(format!("{address} is not a valid contract address: {e}")))
    }
}

impl ChainReader for RpcChainReader {
    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.map_err(|e| ChainError::Unavailable(e.to_string()))
    }

    async fn get_block(&self, height: u64) -> Result<BlockInfo, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height), BlockTransactionsKind::Hashes)
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?
            .ok_or_else(|| ChainError::NotFound(format!("block {height} is not visible on this endpoint")))?;
        let timestamp = Utc
            .timestamp_opt(block.header.timestamp as i64, 0)
            .single()
            .ok_or_else(|| ChainError::Decode(format!("block {height} carries an invalid timestamp")))?;
        let transaction_hashes = block.transactions.hashes().map(|h| format!("{h:#x}")).collect();
        Ok(BlockInfo { number: height, timestamp, transaction_hashes })
    }

    async fn get_event_logs(
        &self,
        contract: &ChainAddress,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>, ChainError> {
        let address = Self::parse_address(contract)?;
        let filter = Filter::new()
            .address(address)
            .event_signature(signature_hash(kind))
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.provider.get_logs(&filter).await.map_err(|e| ChainError::Unavailable(e.to_string()))?;
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_event(kind, log) {
                Ok(event) => events.push(event),
                // One malformed log must never block the rest of the range.
                Err(e) => warn!("⛓️ Skipping undecodable {kind:?} log from {contract}: {e}"),
            }
        }
        // get_logs returns block-ordered results, but ordering within a block is load-bearing for the fold.
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<TxReceiptInfo, ChainError> {
        let hash = B256::from_str(tx_hash)
            .map_err(|e| ChainError::Rpc(format!("{tx_hash} is not a valid transaction hash: {e}")))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?
            .ok_or_else(|| ChainError::NotFound(format!("no receipt for transaction {tx_hash} yet")))?;
        let block_number = receipt
            .block_number
            .ok_or_else(|| ChainError::NotFound(format!("transaction {tx_hash} is not yet included in a block")))?;
        Ok(TxReceiptInfo { success: receipt.status(), gas_used: receipt.gas_used as i64, block_number })
    }
}
