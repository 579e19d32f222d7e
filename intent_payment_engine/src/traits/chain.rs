use chrono::{DateTime, Utc};
use ipg_common::{ChainAddress, TokenAmount};
use thiserror::Error;

//--------------------------------------     ChainError      ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The node or RPC endpoint could not be reached. Retryable: the indexer's next tick repeats the same range.
    #[error("Chain endpoint unavailable: {0}")]
    Unavailable(String),
    /// A referenced block or transaction is not (or no longer) visible. Treated as transient.
    #[error("Not found on chain: {0}")]
    NotFound(String),
    /// An event log did not decode as the expected type. The offending log is skipped, never fatal to a cycle.
    #[error("Could not decode event log: {0}")]
    Decode(String),
    /// A submitted transaction reverted. The reason string is carried verbatim for classification and display.
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },
    /// Any other RPC-level failure.
    #[error("RPC error: {0}")]
    Rpc(String),
}

impl ChainError {
    /// True for failures that a later retry of the same request may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Unavailable(_) | ChainError::NotFound(_) | ChainError::Rpc(_))
    }
}

//--------------------------------------     Event types     ---------------------------------------------------------
/// The event streams the indexer knows how to fold into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    IntentCreated,
    Executed,
    Revoked,
    ToppedUp,
    Withdrawn,
    MerchantUpdated,
}

impl EventKind {
    /// The per-intent streams scanned on every cycle. `IntentCreated` is excluded: it is only emitted by the factory.
    pub const INTENT_STREAMS: [EventKind; 5] =
        [EventKind::Executed, EventKind::Revoked, EventKind::ToppedUp, EventKind::Withdrawn, EventKind::MerchantUpdated];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentCreatedEvent {
    pub payer: ChainAddress,
    pub intent: ChainAddress,
    pub agent: ChainAddress,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedEvent {
    pub agent: ChainAddress,
    pub merchant: ChainAddress,
    pub token: ChainAddress,
    pub amount: TokenAmount,
    pub receipt_hash: String,
    pub receipt_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEvent {
    pub by: ChainAddress,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToppedUpEvent {
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawnEvent {
    pub to: ChainAddress,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantUpdatedEvent {
    pub merchant: ChainAddress,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    IntentCreated(IntentCreatedEvent),
    Executed(ExecutedEvent),
    Revoked(RevokedEvent),
    ToppedUp(ToppedUpEvent),
    Withdrawn(WithdrawnEvent),
    MerchantUpdated(MerchantUpdatedEvent),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::IntentCreated(_) => EventKind::IntentCreated,
            EventPayload::Executed(_) => EventKind::Executed,
            EventPayload::Revoked(_) => EventKind::Revoked,
            EventPayload::ToppedUp(_) => EventKind::ToppedUp,
            EventPayload::Withdrawn(_) => EventKind::Withdrawn,
            EventPayload::MerchantUpdated(_) => EventKind::MerchantUpdated,
        }
    }
}

/// A decoded event log with its block coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    /// The contract that emitted the log.
    pub emitter: ChainAddress,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
    pub payload: EventPayload,
}

//--------------------------------------     ChainReader     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub transaction_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceiptInfo {
    pub success: bool,
    pub gas_used: i64,
    pub block_number: u64,
}

/// Read-only adapter over a JSON-RPC node. Purely observational; no side effects.
///
/// Implementations return [`ChainError::Unavailable`] for transport outages and [`ChainError::NotFound`] for blocks
/// or transactions that are pruned or not yet visible. Undecodable logs within a queried range are logged and
/// dropped by the implementation rather than surfaced, so one malformed event can never block a batch.
#[allow(async_fn_in_trait)]
pub trait ChainReader: Clone + Send + Sync {
    fn latest_block_number(&self) -> impl std::future::Future<Output = Result<u64, ChainError>> + Send;

    fn get_block(&self, height: u64) -> impl std::future::Future<Output = Result<BlockInfo, ChainError>> + Send;

    fn get_event_logs(
        &self,
        contract: &ChainAddress,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> impl std::future::Future<Output = Result<Vec<ChainEvent>, ChainError>> + Send;

    fn get_transaction_receipt(&self, tx_hash: &str)
        -> impl std::future::Future<Output = Result<TxReceiptInfo, ChainError>> + Send;
}

//--------------------------------------   ContractReader    ---------------------------------------------------------
/// The spending limits of an intent as reported by the contract. `spent` is the authoritative counter; the ledger
/// mirrors it from here and never recomputes it from receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentLimits {
    pub total_cap: TokenAmount,
    pub per_tx_cap: TokenAmount,
    pub spent: TokenAmount,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The lifecycle state as the contract reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractIntentState {
    Active,
    Paused,
    Revoked,
    Expired,
}

/// The escrow contract's read surface, plus the factory queries.
#[allow(async_fn_in_trait)]
pub trait ContractReader: Clone + Send + Sync {
    fn limits(&self, intent: &ChainAddress)
        -> impl std::future::Future<Output = Result<IntentLimits, ChainError>> + Send;

    fn state(&self, intent: &ChainAddress)
        -> impl std::future::Future<Output = Result<ContractIntentState, ChainError>> + Send;

    /// The intent escrow's current token balance (what is actually available to spend, as opposed to the cap).
    fn get_balance(&self, intent: &ChainAddress)
        -> impl std::future::Future<Output = Result<TokenAmount, ChainError>> + Send;

    fn is_merchant_allowed(&self, intent: &ChainAddress, merchant: &ChainAddress)
        -> impl std::future::Future<Output = Result<bool, ChainError>> + Send;

    /// The token the escrow holds. Immutable after creation.
    fn token_address(&self, intent: &ChainAddress)
        -> impl std::future::Future<Output = Result<ChainAddress, ChainError>> + Send;

    fn metadata_uri(&self, intent: &ChainAddress)
        -> impl std::future::Future<Output = Result<Option<String>, ChainError>> + Send;

    /// The current merchant allowlist. Empty means unrestricted.
    fn allowed_merchants(&self, intent: &ChainAddress)
        -> impl std::future::Future<Output = Result<Vec<ChainAddress>, ChainError>> + Send;

    /// ERC-20 balance of an arbitrary holder; used for the agent's own funds during auto-funding.
    fn token_balance(&self, token: &ChainAddress, holder: &ChainAddress)
        -> impl std::future::Future<Output = Result<TokenAmount, ChainError>> + Send;

    fn payer_intents(&self, payer: &ChainAddress)
        -> impl std::future::Future<Output = Result<Vec<ChainAddress>, ChainError>> + Send;

    fn agent_intents(&self, agent: &ChainAddress)
        -> impl std::future::Future<Output = Result<Vec<ChainAddress>, ChainError>> + Send;
}

//--------------------------------------   PaymentContract   ---------------------------------------------------------
/// The escrow contract's write surface, consumed by the funded-payment orchestrator.
///
/// Every method submits a transaction and blocks until it is confirmed, returning the transaction id. On-chain
/// reverts surface as [`ChainError::Reverted`] with the reason carried verbatim. Key management and signing are the
/// implementor's concern; the engine never sees secret material.
#[allow(async_fn_in_trait)]
pub trait PaymentContract: Clone + Send + Sync {
    fn execute(
        &self,
        intent: &ChainAddress,
        merchant: &ChainAddress,
        amount: TokenAmount,
        receipt_hash: &str,
        receipt_uri: &str,
    ) -> impl std::future::Future<Output = Result<String, ChainError>> + Send;

    fn top_up(&self, intent: &ChainAddress, amount: TokenAmount)
        -> impl std::future::Future<Output = Result<String, ChainError>> + Send;

    fn revoke(&self, intent: &ChainAddress, reason: &str)
        -> impl std::future::Future<Output = Result<String, ChainError>> + Send;

    fn transfer(&self, token: &ChainAddress, to: &ChainAddress, amount: TokenAmount)
        -> impl std::future::Future<Output = Result<String, ChainError>> + Send;

    fn approve(
        &self,
        token: &ChainAddress,
        spender: &ChainAddress,
        amount: TokenAmount,
    ) -> impl std::future::Future<Output = Result<String, ChainError>> + Send;
}
