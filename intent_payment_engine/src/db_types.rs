use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use ipg_common::{ChainAddress, TokenAmount};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------    IntentStatus     ---------------------------------------------------------
/// The stored lifecycle state of an intent, mirroring the escrow contract.
///
/// `Expired` is deliberately absent: expiry is a function of the clock and is derived at read time (see
/// [`crate::projector::lifecycle_status`]), never written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum IntentStatus {
    /// The intent is live and the agent may execute payments against it.
    Active,
    /// The payer has suspended the intent. It can be resumed.
    Paused,
    /// The intent has been revoked. Terminal.
    Revoked,
}

impl Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentStatus::Active => write!(f, "Active"),
            IntentStatus::Paused => write!(f, "Paused"),
            IntentStatus::Revoked => write!(f, "Revoked"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid intent status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for IntentStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Paused" => Ok(Self::Paused),
            "Revoked" => Ok(Self::Revoked),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for IntentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid intent status: {value}. But this conversion cannot fail. Defaulting to Active");
            IntentStatus::Active
        })
    }
}

//--------------------------------------   LifecycleStatus   ---------------------------------------------------------
/// The read-time view of an intent's lifecycle, including the derived `Expired` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStatus {
    Active,
    Paused,
    Revoked,
    Expired,
}

impl Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStatus::Active => write!(f, "Active"),
            LifecycleStatus::Paused => write!(f, "Paused"),
            LifecycleStatus::Revoked => write!(f, "Revoked"),
            LifecycleStatus::Expired => write!(f, "Expired"),
        }
    }
}

//--------------------------------------       Intent        ---------------------------------------------------------
/// The mirror row for one payment-intent escrow contract.
///
/// The address is globally unique and assigned once at creation. The `spent` field mirrors the contract's
/// authoritative counter and is only ever written from a fresh on-chain read, never from local summation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Intent {
    pub address: ChainAddress,
    pub payer: ChainAddress,
    pub agent: ChainAddress,
    pub token: ChainAddress,
    pub total_cap: TokenAmount,
    pub per_tx_cap: TokenAmount,
    pub spent: TokenAmount,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub metadata_uri: Option<String>,
    pub status: IntentStatus,
    pub created_tx: String,
    pub created_block: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Intent {
    pub fn remaining_cap(&self) -> TokenAmount {
        self.total_cap.saturating_sub(self.spent)
    }
}

//--------------------------------------      NewIntent      ---------------------------------------------------------
/// Creation parameters for an intent, assembled by the indexer from an `IntentCreated` event plus the contract's
/// immutable parameter reads.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub address: ChainAddress,
    pub payer: ChainAddress,
    pub agent: ChainAddress,
    pub token: ChainAddress,
    pub total_cap: TokenAmount,
    pub per_tx_cap: TokenAmount,
    pub spent: TokenAmount,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub metadata_uri: Option<String>,
    pub created_tx: String,
    pub created_block: i64,
}

//--------------------------------------      Receipt        ---------------------------------------------------------
/// An immutable record binding one executed payment to the content hash of the off-chain action that justified it.
///
/// A payment executes at most once per transaction, so the transaction id is the natural key and insertion is
/// idempotent.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Receipt {
    pub txid: String,
    pub intent_address: ChainAddress,
    pub merchant: ChainAddress,
    pub amount: TokenAmount,
    pub token: ChainAddress,
    pub receipt_hash: String,
    pub receipt_uri: String,
    pub timestamp: DateTime<Utc>,
    pub block_number: i64,
    pub gas_used: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub txid: String,
    pub intent_address: ChainAddress,
    pub merchant: ChainAddress,
    pub amount: TokenAmount,
    pub token: ChainAddress,
    pub receipt_hash: String,
    pub receipt_uri: String,
    pub timestamp: DateTime<Utc>,
    pub block_number: i64,
    pub gas_used: i64,
}

//--------------------------------------       TopUp         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TopUp {
    pub txid: String,
    pub intent_address: ChainAddress,
    pub amount: TokenAmount,
    pub block_number: i64,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------     Withdrawal      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub txid: String,
    pub intent_address: ChainAddress,
    pub recipient: ChainAddress,
    pub amount: TokenAmount,
    pub block_number: i64,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------     Revocation      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Revocation {
    pub txid: String,
    pub intent_address: ChainAddress,
    pub revoked_by: ChainAddress,
    pub reason: Option<String>,
    pub block_number: i64,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------    MerchantEntry    ---------------------------------------------------------
/// One allowlist entry for an intent. The absence of *any* entries for an intent means the intent is unrestricted
/// and any merchant is permitted. That convention belongs to the escrow contract; the mirror preserves it verbatim.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MerchantEntry {
    pub intent_address: ChainAddress,
    pub merchant: ChainAddress,
    pub allowed: bool,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    IndexerCursor    ---------------------------------------------------------
/// The singleton row recording the highest fully-processed block. The only mutable pointer in the store; it never
/// decreases across a successful commit.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct IndexerCursor {
    pub last_block: i64,
    pub updated_at: DateTime<Utc>,
}
