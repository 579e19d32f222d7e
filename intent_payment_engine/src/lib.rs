//! Intent Payment Engine
//!
//! The engine maintains a queryable mirror of on-chain payment intents (capped, time-boxed spending allowances
//! granted to AI agents) and drives payments against them. It is provider-agnostic: the blockchain is reached
//! through the trait seams in [`mod@traits`], with HTTP JSON-RPC implementations in [`mod@chain`].
//!
//! The library is divided into four main sections:
//! 1. Ledger storage ([`SqliteDatabase`] behind the [`traits::LedgerDatabase`]/[`traits::LedgerQueries`] traits).
//!    SQLite is the default backend. You should never need to access the database directly; the indexer owns the
//!    write path and the query API serves reads.
//! 2. The event indexer ([`mod@indexer`]): a singleton polling worker that folds contract events into the ledger,
//!    idempotently and replay-safely, advancing its cursor only after a fully-committed cycle.
//! 3. The state projector ([`mod@projector`]): pure fold from stored rows to an intent's queryable summary,
//!    re-runnable offline for audit.
//! 4. The funded-payment orchestrator ([`mod@orchestrator`]): executes a payment, classifies failures, and runs
//!    the bounded auto-fund-and-retry protocol with a full audit trail.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]): recorded receipts,
//! revocations and payment-run phase transitions are published through a simple async hook system, so a UI or
//! notification layer can follow along without the engine knowing it exists.
mod api;

pub mod chain;
pub mod db_types;
pub mod events;
pub mod indexer;
pub mod orchestrator;
pub mod projector;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{IntentQueryApi, IntentQueryFilter, QueryApiError, ReceiptPage};
#[cfg(feature = "sqlite")]
pub use sqlite::{db_url, SqliteDatabase};
