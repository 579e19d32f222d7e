//! The abstract behaviour of the engine's collaborators.
//!
//! The ledger traits are implemented by storage backends (SQLite ships with the engine). The chain traits describe
//! the external blockchain surfaces the engine consumes: a read-only node adapter, the escrow contract's read
//! interface, and its write interface. Test fakes for all of them live in [`crate::test_utils`].
mod blob_store;
mod chain;
mod data_objects;
mod ledger;

pub use blob_store::{content_hash, BlobStore, BlobStoreError, PinnedBlob};
pub use chain::{
    BlockInfo,
    ChainError,
    ChainEvent,
    ChainReader,
    ContractIntentState,
    ContractReader,
    EventKind,
    EventPayload,
    ExecutedEvent,
    IntentCreatedEvent,
    IntentLimits,
    MerchantUpdatedEvent,
    PaymentContract,
    RevokedEvent,
    ToppedUpEvent,
    TxReceiptInfo,
    WithdrawnEvent,
};
pub use data_objects::{InsertResult, Paged, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use ledger::{LedgerDatabase, LedgerError, LedgerQueries};
