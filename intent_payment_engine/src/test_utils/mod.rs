//! In-memory fakes for the engine's collaborators, plus database test scaffolding.
//!
//! The fakes are deliberately small state machines rather than call-recording mocks: the chain behaves like a
//! chain (events live in blocks, receipts exist for transactions) and the contract behaves like the escrow
//! (it enforces caps and balances and reverts with realistic reasons), so tests exercise the engine against the
//! semantics it will actually meet.
mod blob;
mod memory_chain;
mod mock_contract;
pub mod prepare_env;

pub use blob::MemoryBlobStore;
pub use memory_chain::MemoryChainReader;
pub use mock_contract::{ContractIntentConfig, MemoryContracts};
