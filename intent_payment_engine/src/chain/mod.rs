//! Concrete JSON-RPC adapters for the chain-facing traits.
//!
//! [`RpcChainReader`] implements the read-only node surface (blocks, receipts, decoded event logs) and
//! [`RpcContractReader`] the escrow/factory read calls, both over an HTTP provider. There is deliberately no RPC
//! implementation of [`PaymentContract`](crate::traits::PaymentContract) here: submitting transactions needs a
//! signing wallet, which is outside this engine's trust boundary.
mod contract;
mod events;
mod reader;

pub use contract::RpcContractReader;
pub use events::{IIntentFactory, IPaymentIntent, IERC20};
pub use reader::RpcChainReader;
