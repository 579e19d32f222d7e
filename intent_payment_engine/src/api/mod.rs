mod errors;
mod intent_objects;
mod query_api;

pub use errors::QueryApiError;
pub use intent_objects::{IntentQueryFilter, ReceiptPage};
pub use query_api::IntentQueryApi;
