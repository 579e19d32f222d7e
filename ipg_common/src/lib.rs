mod address;
mod token_amount;

pub mod helpers;
pub mod op;

pub use address::ChainAddress;
pub use helpers::parse_boolean_flag;
pub use token_amount::{TokenAmount, TokenAmountConversionError};
