use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sqlx::Type;

//--------------------------------------    ChainAddress     ---------------------------------------------------------
/// A lightweight wrapper around a hex-encoded contract or account address.
///
/// Addresses are normalized to lowercase on construction so that they can be used as database keys and compared
/// without worrying about checksum casing.
#[derive(Clone, Debug, Type, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ChainAddress(String);

impl ChainAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChainAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for ChainAddress {
    fn from(value: S) -> Self {
        Self(value.into().trim().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn addresses_are_normalized() {
        let a = ChainAddress::from("0xAbCd00000000000000000000000000000000EF12");
        let b = ChainAddress::from(" 0xabcd00000000000000000000000000000000ef12 ");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcd00000000000000000000000000000000ef12");
    }
}
