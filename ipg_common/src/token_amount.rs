use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------    TokenAmount      ---------------------------------------------------------
/// A quantity of the escrow token, in its smallest unit.
///
/// Stored as a signed 64-bit integer so that it maps directly onto the ledger database. On-chain values are unsigned
/// 256-bit integers; conversions from the chain are fallible and must go through [`TokenAmount::try_from`].
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TokenAmount(i64);

op!(binary TokenAmount, Add, add);
op!(binary TokenAmount, Sub, sub);
op!(inplace TokenAmount, SubAssign, sub_assign);
op!(unary TokenAmount, Neg, neg);

impl Mul<i64> for TokenAmount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a token amount: {0}")]
pub struct TokenAmountConversionError(String);

impl From<i64> for TokenAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for TokenAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for TokenAmount {}

impl TryFrom<u64> for TokenAmount {
    type Error = TokenAmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(TokenAmountConversionError(format!("Value {value} is too large to convert to TokenAmount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TokenAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtraction clamped at zero. Useful for "remaining budget" arithmetic where the mirror may briefly lag the
    /// chain.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = TokenAmount::from(100);
        let b = TokenAmount::from(30);
        assert_eq!(a + b, TokenAmount::from(130));
        assert_eq!(a - b, TokenAmount::from(70));
        assert_eq!(-b, TokenAmount::from(-30));
        assert_eq!(a * 3, TokenAmount::from(300));
        let total: TokenAmount = [a, b].into_iter().sum();
        assert_eq!(total, TokenAmount::from(130));
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = TokenAmount::from(10);
        let b = TokenAmount::from(25);
        assert_eq!(a.saturating_sub(b), TokenAmount::from(0));
        assert_eq!(b.saturating_sub(a), TokenAmount::from(15));
    }

    #[test]
    fn u64_conversion_guards_overflow() {
        assert!(TokenAmount::try_from(u64::MAX).is_err());
        assert_eq!(TokenAmount::try_from(42u64).unwrap(), TokenAmount::from(42));
    }
}
