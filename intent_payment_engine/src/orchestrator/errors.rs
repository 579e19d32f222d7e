use std::{fmt::Display, sync::OnceLock};

use ipg_common::TokenAmount;
use regex::Regex;
use thiserror::Error;

use crate::traits::ChainError;

/// Which contract-side limit a rejected payment ran into. None of these are retryable: retrying without changing
/// the request would reproduce the same on-chain rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    PerTransactionCap,
    TotalCap,
    TimeWindow,
    MerchantNotAllowed,
    IntentNotActive,
}

impl Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::PerTransactionCap => write!(f, "Per-transaction cap exceeded"),
            LimitKind::TotalCap => write!(f, "Remaining total cap exceeded"),
            LimitKind::TimeWindow => write!(f, "Outside the intent's validity window"),
            LimitKind::MerchantNotAllowed => write!(f, "Merchant is not on the allowlist"),
            LimitKind::IntentNotActive => write!(f, "Intent is not active"),
        }
    }
}

/// The failure taxonomy a payment run can surface. Every terminal failure carries the triggering on-chain reason
/// uninterpreted alongside the classified kind, so operators can diagnose rejections the mirror cannot explain.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// Transport-level failure (timeout, outage). The run fails; nothing was necessarily submitted.
    #[error("Chain interaction failed: {0}")]
    Transient(ChainError),
    #[error("Not authorized: {reason}")]
    Authorization { reason: String },
    #[error("{kind}: {reason}")]
    LimitExceeded { kind: LimitKind, reason: String },
    /// The escrow's token balance cannot cover the payment. The one failure class that triggers auto-funding.
    #[error("The intent escrow cannot cover the payment: {reason}")]
    InsufficientAllowance { reason: String },
    /// The agent's own balance cannot cover the funding transfer. Terminal; no retry is possible.
    #[error("The agent holds {available} but the payment needs {needed}; auto-funding is impossible")]
    InsufficientAgentFunds { needed: TokenAmount, available: TokenAmount },
    /// A revert that fits no known class (out of gas, assertion failures, ...). Carried verbatim.
    #[error("Payment execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

impl PaymentError {
    /// Folds a chain-level failure into the taxonomy: reverts are classified by their reason string, everything
    /// else is transport trouble.
    pub fn from_chain(e: ChainError) -> Self {
        match e {
            ChainError::Reverted { reason } => classify_revert(&reason),
            other => PaymentError::Transient(other),
        }
    }

    /// True only for the failure class that the auto-funding path can actually fix.
    pub fn is_fundable(&self) -> bool {
        matches!(self, PaymentError::InsufficientAllowance { .. })
    }
}

struct RevertPatterns {
    insufficient_balance: Regex,
    authorization: Regex,
    per_tx_cap: Regex,
    total_cap: Regex,
    not_active: Regex,
    time_window: Regex,
    merchant: Regex,
}

fn patterns() -> &'static RevertPatterns {
    static PATTERNS: OnceLock<RevertPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| RevertPatterns {
        insufficient_balance: Regex::new(r"(?i)insufficient\s+(escrow\s+|intent\s+|token\s+)?balance|transfer amount exceeds balance").unwrap(),
        authorization: Regex::new(r"(?i)unauthori[sz]ed|not authori[sz]ed|caller is not|only (the )?(agent|payer)").unwrap(),
        per_tx_cap: Regex::new(r"(?i)per.?(tx|transaction)|exceeds.*single payment").unwrap(),
        total_cap: Regex::new(r"(?i)total.?cap|lifetime.?cap|exceeds remaining|cap exceeded").unwrap(),
        not_active: Regex::new(r"(?i)not active|inactive|revoked|paused").unwrap(),
        time_window: Regex::new(r"(?i)expired|not.?started|too early|too late|outside.*window").unwrap(),
        merchant: Regex::new(r"(?i)merchant").unwrap(),
    })
}

/// Maps an on-chain revert reason onto the taxonomy. The match is deliberately tolerant of wording differences
/// between contract versions; the raw string always rides along untouched.
pub fn classify_revert(reason: &str) -> PaymentError {
    let p = patterns();
    let reason_owned = reason.to_string();
    if p.insufficient_balance.is_match(reason) {
        PaymentError::InsufficientAllowance { reason: reason_owned }
    } else if p.authorization.is_match(reason) {
        PaymentError::Authorization { reason: reason_owned }
    } else if p.per_tx_cap.is_match(reason) {
        PaymentError::LimitExceeded { kind: LimitKind::PerTransactionCap, reason: reason_owned }
    } else if p.total_cap.is_match(reason) {
        PaymentError::LimitExceeded { kind: LimitKind::TotalCap, reason: reason_owned }
    } else if p.not_active.is_match(reason) {
        PaymentError::LimitExceeded { kind: LimitKind::IntentNotActive, reason: reason_owned }
    } else if p.time_window.is_match(reason) {
        PaymentError::LimitExceeded { kind: LimitKind::TimeWindow, reason: reason_owned }
    } else if p.merchant.is_match(reason) {
        PaymentError::LimitExceeded { kind: LimitKind::MerchantNotAllowed, reason: reason_owned }
    } else {
        PaymentError::ExecutionFailed { reason: reason_owned }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insufficient_balance_reverts_are_fundable() {
        let err = classify_revert("PaymentIntent: insufficient balance");
        assert!(err.is_fundable());
        let err = classify_revert("ERC20: transfer amount exceeds balance");
        assert!(err.is_fundable());
    }

    #[test]
    fn hard_limits_are_never_fundable() {
        for reason in [
            "PaymentIntent: amount exceeds per-transaction cap",
            "PaymentIntent: total cap exceeded",
            "PaymentIntent: caller is not the agent",
            "PaymentIntent: merchant not allowed",
            "PaymentIntent: intent expired",
            "PaymentIntent: not active",
        ] {
            let err = classify_revert(reason);
            assert!(!err.is_fundable(), "{reason} must not trigger auto-funding, got {err:?}");
        }
    }

    #[test]
    fn revert_reason_survives_verbatim() {
        let reason = "PaymentIntent: merchant not allowed (0xdeadbeef)";
        match classify_revert(reason) {
            PaymentError::LimitExceeded { kind: LimitKind::MerchantNotAllowed, reason: r } => {
                assert_eq!(r, reason);
            },
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn unknown_reverts_fall_through_uninterpreted() {
        match classify_revert("out of gas") {
            PaymentError::ExecutionFailed { reason } => assert_eq!(reason, "out of gas"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn transport_errors_stay_transient() {
        let err = PaymentError::from_chain(ChainError::Unavailable("connection refused".into()));
        assert!(matches!(err, PaymentError::Transient(_)));
        let err = PaymentError::from_chain(ChainError::Reverted { reason: "insufficient balance".into() });
        assert!(err.is_fundable());
    }
}
