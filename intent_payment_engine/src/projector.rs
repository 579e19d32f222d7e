//! Pure projection of stored ledger rows into an intent's queryable summary.
//!
//! Everything here is a function of its arguments: no clock reads, no database access, no chain access. That makes
//! the summary re-derivable from raw stored rows alone, which is the audit requirement — given one intent's
//! immutable parameters and its event rows, the view must be reproducible offline. The single exception is `spent`,
//! which is always taken from the latest authoritative snapshot the indexer recorded on the intent row, because
//! local summation cannot distinguish "this mirror saw every event" from "this mirror has gaps".

use chrono::{DateTime, Utc};
use ipg_common::{ChainAddress, TokenAmount};
use serde::{Deserialize, Serialize};

use crate::db_types::{Intent, IntentStatus, LifecycleStatus, MerchantEntry, Receipt, Revocation, TopUp, Withdrawal};

/// The one place expiry is judged. `Expired` is derived, never stored; every component that needs a lifecycle
/// answer calls through here so that two callers can never disagree about whether an intent has lapsed.
pub fn lifecycle_status(stored: IntentStatus, end_time: DateTime<Utc>, now: DateTime<Utc>) -> LifecycleStatus {
    match stored {
        IntentStatus::Revoked => LifecycleStatus::Revoked,
        _ if now >= end_time => LifecycleStatus::Expired,
        IntentStatus::Active => LifecycleStatus::Active,
        IntentStatus::Paused => LifecycleStatus::Paused,
    }
}

/// Details of the revocation, if the intent has been revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationInfo {
    pub txid: String,
    pub revoked_by: ChainAddress,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The folded, queryable view of one intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentView {
    pub address: ChainAddress,
    pub payer: ChainAddress,
    pub agent: ChainAddress,
    pub token: ChainAddress,
    pub total_cap: TokenAmount,
    pub per_tx_cap: TokenAmount,
    /// Mirrored from the contract's counter; never summed from receipts.
    pub spent: TokenAmount,
    pub remaining_cap: TokenAmount,
    pub status: LifecycleStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub metadata_uri: Option<String>,
    pub receipt_count: usize,
    pub total_topped_up: TokenAmount,
    pub total_withdrawn: TokenAmount,
    pub revocation: Option<RevocationInfo>,
    /// False when the intent has no allowlist entries at all, which the contract defines as "any merchant".
    pub merchant_restricted: bool,
    pub allowed_merchants: Vec<ChainAddress>,
}

/// Folds one intent's stored rows into its current summary.
///
/// Receipts, top-ups and withdrawals contribute activity totals; revocations force the terminal state regardless of
/// anything else; expiry is derived from `now`. The receipts' sum is *not* written into `spent` — see the module
/// docs.
pub fn project(
    intent: &Intent,
    receipts: &[Receipt],
    topups: &[TopUp],
    withdrawals: &[Withdrawal],
    revocations: &[Revocation],
    merchants: &[MerchantEntry],
    now: DateTime<Utc>,
) -> IntentView {
    let stored = if revocations.is_empty() { intent.status } else { IntentStatus::Revoked };
    let status = lifecycle_status(stored, intent.end_time, now);
    let revocation = revocations.first().map(|r| RevocationInfo {
        txid: r.txid.clone(),
        revoked_by: r.revoked_by.clone(),
        reason: r.reason.clone(),
        timestamp: r.timestamp,
    });
    let allowed_merchants =
        merchants.iter().filter(|m| m.allowed).map(|m| m.merchant.clone()).collect::<Vec<ChainAddress>>();
    IntentView {
        address: intent.address.clone(),
        payer: intent.payer.clone(),
        agent: intent.agent.clone(),
        token: intent.token.clone(),
        total_cap: intent.total_cap,
        per_tx_cap: intent.per_tx_cap,
        spent: intent.spent,
        remaining_cap: intent.total_cap.saturating_sub(intent.spent),
        status,
        start_time: intent.start_time,
        end_time: intent.end_time,
        metadata_uri: intent.metadata_uri.clone(),
        receipt_count: receipts.len(),
        total_topped_up: topups.iter().map(|t| t.amount).sum(),
        total_withdrawn: withdrawals.iter().map(|w| w.amount).sum(),
        revocation,
        merchant_restricted: !merchants.is_empty(),
        allowed_merchants,
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::*;

    fn sample_intent(status: IntentStatus) -> Intent {
        let now = Utc::now();
        Intent {
            address: "0x1111111111111111111111111111111111111111".into(),
            payer: "0x2222222222222222222222222222222222222222".into(),
            agent: "0x3333333333333333333333333333333333333333".into(),
            token: "0x4444444444444444444444444444444444444444".into(),
            total_cap: TokenAmount::from(1000),
            per_tx_cap: TokenAmount::from(100),
            spent: TokenAmount::from(950),
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(24),
            metadata_uri: None,
            status,
            created_tx: "0xc0ffee".to_string(),
            created_block: 100,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expiry_is_derived_not_stored() {
        let intent = sample_intent(IntentStatus::Active);
        let before_end = intent.end_time - Duration::seconds(1);
        let at_end = intent.end_time;
        assert_eq!(lifecycle_status(intent.status, intent.end_time, before_end), LifecycleStatus::Active);
        assert_eq!(lifecycle_status(intent.status, intent.end_time, at_end), LifecycleStatus::Expired);
        assert_eq!(
            lifecycle_status(IntentStatus::Paused, intent.end_time, at_end),
            LifecycleStatus::Expired,
            "paused intents lapse too"
        );
    }

    #[test]
    fn revoked_is_terminal_even_past_expiry() {
        let intent = sample_intent(IntentStatus::Revoked);
        let long_after = intent.end_time + Duration::days(30);
        assert_eq!(lifecycle_status(intent.status, intent.end_time, long_after), LifecycleStatus::Revoked);
    }

    #[test]
    fn revocation_row_overrides_stored_status() {
        let intent = sample_intent(IntentStatus::Active);
        let revocation = Revocation {
            txid: "0xdead".to_string(),
            intent_address: intent.address.clone(),
            revoked_by: intent.payer.clone(),
            reason: Some("budget withdrawn".to_string()),
            block_number: 120,
            timestamp: Utc::now(),
        };
        let view = project(&intent, &[], &[], &[], &[revocation], &[], Utc::now());
        assert_eq!(view.status, LifecycleStatus::Revoked);
        assert_eq!(view.revocation.unwrap().reason.as_deref(), Some("budget withdrawn"));
    }

    #[test]
    fn spent_comes_from_snapshot_and_respects_cap() {
        let intent = sample_intent(IntentStatus::Active);
        // A receipt the snapshot has not caught up with yet must not inflate `spent`.
        let receipt = Receipt {
            txid: "0xabc".to_string(),
            intent_address: intent.address.clone(),
            merchant: "0x5555555555555555555555555555555555555555".into(),
            amount: TokenAmount::from(50),
            token: intent.token.clone(),
            receipt_hash: "0x00".to_string(),
            receipt_uri: "ipfs://x".to_string(),
            timestamp: Utc::now(),
            block_number: 110,
            gas_used: 21000,
            created_at: Utc::now(),
        };
        let view = project(&intent, &[receipt], &[], &[], &[], &[], Utc::now());
        assert_eq!(view.spent, TokenAmount::from(950));
        assert_eq!(view.remaining_cap, TokenAmount::from(50));
        assert!(view.spent <= view.total_cap);
        assert_eq!(view.receipt_count, 1);
    }

    #[test]
    fn absent_merchant_entries_mean_unrestricted() {
        let intent = sample_intent(IntentStatus::Active);
        let view = project(&intent, &[], &[], &[], &[], &[], Utc::now());
        assert!(!view.merchant_restricted);
        assert!(view.allowed_merchants.is_empty());

        let entry = MerchantEntry {
            intent_address: intent.address.clone(),
            merchant: "0x6666666666666666666666666666666666666666".into(),
            allowed: true,
            updated_at: Utc::now(),
        };
        let restricted = project(&intent, &[], &[], &[], &[], &[entry], Utc::now());
        assert!(restricted.merchant_restricted);
        assert_eq!(restricted.allowed_merchants.len(), 1);
    }

    #[test]
    fn activity_totals_fold() {
        let intent = sample_intent(IntentStatus::Active);
        let topups = vec![
            TopUp {
                txid: "0x01".into(),
                intent_address: intent.address.clone(),
                amount: TokenAmount::from(200),
                block_number: 101,
                timestamp: Utc::now(),
            },
            TopUp {
                txid: "0x02".into(),
                intent_address: intent.address.clone(),
                amount: TokenAmount::from(130),
                block_number: 102,
                timestamp: Utc::now(),
            },
        ];
        let withdrawals = vec![Withdrawal {
            txid: "0x03".into(),
            intent_address: intent.address.clone(),
            recipient: intent.payer.clone(),
            amount: TokenAmount::from(40),
            block_number: 103,
            timestamp: Utc::now(),
        }];
        let view = project(&intent, &[], &topups, &withdrawals, &[], &[], Utc::now());
        assert_eq!(view.total_topped_up, TokenAmount::from(330));
        assert_eq!(view.total_withdrawn, TokenAmount::from(40));
    }
}
