//! The funded-payment orchestrator: execute a payment against an intent, and if (and only if) the escrow balance
//! cannot cover it, fund the escrow from the agent's own balance and retry exactly once.
//!
//! This is a pure client-side protocol. It talks to the escrow contract directly, never to the ledger; observing
//! the resulting events is the indexer's job (callers typically trigger
//! [`EventIndexer::poll_once`](crate::indexer::EventIndexer::poll_once) after a run). The orchestrator knows
//! nothing about rendering: a UI follows a run by subscribing to its phase-transition events.
//!
//! The three chain operations of a run (execute, balance check, fund) are strictly sequential; each blocks on
//! confirmation before the next, because the funding decision depends on the execute failure and the retry depends
//! on the funding. Runs against the *same* intent are not mutually excluded here: the contract's cap checks are the
//! only authoritative guard against overspend, which is exactly why the mirror is never consulted for
//! authorization.
mod audit;
mod errors;

use std::fmt::Display;

use chrono::{DateTime, Utc};
use ipg_common::{ChainAddress, TokenAmount};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub use audit::{AuditAction, AuditEntry, AuditOutcome, AuditTrail};
pub use errors::{classify_revert, LimitKind, PaymentError};

use crate::{
    events::{EventProducers, PaymentRunEvent},
    traits::{ContractIntentState, ContractReader, IntentLimits, PaymentContract},
};

/// Extra units transferred on top of the requested amount during auto-funding, to reduce the chance of needing to
/// re-fund immediately.
pub const FUNDING_BUFFER: i64 = 10;

/// A payment to execute. The receipt hash commits to one action transcript; a retried attempt reuses the request
/// unchanged so the audit trail stays coupled to a single decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub intent: ChainAddress,
    pub merchant: ChainAddress,
    pub amount: TokenAmount,
    pub receipt_hash: String,
    pub receipt_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Analyzing,
    Checking,
    Executing,
    AutoFunding,
    Retrying,
    Success,
    Failed,
}

impl Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Analyzing => write!(f, "Analyzing"),
            RunPhase::Checking => write!(f, "Checking"),
            RunPhase::Executing => write!(f, "Executing"),
            RunPhase::AutoFunding => write!(f, "AutoFunding"),
            RunPhase::Retrying => write!(f, "Retrying"),
            RunPhase::Success => write!(f, "Success"),
            RunPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// A successfully executed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedPayment {
    /// The transaction that carried the payment.
    pub txid: String,
    /// The funding transfer, when the auto-funding path ran.
    pub funding_txid: Option<String>,
    /// Total execute attempts (1, or 2 when the payment was retried after funding).
    pub attempts: u32,
}

/// Everything a caller (or an auditor) needs to know about one run: the outcome and the complete step trail,
/// retained whether the run succeeded or not.
#[derive(Debug, Clone)]
pub struct PaymentRunReport {
    pub run_id: String,
    pub request: PaymentRequest,
    pub result: Result<ExecutedPayment, PaymentError>,
    pub audit: AuditTrail,
}

pub struct FundedPaymentOrchestrator<C> {
    contract: C,
    /// The agent identity this orchestrator acts for; its token balance is the auto-funding source.
    agent: ChainAddress,
    funding_buffer: TokenAmount,
    producers: EventProducers,
}

impl<C> FundedPaymentOrchestrator<C>
where C: ContractReader + PaymentContract
{
    pub fn new(contract: C, agent: ChainAddress, producers: EventProducers) -> Self {
        Self { contract, agent, funding_buffer: TokenAmount::from(FUNDING_BUFFER), producers }
    }

    pub fn with_funding_buffer(mut self, buffer: TokenAmount) -> Self {
        self.funding_buffer = buffer;
        self
    }

    /// Runs the full protocol for one payment. Never panics and never loses the trail: both arms of the result
    /// come back with every audited step.
    pub async fn run(&self, request: PaymentRequest) -> PaymentRunReport {
        let run_id = format!("run-{:016x}", rand::random::<u64>());
        let mut audit = AuditTrail::default();
        debug!("🤝️ [{run_id}] Payment of {} to {} against intent {}", request.amount, request.merchant, request.intent);
        let result = self.run_inner(&run_id, &request, &mut audit).await;
        match &result {
            Ok(payment) => {
                info!(
                    "🤝️ [{run_id}] Payment executed in tx {} after {} attempt(s)",
                    payment.txid, payment.attempts
                );
                self.publish_phase(&run_id, &request, RunPhase::Success, &format!("tx {}", payment.txid)).await;
            },
            Err(e) => {
                warn!("🤝️ [{run_id}] Payment failed: {e}");
                self.publish_phase(&run_id, &request, RunPhase::Failed, &e.to_string()).await;
            },
        }
        PaymentRunReport { run_id, request, result, audit }
    }

    async fn run_inner(
        &self,
        run_id: &str,
        request: &PaymentRequest,
        audit: &mut AuditTrail,
    ) -> Result<ExecutedPayment, PaymentError> {
        // Analyzing: read the intent's limits and state, and reject obvious hard failures before anything is
        // submitted. These classes are never retried; the same request would meet the same rejection.
        self.publish_phase(run_id, request, RunPhase::Analyzing, "reading intent limits and state").await;
        let started = Utc::now();
        let analysis = self.analyze(request).await;
        let params = json!({ "intent": request.intent, "amount": request.amount });
        match &analysis {
            Ok(limits) => audit.record(AuditEntry::success(
                AuditAction::AnalyzeIntent,
                params,
                format!("spent {} of {}, per-tx cap {}", limits.spent, limits.total_cap, limits.per_tx_cap),
                started,
            )),
            Err(e) => audit.record(AuditEntry::failure(AuditAction::AnalyzeIntent, params, e.to_string(), started)),
        }
        analysis?;

        // Checking: merchant allowlist and current escrow balance. The balance read is informational (the execute
        // attempt is the authority); the merchant check is a hard failure.
        self.publish_phase(run_id, request, RunPhase::Checking, "checking merchant and escrow balance").await;
        self.check_merchant(request, audit).await?;
        self.check_escrow_balance(request, audit).await;

        // Executing: the attempt itself.
        self.publish_phase(run_id, request, RunPhase::Executing, "submitting payment").await;
        let first_failure = match self.execute_once(request, audit).await {
            Ok(txid) => return Ok(ExecutedPayment { txid, funding_txid: None, attempts: 1 }),
            Err(e) => e,
        };
        if !first_failure.is_fundable() {
            return Err(first_failure);
        }
        debug!("🤝️ [{run_id}] Escrow cannot cover the payment; entering auto-funding");

        // AutoFunding: top the escrow up from the agent's own balance, bounded by what the agent actually holds.
        self.publish_phase(run_id, request, RunPhase::AutoFunding, "funding escrow from agent balance").await;
        let funding_txid = self.auto_fund(request, audit).await?;

        // Retrying: exactly one re-execution, with the request unchanged. A second failure is terminal; there is
        // no recursive auto-funding.
        self.publish_phase(run_id, request, RunPhase::Retrying, "re-submitting payment after funding").await;
        let txid = self.execute_once(request, audit).await?;
        Ok(ExecutedPayment { txid, funding_txid: Some(funding_txid), attempts: 2 })
    }

    async fn analyze(&self, request: &PaymentRequest) -> Result<IntentLimits, PaymentError> {
        let limits = self.contract.limits(&request.intent).await.map_err(PaymentError::from_chain)?;
        let state = self.contract.state(&request.intent).await.map_err(PaymentError::from_chain)?;
        preflight(request, &limits, state, Utc::now())?;
        Ok(limits)
    }

    async fn check_merchant(&self, request: &PaymentRequest, audit: &mut AuditTrail) -> Result<(), PaymentError> {
        let started = Utc::now();
        let params = json!({ "intent": request.intent, "merchant": request.merchant });
        let allowed = self
            .contract
            .is_merchant_allowed(&request.intent, &request.merchant)
            .await
            .map_err(PaymentError::from_chain);
        match allowed {
            Ok(true) => {
                audit.record(AuditEntry::success(AuditAction::CheckMerchant, params, "allowed", started));
                Ok(())
            },
            Ok(false) => {
                let err = PaymentError::LimitExceeded {
                    kind: LimitKind::MerchantNotAllowed,
                    reason: format!("{} is not on the intent's allowlist", request.merchant),
                };
                audit.record(AuditEntry::failure(AuditAction::CheckMerchant, params, err.to_string(), started));
                Err(err)
            },
            Err(e) => {
                audit.record(AuditEntry::failure(AuditAction::CheckMerchant, params, e.to_string(), started));
                Err(e)
            },
        }
    }

    /// Best-effort balance read for the trail. Not a decision point: the contract is the authority, and a stale
    /// read here must not pre-empt it.
    async fn check_escrow_balance(&self, request: &PaymentRequest, audit: &mut AuditTrail) {
        let started = Utc::now();
        let params = json!({ "intent": request.intent });
        match self.contract.get_balance(&request.intent).await {
            Ok(balance) => audit.record(AuditEntry::success(
                AuditAction::CheckEscrowBalance,
                params,
                format!("escrow holds {balance}"),
                started,
            )),
            Err(e) => audit.record(AuditEntry::failure(AuditAction::CheckEscrowBalance, params, e.to_string(), started)),
        }
    }

    async fn execute_once(&self, request: &PaymentRequest, audit: &mut AuditTrail) -> Result<String, PaymentError> {
        let started = Utc::now();
        let params = json!({
            "intent": request.intent,
            "merchant": request.merchant,
            "amount": request.amount,
            "receipt_hash": request.receipt_hash,
            "receipt_uri": request.receipt_uri,
        });
        let result = self
            .contract
            .execute(&request.intent, &request.merchant, request.amount, &request.receipt_hash, &request.receipt_uri)
            .await
            .map_err(PaymentError::from_chain);
        match &result {
            Ok(txid) => {
                audit.record(AuditEntry::success(AuditAction::ExecutePayment, params, format!("tx {txid}"), started));
            },
            Err(e) => {
                audit.record(AuditEntry::failure(AuditAction::ExecutePayment, params, e.to_string(), started));
            },
        }
        result
    }

    async fn auto_fund(&self, request: &PaymentRequest, audit: &mut AuditTrail) -> Result<String, PaymentError> {
        let token = self.contract.token_address(&request.intent).await.map_err(PaymentError::from_chain)?;

        let started = Utc::now();
        let params = json!({ "token": token, "agent": self.agent });
        let agent_balance = match self.contract.token_balance(&token, &self.agent).await {
            Ok(balance) => {
                audit.record(AuditEntry::success(
                    AuditAction::CheckAgentBalance,
                    params,
                    format!("agent holds {balance}"),
                    started,
                ));
                balance
            },
            Err(e) => {
                audit.record(AuditEntry::failure(AuditAction::CheckAgentBalance, params, e.to_string(), started));
                return Err(PaymentError::from_chain(e));
            },
        };
        if agent_balance < request.amount {
            return Err(PaymentError::InsufficientAgentFunds { needed: request.amount, available: agent_balance });
        }

        // The buffer reduces the chance of an immediate re-fund; the agent's balance is the hard ceiling.
        let funding_amount = (request.amount + self.funding_buffer).min(agent_balance);
        let started = Utc::now();
        let params = json!({ "token": token, "intent": request.intent, "amount": funding_amount });
        match self.contract.transfer(&token, &request.intent, funding_amount).await {
            Ok(txid) => {
                info!("🤝️ Escrow {} funded with {funding_amount} in tx {txid}", request.intent);
                audit.record(AuditEntry::success(AuditAction::FundEscrow, params, format!("tx {txid}"), started));
                Ok(txid)
            },
            Err(e) => {
                let err = PaymentError::from_chain(e);
                audit.record(AuditEntry::failure(AuditAction::FundEscrow, params, err.to_string(), started));
                Err(err)
            },
        }
    }

    async fn publish_phase(&self, run_id: &str, request: &PaymentRequest, phase: RunPhase, detail: &str) {
        for producer in &self.producers.payment_run_producer {
            let event = PaymentRunEvent {
                run_id: run_id.to_string(),
                intent: request.intent.clone(),
                phase: phase.to_string(),
                detail: detail.to_string(),
                amount: request.amount,
                at: Utc::now(),
            };
            producer.publish_event(event).await;
        }
    }
}

/// Client-side pre-flight over a fresh contract read. Catching a hard failure here saves a doomed transaction, but
/// passing pre-flight proves nothing: the contract re-checks everything, and its answer is the only one that
/// counts.
fn preflight(
    request: &PaymentRequest,
    limits: &IntentLimits,
    state: ContractIntentState,
    now: DateTime<Utc>,
) -> Result<(), PaymentError> {
    if request.amount.value() <= 0 {
        return Err(PaymentError::ExecutionFailed { reason: "payment amount must be positive".to_string() });
    }
    match state {
        ContractIntentState::Revoked => {
            return Err(PaymentError::LimitExceeded {
                kind: LimitKind::IntentNotActive,
                reason: "the intent has been revoked".to_string(),
            })
        },
        ContractIntentState::Paused => {
            return Err(PaymentError::LimitExceeded {
                kind: LimitKind::IntentNotActive,
                reason: "the intent is paused".to_string(),
            })
        },
        ContractIntentState::Expired => {
            return Err(PaymentError::LimitExceeded {
                kind: LimitKind::TimeWindow,
                reason: "the intent has expired".to_string(),
            })
        },
        ContractIntentState::Active => {},
    }
    if now < limits.start {
        return Err(PaymentError::LimitExceeded {
            kind: LimitKind::TimeWindow,
            reason: format!("the intent only becomes valid at {}", limits.start),
        });
    }
    if now >= limits.end {
        return Err(PaymentError::LimitExceeded {
            kind: LimitKind::TimeWindow,
            reason: format!("the intent lapsed at {}", limits.end),
        });
    }
    if request.amount > limits.per_tx_cap {
        return Err(PaymentError::LimitExceeded {
            kind: LimitKind::PerTransactionCap,
            reason: format!("{} exceeds the per-transaction cap of {}", request.amount, limits.per_tx_cap),
        });
    }
    let remaining = limits.total_cap.saturating_sub(limits.spent);
    if request.amount > remaining {
        return Err(PaymentError::LimitExceeded {
            kind: LimitKind::TotalCap,
            reason: format!("{} exceeds the remaining total cap of {remaining}", request.amount),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    fn limits() -> IntentLimits {
        let now = Utc::now();
        IntentLimits {
            total_cap: TokenAmount::from(1000),
            per_tx_cap: TokenAmount::from(100),
            spent: TokenAmount::from(950),
            start: now - Duration::hours(1),
            end: now + Duration::hours(1),
        }
    }

    fn request(amount: i64) -> PaymentRequest {
        PaymentRequest {
            intent: "0x1111111111111111111111111111111111111111".into(),
            merchant: "0x2222222222222222222222222222222222222222".into(),
            amount: TokenAmount::from(amount),
            receipt_hash: "0xfeed".to_string(),
            receipt_uri: "ipfs://transcript".to_string(),
        }
    }

    #[test]
    fn remaining_total_cap_beats_per_tx_cap() {
        // 80 is under the per-tx cap of 100, but only 50 of the total cap remains.
        let err = preflight(&request(80), &limits(), ContractIntentState::Active, Utc::now()).unwrap_err();
        match err {
            PaymentError::LimitExceeded { kind, .. } => assert_eq!(kind, LimitKind::TotalCap),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn per_tx_cap_is_enforced() {
        let mut l = limits();
        l.spent = TokenAmount::from(0);
        let err = preflight(&request(150), &l, ContractIntentState::Active, Utc::now()).unwrap_err();
        match err {
            PaymentError::LimitExceeded { kind, .. } => assert_eq!(kind, LimitKind::PerTransactionCap),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn window_edges_are_exclusive_of_end() {
        let l = limits();
        assert!(preflight(&request(50), &l, ContractIntentState::Active, l.start).is_ok());
        let err = preflight(&request(50), &l, ContractIntentState::Active, l.end).unwrap_err();
        assert!(matches!(err, PaymentError::LimitExceeded { kind: LimitKind::TimeWindow, .. }));
        let err = preflight(&request(50), &l, ContractIntentState::Active, l.start - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, PaymentError::LimitExceeded { kind: LimitKind::TimeWindow, .. }));
    }

    #[test]
    fn inactive_states_are_rejected() {
        let l = limits();
        for state in [ContractIntentState::Revoked, ContractIntentState::Paused] {
            let err = preflight(&request(50), &l, state, Utc::now()).unwrap_err();
            assert!(matches!(err, PaymentError::LimitExceeded { kind: LimitKind::IntentNotActive, .. }));
        }
    }
}
