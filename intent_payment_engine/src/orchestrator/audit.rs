use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The on-chain (and pre-flight) actions a payment run performs. Execute attempts appear once per attempt, so a
/// bounded-retry claim can be verified by counting them in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    AnalyzeIntent,
    CheckMerchant,
    CheckEscrowBalance,
    ExecutePayment,
    CheckAgentBalance,
    FundEscrow,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::AnalyzeIntent => write!(f, "AnalyzeIntent"),
            AuditAction::CheckMerchant => write!(f, "CheckMerchant"),
            AuditAction::CheckEscrowBalance => write!(f, "CheckEscrowBalance"),
            AuditAction::ExecutePayment => write!(f, "ExecutePayment"),
            AuditAction::CheckAgentBalance => write!(f, "CheckAgentBalance"),
            AuditAction::FundEscrow => write!(f, "FundEscrow"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success(String),
    Failure(String),
}

impl AuditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuditOutcome::Success(_))
    }
}

/// One step of a payment run: what was attempted, with which parameters, how it ended, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub params: serde_json::Value,
    pub outcome: AuditOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn success(
        action: AuditAction,
        params: serde_json::Value,
        info: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self { action, params, outcome: AuditOutcome::Success(info.into()), started_at, completed_at: Utc::now() }
    }

    pub fn failure(
        action: AuditAction,
        params: serde_json::Value,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self { action, params, outcome: AuditOutcome::Failure(error.into()), started_at, completed_at: Utc::now() }
    }
}

/// The full step-by-step record of one payment run. Failed runs keep their trail too; a decision that went nowhere
/// is still a decision that was made.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    pub fn execute_attempts(&self) -> usize {
        self.count(AuditAction::ExecutePayment)
    }

    pub fn funding_attempts(&self) -> usize {
        self.count(AuditAction::FundEscrow)
    }
}
