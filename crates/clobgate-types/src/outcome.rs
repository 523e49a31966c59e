//! Outcomes reported to callers.
//!
//! Every operation a caller asked for ends in exactly one
//! [`EntityOutcome`]; a [`BatchResponse`] lists them in request order so a
//! call with ten operations can report seven accepted, two rejected and
//! one ambiguous at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BatchId, BatchState, ExchangeOrderId, OperationKind, TxSignature};

/// Final outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum EntityOutcome {
    /// The chain confirmed the operation.
    Accepted {
        signature: TxSignature,
        exchange_id: Option<ExchangeOrderId>,
    },
    /// Definitively not applied (locally or by the chain).
    Rejected { reason: String },
    /// Sent, but whether it landed is unknown.
    Ambiguous { signature: Option<TxSignature> },
    /// Nothing needed doing (settlement with zero free balance).
    Skipped { reason: String },
}

impl EntityOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// Result of running one batch through the submission engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub batch_id: BatchId,
    /// CONFIRMED, FAILED or AMBIGUOUS.
    pub state: BatchState,
    /// Signature of the last attempt that was signed.
    pub signature: Option<TxSignature>,
    pub attempts: u32,
    pub slot: Option<u64>,
    /// One outcome per batch entry, same order.
    pub outcomes: Vec<EntityOutcome>,
    /// Human-readable failure description, for FAILED/AMBIGUOUS.
    pub error: Option<String>,
}

impl SubmissionResult {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.state == BatchState::Confirmed
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.state == BatchState::Ambiguous
    }
}

/// The outcome of one requested entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    #[serde(skip)]
    pub position: usize,
    pub kind: OperationKind,
    /// Client id, or market name for settlements.
    pub entity: String,
    pub market: String,
    #[serde(flatten)]
    pub outcome: EntityOutcome,
}

/// Overall status of a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// Every entity accepted or skipped (including "nothing to do").
    Success,
    /// Mixed outcomes, or at least one ambiguous entity.
    Partial,
    /// Every entity rejected.
    Failure,
}

/// Response of a mutating call: status plus per-entity reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub status: ResponseStatus,
    pub reports: Vec<OperationReport>,
    pub timestamp: DateTime<Utc>,
}

impl BatchResponse {
    /// Sort reports into request order and derive the overall status.
    #[must_use]
    pub fn from_reports(mut reports: Vec<OperationReport>) -> Self {
        reports.sort_by_key(|r| r.position);
        let rejected = reports.iter().filter(|r| r.outcome.is_rejected()).count();
        let ambiguous = reports.iter().filter(|r| r.outcome.is_ambiguous()).count();
        let status = if rejected == 0 && ambiguous == 0 {
            ResponseStatus::Success
        } else if rejected == reports.len() {
            ResponseStatus::Failure
        } else {
            ResponseStatus::Partial
        };
        Self {
            status,
            reports,
            timestamp: Utc::now(),
        }
    }

    /// An empty, successful response.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_reports(Vec::new())
    }

    #[must_use]
    pub fn accepted(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_accepted()).count()
    }

    #[must_use]
    pub fn rejected(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_rejected()).count()
    }

    #[must_use]
    pub fn ambiguous(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_ambiguous()).count()
    }

    /// The report for `entity`, if any.
    #[must_use]
    pub fn report(&self, entity: &str) -> Option<&OperationReport> {
        self.reports.iter().find(|r| r.entity == entity)
    }
}
