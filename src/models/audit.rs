//! Consistency audit report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Invariant classes the auditor checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    NegativeAvailableCopies,
    AvailableExceedsTotal,
    StaleAvailableCopies,
    OrphanedLoan,
    OrphanedReservation,
    ExpiredReservation,
    PrioritySequenceBroken,
}

/// Operator-facing severity. Invariant violations are errors; values that
/// are merely out of date are warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One detected inconsistency, with before/after values so operators can
/// audit the audit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub document_id: Option<i32>,
    /// Loan or reservation row the issue refers to, when row-scoped
    pub record_id: Option<i32>,
    /// Value found in the store
    pub stored: Option<String>,
    /// Value recomputed from source facts
    pub computed: Option<String>,
    pub detail: String,
    /// Whether this run corrected the issue (always false without auto_fix)
    pub fixed: bool,
}

/// Result of one auditor run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub auto_fix: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents_checked: i64,
    pub issues: Vec<AuditIssue>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
