//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::document::DocumentKind;

/// Loan status. Never stored: derived from `return_date` and `due_date`
/// at read time so no background job has to sweep loans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

/// Loan row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub document_id: i32,
    pub borrower_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub extended_count: i16,
    pub notes: Option<String>,
}

impl Loan {
    pub fn status_at(&self, now: DateTime<Utc>) -> LoanStatus {
        if self.return_date.is_some() {
            LoanStatus::Returned
        } else if self.due_date < now {
            LoanStatus::Overdue
        } else {
            LoanStatus::Active
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Loan with document context for display. Status is derived when the row
/// is read.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub document_id: i32,
    pub document_kind: DocumentKind,
    pub document_title: String,
    pub borrower_id: i32,
    pub borrower_name: String,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub extended_count: i16,
    pub status: LoanStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn loan(due_offset_days: i64, returned: bool) -> Loan {
        let now = Utc::now();
        Loan {
            id: 1,
            document_id: 1,
            borrower_id: 1,
            loan_date: now - Duration::days(10),
            due_date: now + Duration::days(due_offset_days),
            return_date: returned.then_some(now),
            extended_count: 0,
            notes: None,
        }
    }

    #[test]
    fn status_is_active_before_due_date() {
        assert_eq!(loan(5, false).status_at(Utc::now()), LoanStatus::Active);
    }

    #[test]
    fn status_is_overdue_after_due_date() {
        assert_eq!(loan(-1, false).status_at(Utc::now()), LoanStatus::Overdue);
    }

    #[test]
    fn returned_loans_are_never_overdue() {
        assert_eq!(loan(-30, true).status_at(Utc::now()), LoanStatus::Returned);
    }
}
