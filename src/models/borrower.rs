//! Borrower model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Borrower account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum BorrowerStatus {
    Active = 0,
    Blocked = 1,
}

impl From<i16> for BorrowerStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => BorrowerStatus::Blocked,
            _ => BorrowerStatus::Active,
        }
    }
}

/// Borrower row. Quota changes take effect on the next admission check.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrower {
    pub id: i32,
    pub name: String,
    /// Notification address; borrowers without one are silently skipped
    /// by the notification dispatcher.
    pub email: Option<String>,
    pub max_loans: i16,
    pub max_reservations: i16,
    pub status: BorrowerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Borrower {
    pub fn is_active(&self) -> bool {
        self.status == BorrowerStatus::Active
    }
}

/// Create borrower request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBorrower {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(range(min = 0, max = 100, message = "Loan quota must be between 0 and 100"))]
    pub max_loans: Option<i16>,
    #[validate(range(min = 0, max = 100, message = "Reservation quota must be between 0 and 100"))]
    pub max_reservations: Option<i16>,
}

/// Update borrower request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBorrower {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(range(min = 0, max = 100, message = "Loan quota must be between 0 and 100"))]
    pub max_loans: Option<i16>,
    #[validate(range(min = 0, max = 100, message = "Reservation quota must be between 0 and 100"))]
    pub max_reservations: Option<i16>,
    pub status: Option<BorrowerStatus>,
}
