//! Document (circulating item) model and availability types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Kind of circulating item. Books have a multi-copy pool; academic works
/// are treated as a single implicit unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum DocumentKind {
    Book = 0,
    Academic = 1,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Book => "book",
            DocumentKind::Academic => "academic",
        }
    }
}

impl From<i16> for DocumentKind {
    fn from(v: i16) -> Self {
        match v {
            1 => DocumentKind::Academic,
            _ => DocumentKind::Book,
        }
    }
}

/// Inventory counter row. `available_copies` is a derived cache: every
/// mutating transaction rewrites it from live loan/reservation counts, and
/// the auditor can rebuild it at any time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Document {
    pub id: i32,
    pub kind: DocumentKind,
    pub title: String,
    pub total_copies: i16,
    pub available_copies: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Circulation status of a document at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Available,
    Borrowed,
    Reserved,
    Unavailable,
}

/// Computed availability for a document, derived from live loan and
/// reservation rows rather than the stored counter.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Availability {
    pub document_id: i32,
    pub kind: DocumentKind,
    pub total_copies: i16,
    pub available_copies: i16,
    pub status: AvailabilityStatus,
    pub queue_length: i64,
    /// Estimated days until a copy frees up for a new requester.
    /// `None` when copies are available now.
    pub estimated_wait_days: Option<i64>,
}

/// Register an inventory counter row. Bibliographic metadata lives outside
/// the circulation engine; only the copy pool is tracked here.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDocument {
    pub kind: DocumentKind,
    #[validate(length(min = 1, message = "Title must not be empty"))]
    pub title: String,
    /// Defaults to a single copy (always the case for academic works)
    #[validate(range(min = 1, max = 1000, message = "Copy count must be between 1 and 1000"))]
    pub total_copies: Option<i16>,
}

/// Resize the copy pool of an existing document
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCopies {
    #[validate(range(min = 1, max = 1000, message = "Copy count must be between 1 and 1000"))]
    pub total_copies: i16,
}
