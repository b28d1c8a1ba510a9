//! Reservation (waitlist entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum ReservationStatus {
    Active = 0,
    Fulfilled = 1,
    Expired = 2,
    Cancelled = 3,
}

impl From<i16> for ReservationStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => ReservationStatus::Fulfilled,
            2 => ReservationStatus::Expired,
            3 => ReservationStatus::Cancelled,
            _ => ReservationStatus::Active,
        }
    }
}

/// Reservation row. `priority_order` is a 1-based, gap-free rank among the
/// document's active reservations; 1 is served next.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub document_id: i32,
    pub borrower_id: i32,
    pub reservation_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: ReservationStatus,
    pub priority_order: i16,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expiry_date < now
    }
}

/// Waitlist entry with borrower context, for the queue view and for the
/// head-of-queue notification batch after a return.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct QueueEntry {
    pub reservation_id: i32,
    pub borrower_id: i32,
    pub borrower_name: String,
    #[serde(skip_serializing, default)]
    pub borrower_email: Option<String>,
    pub priority_order: i16,
    pub reservation_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}
