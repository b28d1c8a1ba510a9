//! Availability calculator.
//!
//! The stored `available_copies` column is a cache; these functions are the
//! single source of the formula that fills it. The read path, every mutating
//! transaction and the auditor all go through `compute_available`, so a
//! clean system can never disagree with itself.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::{
    config::CirculationConfig,
    error::AppResult,
    models::document::{Availability, AvailabilityStatus, Document},
    repository::Repository,
};

/// Copies free for a new requester: total minus every active claim,
/// clamped at zero.
pub fn compute_available(total_copies: i16, active_loans: i64, active_reservations: i64) -> i16 {
    (i64::from(total_copies) - active_loans - active_reservations).max(0) as i16
}

pub fn status_for(
    available_copies: i16,
    active_loans: i64,
    active_reservations: i64,
) -> AvailabilityStatus {
    if available_copies > 0 {
        AvailabilityStatus::Available
    } else if active_loans > 0 {
        AvailabilityStatus::Borrowed
    } else if active_reservations > 0 {
        AvailabilityStatus::Reserved
    } else {
        AvailabilityStatus::Unavailable
    }
}

/// Days until a copy should free up for a requester joining the queue now.
///
/// Base estimate is `queue_length * average_loan_duration`. When the
/// earliest outstanding due date is known it replaces the guess for the
/// head-of-queue slot: the head is served at that due date, and each queue
/// member holds the copy for the average duration after it.
pub fn estimated_wait_days(
    queue_length: i64,
    average_loan_duration_days: u32,
    earliest_due: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    let avg = i64::from(average_loan_duration_days);
    match earliest_due {
        Some(due) => (due - now).num_days().max(0) + queue_length * avg,
        None => queue_length * avg,
    }
}

/// Recompute the stored counter from live facts on the caller's transaction.
/// Runs as the last write of every mutating transaction, so the cache and
/// the source facts commit together.
pub(crate) async fn refresh_stored(
    repository: &Repository,
    conn: &mut PgConnection,
    document: &Document,
) -> AppResult<i16> {
    let active_loans = repository
        .loans
        .active_count_for_document(&mut *conn, document.id)
        .await?;
    let active_reservations = repository
        .reservations
        .active_count_for_document(&mut *conn, document.id)
        .await?;
    let available = compute_available(document.total_copies, active_loans, active_reservations);
    repository
        .documents
        .set_available(&mut *conn, document.id, available)
        .await?;
    Ok(available)
}

#[derive(Clone)]
pub struct AvailabilityService {
    repository: Repository,
    circulation: CirculationConfig,
}

impl AvailabilityService {
    pub fn new(repository: Repository, circulation: CirculationConfig) -> Self {
        Self { repository, circulation }
    }

    /// Compute live availability for a document. Pure read: no writes, and
    /// two calls over unchanged rows give the same answer.
    pub async fn for_document(&self, document_id: i32) -> AppResult<Availability> {
        let document = self.repository.documents.get(document_id).await?;
        self.snapshot(&document).await
    }

    pub async fn snapshot(&self, document: &Document) -> AppResult<Availability> {
        let pool = &self.repository.pool;
        let active_loans = self
            .repository
            .loans
            .active_count_for_document(pool, document.id)
            .await?;
        let active_reservations = self
            .repository
            .reservations
            .active_count_for_document(pool, document.id)
            .await?;

        let available_copies =
            compute_available(document.total_copies, active_loans, active_reservations);
        let status = status_for(available_copies, active_loans, active_reservations);

        let estimated_wait_days = if status == AvailabilityStatus::Available {
            None
        } else {
            let earliest_due = self
                .repository
                .loans
                .earliest_due_date(pool, document.id)
                .await?;
            Some(estimated_wait_days(
                active_reservations,
                self.circulation.average_loan_duration_days,
                earliest_due,
                Utc::now(),
            ))
        };

        Ok(Availability {
            document_id: document.id,
            kind: document.kind,
            total_copies: document.total_copies,
            available_copies,
            status,
            queue_length: active_reservations,
            estimated_wait_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn available_copies_subtract_all_active_claims() {
        assert_eq!(compute_available(3, 1, 1), 1);
        assert_eq!(compute_available(1, 1, 0), 0);
        assert_eq!(compute_available(1, 0, 0), 1);
    }

    #[test]
    fn available_copies_clamp_at_zero() {
        // One copy, one loan, two waiting: never negative
        assert_eq!(compute_available(1, 1, 2), 0);
    }

    #[test]
    fn status_prefers_available_then_borrowed_then_reserved() {
        assert_eq!(status_for(2, 1, 0), AvailabilityStatus::Available);
        assert_eq!(status_for(0, 1, 2), AvailabilityStatus::Borrowed);
        assert_eq!(status_for(0, 0, 2), AvailabilityStatus::Reserved);
        assert_eq!(status_for(0, 0, 0), AvailabilityStatus::Unavailable);
    }

    #[test]
    fn wait_estimate_uses_average_when_no_due_date_known() {
        assert_eq!(estimated_wait_days(3, 21, None, Utc::now()), 63);
    }

    #[test]
    fn wait_estimate_is_refined_by_earliest_due_date() {
        let now = Utc::now();
        let due = now + Duration::days(4);
        assert_eq!(estimated_wait_days(2, 21, Some(due), now), 4 + 42);
    }

    #[test]
    fn overdue_loans_do_not_produce_negative_waits() {
        let now = Utc::now();
        let due = now - Duration::days(10);
        assert_eq!(estimated_wait_days(1, 21, Some(due), now), 21);
    }
}
