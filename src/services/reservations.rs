//! Reservation queue manager: admission control, priority assignment,
//! cancellation and expiry.
//!
//! Every queue mutation runs inside a transaction that first locks the
//! document's counter row, so concurrent reservations, cancellations and
//! fulfillments for the same document are serialized; renumbering always
//! commits together with the status change that opened the gap.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult, ErrorCode},
    models::{
        borrower::Borrower,
        document::Document,
        reservation::{QueueEntry, Reservation},
    },
    repository::{self, reservations::ACTIVE_RESERVATION_UNIQUE, Repository},
    services::{availability, notifications::{run_notify, Notifier}},
};

/// Admission decision for a reservation request. Checks run in a fixed
/// order and the first failure wins, so callers get a stable reason code.
pub fn check_admission(
    borrower: &Borrower,
    active_reservations_held: i64,
    has_duplicate_reservation: bool,
    has_outstanding_loan: bool,
    available_copies: i16,
) -> AppResult<()> {
    if !borrower.is_active() {
        return Err(AppError::Admission(
            ErrorCode::BorrowerBlocked,
            format!("Borrower {} is blocked from circulation", borrower.id),
        ));
    }
    if active_reservations_held >= i64::from(borrower.max_reservations) {
        return Err(AppError::Admission(
            ErrorCode::MaxReservationsReached,
            format!(
                "Maximum reservations reached ({}/{})",
                active_reservations_held, borrower.max_reservations
            ),
        ));
    }
    if has_duplicate_reservation {
        return Err(AppError::Admission(
            ErrorCode::DuplicateReservation,
            "Borrower already has an active reservation for this document".to_string(),
        ));
    }
    if has_outstanding_loan {
        return Err(AppError::Admission(
            ErrorCode::AlreadyBorrowed,
            "Borrower already holds this document on loan".to_string(),
        ));
    }
    if available_copies > 0 {
        return Err(AppError::Admission(
            ErrorCode::DocumentAvailable,
            "Copies are available; borrow the document directly instead of reserving".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    circulation: CirculationConfig,
    notifier: Arc<dyn Notifier>,
}

impl ReservationsService {
    pub fn new(
        repository: Repository,
        circulation: CirculationConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { repository, circulation, notifier }
    }

    /// Join the document's waitlist
    pub async fn reserve(
        &self,
        borrower_id: i32,
        document_id: i32,
        expiry_override: Option<DateTime<Utc>>,
    ) -> AppResult<Reservation> {
        let (reservation, borrower, document) = repository::with_retry(
            self.circulation.max_tx_retries,
            || self.try_reserve(borrower_id, document_id, expiry_override),
        )
        .await?;

        let notifier = self.notifier.clone();
        let confirmed = reservation.clone();
        tokio::spawn(async move {
            run_notify(
                "reservation_confirmed",
                notifier.reservation_confirmed(&borrower, &document, &confirmed),
            )
            .await;
        });

        Ok(reservation)
    }

    async fn try_reserve(
        &self,
        borrower_id: i32,
        document_id: i32,
        expiry_override: Option<DateTime<Utc>>,
    ) -> AppResult<(Reservation, Borrower, Document)> {
        let repo = &self.repository;
        let mut tx = repo.pool.begin().await?;

        let document = repo.documents.lock(&mut *tx, document_id).await?;
        let borrower = repo.borrowers.get_in(&mut *tx, borrower_id).await?;

        let held = repo
            .reservations
            .active_count_for_borrower(&mut *tx, borrower_id)
            .await?;
        let duplicate = repo
            .reservations
            .has_active_for(&mut *tx, borrower_id, document_id)
            .await?;
        let borrowed = repo
            .loans
            .has_outstanding(&mut *tx, borrower_id, document_id)
            .await?;
        let active_loans = repo
            .loans
            .active_count_for_document(&mut *tx, document_id)
            .await?;
        let queue_length = repo
            .reservations
            .active_count_for_document(&mut *tx, document_id)
            .await?;
        let available =
            availability::compute_available(document.total_copies, active_loans, queue_length);

        check_admission(&borrower, held, duplicate, borrowed, available)?;

        let now = Utc::now();
        let expiry_date = expiry_override.unwrap_or_else(|| {
            now + Duration::days(i64::from(self.circulation.reservation_expiry_days))
        });
        let priority = repo.reservations.max_priority(&mut *tx, document_id).await? + 1;

        let reservation = match repo
            .reservations
            .insert(&mut *tx, document_id, borrower_id, now, expiry_date, priority)
            .await
        {
            Ok(r) => r,
            // Two handlers racing past the duplicate check; the index makes
            // the loser a plain admission rejection
            Err(AppError::Database(e))
                if repository::is_unique_violation(&e, ACTIVE_RESERVATION_UNIQUE) =>
            {
                return Err(AppError::Admission(
                    ErrorCode::DuplicateReservation,
                    "Borrower already has an active reservation for this document".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        availability::refresh_stored(repo, &mut tx, &document).await?;
        tx.commit().await?;

        tracing::info!(
            borrower = borrower_id,
            document = document_id,
            priority = reservation.priority_order,
            "reservation queued"
        );

        Ok((reservation, borrower, document))
    }

    /// Cancel an active reservation and close the gap it leaves
    pub async fn cancel(&self, reservation_id: i32) -> AppResult<Reservation> {
        repository::with_retry(self.circulation.max_tx_retries, || {
            self.try_remove(reservation_id, Removal::Cancel)
        })
        .await
    }

    /// Expire one lapsed reservation. Shared with the auditor so both use
    /// the same serialization boundary for the status flip and renumbering.
    pub(crate) async fn expire_one(
        &self,
        reservation_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        repository::with_retry(self.circulation.max_tx_retries, || {
            self.try_remove(reservation_id, Removal::Expire(now))
        })
        .await
    }

    /// Expire every active reservation whose grace window has lapsed.
    /// Used by the background sweep and the manual endpoint.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let lapsed = self.repository.reservations.lapsed_active_ids(now).await?;
        let mut expired = 0;

        for id in lapsed {
            match self.expire_one(id, now).await {
                Ok(_) => expired += 1,
                // Raced with a cancel/fulfill; nothing left to expire
                Err(AppError::Admission(ErrorCode::ReservationNotActive, _)) => {}
                Err(err) => {
                    tracing::warn!(reservation = id, "expiry sweep failed for entry: {}", err);
                }
            }
        }

        if expired > 0 {
            tracing::info!(count = expired, "expired lapsed reservations");
        }
        Ok(expired)
    }

    /// Shared removal path: flip status, renumber the remainder, refresh
    /// the counter, all in one transaction behind the document lock.
    async fn try_remove(&self, reservation_id: i32, removal: Removal) -> AppResult<Reservation> {
        let repo = &self.repository;
        let mut tx = repo.pool.begin().await?;

        let pre = repo.reservations.get_in(&mut *tx, reservation_id).await?;
        let document = repo.documents.lock(&mut *tx, pre.document_id).await?;
        // Re-read after taking the document lock; the row may have moved
        let reservation = repo.reservations.get_locked(&mut *tx, reservation_id).await?;

        if !reservation.is_active() {
            return Err(AppError::Admission(
                ErrorCode::ReservationNotActive,
                format!(
                    "Reservation {} is {:?}, not active",
                    reservation_id, reservation.status
                ),
            ));
        }
        if let Removal::Expire(now) = removal {
            if !reservation.is_lapsed(now) {
                // Expiry date moved since the candidate scan
                return Err(AppError::Admission(
                    ErrorCode::ReservationNotActive,
                    format!("Reservation {} is no longer lapsed", reservation_id),
                ));
            }
        }

        let status = removal.target_status();
        repo.reservations
            .set_status(&mut *tx, reservation_id, status)
            .await?;
        repo.reservations
            .renumber_after_removal(&mut *tx, document.id, reservation.priority_order)
            .await?;
        availability::refresh_stored(repo, &mut tx, &document).await?;
        tx.commit().await?;

        tracing::info!(
            reservation = reservation_id,
            document = document.id,
            status = ?status,
            "reservation removed from queue"
        );

        Ok(Reservation { status, ..reservation })
    }

    /// The active queue for a document, in serving order
    pub async fn queue(&self, document_id: i32) -> AppResult<Vec<QueueEntry>> {
        // Surface a 404 for unknown documents rather than an empty queue
        self.repository.documents.get(document_id).await?;
        self.repository.reservations.queue_for_document(document_id, None).await
    }

    /// Active reservations held by a borrower
    pub async fn list_for_borrower(&self, borrower_id: i32) -> AppResult<Vec<Reservation>> {
        self.repository.borrowers.get(borrower_id).await?;
        self.repository.reservations.list_for_borrower(borrower_id).await
    }

    pub async fn get(&self, reservation_id: i32) -> AppResult<Reservation> {
        self.repository.reservations.get(reservation_id).await
    }
}

/// Why an entry is leaving the queue
#[derive(Clone, Copy)]
enum Removal {
    Cancel,
    Expire(DateTime<Utc>),
}

impl Removal {
    fn target_status(&self) -> crate::models::reservation::ReservationStatus {
        match self {
            Removal::Cancel => crate::models::reservation::ReservationStatus::Cancelled,
            Removal::Expire(_) => crate::models::reservation::ReservationStatus::Expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::borrower::BorrowerStatus;

    fn borrower(status: BorrowerStatus, max_reservations: i16) -> Borrower {
        Borrower {
            id: 1,
            name: "Test".to_string(),
            email: None,
            max_loans: 5,
            max_reservations,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn code_of(result: AppResult<()>) -> ErrorCode {
        match result {
            Err(AppError::Admission(code, _)) => code,
            other => panic!("expected admission error, got {:?}", other.err()),
        }
    }

    #[test]
    fn blocked_borrower_is_rejected_first() {
        // Blocked wins even when every later check would also fail
        let result = check_admission(&borrower(BorrowerStatus::Blocked, 0), 5, true, true, 3);
        assert_eq!(code_of(result), ErrorCode::BorrowerBlocked);
    }

    #[test]
    fn quota_is_checked_before_duplicates() {
        let result = check_admission(&borrower(BorrowerStatus::Active, 2), 2, true, true, 0);
        assert_eq!(code_of(result), ErrorCode::MaxReservationsReached);
    }

    #[test]
    fn duplicate_reservation_is_rejected() {
        let result = check_admission(&borrower(BorrowerStatus::Active, 5), 1, true, false, 0);
        assert_eq!(code_of(result), ErrorCode::DuplicateReservation);
    }

    #[test]
    fn reserving_an_already_borrowed_document_is_rejected() {
        let result = check_admission(&borrower(BorrowerStatus::Active, 5), 0, false, true, 0);
        assert_eq!(code_of(result), ErrorCode::AlreadyBorrowed);
    }

    #[test]
    fn available_documents_point_the_borrower_at_direct_borrowing() {
        let result = check_admission(&borrower(BorrowerStatus::Active, 5), 0, false, false, 2);
        assert_eq!(code_of(result), ErrorCode::DocumentAvailable);
    }

    #[test]
    fn reserving_an_exhausted_document_is_admitted() {
        assert!(check_admission(&borrower(BorrowerStatus::Active, 5), 0, false, false, 0).is_ok());
    }
}
