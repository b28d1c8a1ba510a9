//! Fulfillment coordinator: the atomic conversion of a reservation (or a
//! direct request) into a loan.
//!
//! Validation happens inside the same transaction that writes, against rows
//! re-read under the document lock; a request that loses the race for the
//! last copy is rejected before anything is written.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult, ErrorCode},
    models::{
        borrower::Borrower,
        document::Document,
        loan::Loan,
        reservation::ReservationStatus,
    },
    repository::{self, Repository},
    services::{availability, notifications::{run_notify, Notifier}},
};

/// Borrower-side eligibility shared by both fulfillment paths. Quotas are
/// re-read at fulfillment time: they can have changed since the reservation
/// was queued.
fn check_borrower_eligibility(borrower: &Borrower, active_loans_held: i64) -> AppResult<()> {
    if !borrower.is_active() {
        return Err(AppError::Admission(
            ErrorCode::BorrowerBlocked,
            format!("Borrower {} is blocked from circulation", borrower.id),
        ));
    }
    if active_loans_held >= i64::from(borrower.max_loans) {
        return Err(AppError::Admission(
            ErrorCode::MaxLoansReached,
            format!(
                "Maximum loans reached ({}/{})",
                active_loans_held, borrower.max_loans
            ),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct FulfillmentService {
    repository: Repository,
    circulation: CirculationConfig,
    notifier: Arc<dyn Notifier>,
}

impl FulfillmentService {
    pub fn new(
        repository: Repository,
        circulation: CirculationConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { repository, circulation, notifier }
    }

    /// Promote a waiting reservation into a loan
    pub async fn fulfill(&self, reservation_id: i32) -> AppResult<Loan> {
        let (loan, borrower, document) = repository::with_retry(
            self.circulation.max_tx_retries,
            || self.try_fulfill(reservation_id),
        )
        .await?;

        self.notify_loan(borrower, document, loan.clone());
        Ok(loan)
    }

    async fn try_fulfill(&self, reservation_id: i32) -> AppResult<(Loan, Borrower, Document)> {
        let repo = &self.repository;
        let mut tx = repo.pool.begin().await?;

        let pre = repo.reservations.get_in(&mut *tx, reservation_id).await?;
        let document = repo.documents.lock(&mut *tx, pre.document_id).await?;
        // Re-read under the document lock; a concurrent cancel, expiry or
        // fulfillment may have consumed the entry in the meantime
        let reservation = repo.reservations.get_locked(&mut *tx, reservation_id).await?;
        if !reservation.is_active() {
            return Err(AppError::Admission(
                ErrorCode::ReservationNotActive,
                format!(
                    "Reservation {} is {:?} and cannot be fulfilled",
                    reservation_id, reservation.status
                ),
            ));
        }

        let borrower = repo.borrowers.get_in(&mut *tx, reservation.borrower_id).await?;
        let loans_held = repo
            .loans
            .active_count_for_borrower(&mut *tx, borrower.id)
            .await?;
        check_borrower_eligibility(&borrower, loans_held)?;

        // Availability net of this reservation: only loans and queue entries
        // AHEAD of it may block, otherwise the head of the queue could be
        // starved by its own tail
        let active_loans = repo
            .loans
            .active_count_for_document(&mut *tx, document.id)
            .await?;
        let ahead = repo
            .reservations
            .active_count_ahead(&mut *tx, document.id, reservation.priority_order)
            .await?;
        let free = i64::from(document.total_copies) - active_loans - ahead;
        if free <= 0 {
            return Err(AppError::Conflict(format!(
                "No copy of document {} is available for this reservation; re-check availability and retry",
                document.id
            )));
        }

        let now = Utc::now();
        let due_date = now + Duration::days(i64::from(self.circulation.loan_period_days));
        let loan = repo
            .loans
            .create(&mut *tx, document.id, borrower.id, now, due_date)
            .await?;
        repo.reservations
            .set_status(&mut *tx, reservation.id, ReservationStatus::Fulfilled)
            .await?;
        repo.reservations
            .renumber_after_removal(&mut *tx, document.id, reservation.priority_order)
            .await?;
        // Net zero for the counter: a reservation hold became a loan hold
        availability::refresh_stored(repo, &mut tx, &document).await?;
        tx.commit().await?;

        tracing::info!(
            reservation = reservation_id,
            loan = loan.id,
            document = document.id,
            borrower = borrower.id,
            "reservation fulfilled"
        );

        Ok((loan, borrower, document))
    }

    /// Direct borrow, used when copies are free and no queue stands in the
    /// way
    pub async fn borrow(&self, borrower_id: i32, document_id: i32) -> AppResult<Loan> {
        let (loan, borrower, document) = repository::with_retry(
            self.circulation.max_tx_retries,
            || self.try_borrow(borrower_id, document_id),
        )
        .await?;

        self.notify_loan(borrower, document, loan.clone());
        Ok(loan)
    }

    async fn try_borrow(
        &self,
        borrower_id: i32,
        document_id: i32,
    ) -> AppResult<(Loan, Borrower, Document)> {
        let repo = &self.repository;
        let mut tx = repo.pool.begin().await?;

        let document = repo.documents.lock(&mut *tx, document_id).await?;
        let borrower = repo.borrowers.get_in(&mut *tx, borrower_id).await?;
        let loans_held = repo
            .loans
            .active_count_for_borrower(&mut *tx, borrower_id)
            .await?;
        check_borrower_eligibility(&borrower, loans_held)?;

        if repo
            .loans
            .has_outstanding(&mut *tx, borrower_id, document_id)
            .await?
        {
            return Err(AppError::Admission(
                ErrorCode::AlreadyBorrowed,
                "Borrower already holds this document on loan".to_string(),
            ));
        }
        if repo
            .reservations
            .has_active_for(&mut *tx, borrower_id, document_id)
            .await?
        {
            return Err(AppError::Admission(
                ErrorCode::ReservationPending,
                "Borrower has an active reservation for this document; fulfill it instead"
                    .to_string(),
            ));
        }

        // Live availability, counting the whole queue: borrowing directly
        // must not jump over anyone who is waiting
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
        if available <= 0 {
            return Err(AppError::Conflict(format!(
                "No copy of document {} is available; reserve it or retry later",
                document_id
            )));
        }

        let now = Utc::now();
        let due_date = now + Duration::days(i64::from(self.circulation.loan_period_days));
        let loan = repo
            .loans
            .create(&mut *tx, document_id, borrower_id, now, due_date)
            .await?;
        availability::refresh_stored(repo, &mut tx, &document).await?;
        tx.commit().await?;

        tracing::info!(
            loan = loan.id,
            document = document_id,
            borrower = borrower_id,
            "document borrowed directly"
        );

        Ok((loan, borrower, document))
    }

    fn notify_loan(&self, borrower: Borrower, document: Document, loan: Loan) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            run_notify(
                "loan_confirmed",
                notifier.loan_confirmed(&borrower, &document, &loan),
            )
            .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::borrower::BorrowerStatus;

    fn borrower(status: BorrowerStatus, max_loans: i16) -> Borrower {
        Borrower {
            id: 7,
            name: "Test".to_string(),
            email: None,
            max_loans,
            max_reservations: 5,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn blocked_borrowers_cannot_fulfill() {
        let result = check_borrower_eligibility(&borrower(BorrowerStatus::Blocked, 5), 0);
        assert!(matches!(
            result,
            Err(AppError::Admission(ErrorCode::BorrowerBlocked, _))
        ));
    }

    #[test]
    fn loan_quota_is_rechecked_at_fulfillment_time() {
        let result = check_borrower_eligibility(&borrower(BorrowerStatus::Active, 2), 2);
        assert!(matches!(
            result,
            Err(AppError::Admission(ErrorCode::MaxLoansReached, _))
        ));
    }

    #[test]
    fn eligible_borrowers_pass() {
        assert!(check_borrower_eligibility(&borrower(BorrowerStatus::Active, 2), 1).is_ok());
    }
}
