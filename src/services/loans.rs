//! Loan lifecycle: returns, extensions, administrative deletion and the
//! head-of-queue notification that follows a return.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult, ErrorCode},
    models::loan::{Loan, LoanDetails},
    repository::{self, Repository},
    services::{availability, notifications::{run_notify, Notifier}},
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    circulation: CirculationConfig,
    notifier: Arc<dyn Notifier>,
}

impl LoansService {
    pub fn new(
        repository: Repository,
        circulation: CirculationConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { repository, circulation, notifier }
    }

    pub async fn get(&self, loan_id: i32) -> AppResult<Loan> {
        self.repository.loans.get(loan_id).await
    }

    /// Outstanding loans for a borrower, overdue status derived at read time
    pub async fn list_for_borrower(&self, borrower_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.borrowers.get(borrower_id).await?;
        self.repository.loans.list_for_borrower(borrower_id).await
    }

    /// Register a return, then tell the head of the queue a copy is free.
    /// Fulfillment stays an explicit action by the waiting borrower or
    /// staff; nothing is auto-created here.
    pub async fn return_loan(
        &self,
        loan_id: i32,
        returned_at: Option<DateTime<Utc>>,
    ) -> AppResult<Loan> {
        let loan = repository::with_retry(self.circulation.max_tx_retries, || {
            self.try_return(loan_id, returned_at)
        })
        .await?;

        self.notify_after_return(&loan);
        Ok(loan)
    }

    async fn try_return(
        &self,
        loan_id: i32,
        returned_at: Option<DateTime<Utc>>,
    ) -> AppResult<Loan> {
        let repo = &self.repository;
        let mut tx = repo.pool.begin().await?;

        let loan = repo.loans.get_in(&mut *tx, loan_id).await?;
        if loan.return_date.is_some() {
            return Err(AppError::Admission(
                ErrorCode::AlreadyReturned,
                format!("Loan {} is already returned", loan_id),
            ));
        }

        let document = repo.documents.lock(&mut *tx, loan.document_id).await?;
        let returned = repo
            .loans
            .mark_returned(&mut *tx, loan_id, returned_at.unwrap_or_else(Utc::now))
            .await?;
        availability::refresh_stored(repo, &mut tx, &document).await?;
        tx.commit().await?;

        tracing::info!(loan = loan_id, document = document.id, "loan returned");
        Ok(returned)
    }

    /// Post-commit, best effort: confirm the return and ping the first few
    /// waiting borrowers.
    fn notify_after_return(&self, loan: &Loan) {
        let repository = self.repository.clone();
        let notifier = self.notifier.clone();
        let batch = i64::from(self.circulation.notify_queue_batch);
        let document_id = loan.document_id;
        let borrower_id = loan.borrower_id;

        tokio::spawn(async move {
            let document = match repository.documents.get(document_id).await {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(document = document_id, "skipping return notifications: {}", err);
                    return;
                }
            };

            if let Ok(borrower) = repository.borrowers.get(borrower_id).await {
                run_notify(
                    "return_confirmed",
                    notifier.return_confirmed(&borrower, &document),
                )
                .await;
            }

            match repository
                .reservations
                .queue_for_document(document_id, Some(batch))
                .await
            {
                Ok(entries) => {
                    for entry in entries {
                        run_notify(
                            "document_available",
                            notifier.document_available(&entry, &document),
                        )
                        .await;
                    }
                }
                Err(err) => {
                    tracing::warn!(document = document_id, "queue notification scan failed: {}", err);
                }
            }
        });
    }

    /// Move the due date of an outstanding loan. Whether the new date must
    /// be later than the old one is caller policy; only "not yet returned"
    /// is enforced here.
    pub async fn extend(&self, loan_id: i32, new_due_date: DateTime<Utc>) -> AppResult<Loan> {
        let repo = &self.repository;

        let current = repo.loans.get(loan_id).await?;
        if current.return_date.is_some() {
            return Err(AppError::Admission(
                ErrorCode::AlreadyReturned,
                format!("Loan {} is already returned and cannot be extended", loan_id),
            ));
        }

        let loan = repo.loans.extend(&repo.pool, loan_id, new_due_date).await?;

        let notifier = self.notifier.clone();
        let repository = self.repository.clone();
        let extended = loan.clone();
        tokio::spawn(async move {
            let (document, borrower) = match (
                repository.documents.get(extended.document_id).await,
                repository.borrowers.get(extended.borrower_id).await,
            ) {
                (Ok(d), Ok(b)) => (d, b),
                _ => return,
            };
            run_notify(
                "extension_confirmed",
                notifier.extension_confirmed(&borrower, &document, &extended),
            )
            .await;
        });

        tracing::info!(loan = loan_id, due = %loan.due_date, "loan extended");
        Ok(loan)
    }

    /// Administrative hard delete. An outstanding loan gives its copy back
    /// to the pool in the same transaction that removes the row.
    pub async fn delete(&self, loan_id: i32) -> AppResult<()> {
        repository::with_retry(self.circulation.max_tx_retries, || self.try_delete(loan_id))
            .await
    }

    async fn try_delete(&self, loan_id: i32) -> AppResult<()> {
        let repo = &self.repository;
        let mut tx = repo.pool.begin().await?;

        let loan = repo.loans.get_in(&mut *tx, loan_id).await?;
        if loan.is_outstanding() {
            let document = repo.documents.lock(&mut *tx, loan.document_id).await?;
            repo.loans.delete(&mut *tx, loan_id).await?;
            availability::refresh_stored(repo, &mut tx, &document).await?;
        } else {
            repo.loans.delete(&mut *tx, loan_id).await?;
        }
        tx.commit().await?;

        tracing::info!(loan = loan_id, "loan deleted by administrator");
        Ok(())
    }
}
