//! Borrower management service

use crate::{
    error::AppResult,
    models::borrower::{Borrower, CreateBorrower, UpdateBorrower},
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowersService {
    repository: Repository,
}

impl BorrowersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get(&self, id: i32) -> AppResult<Borrower> {
        self.repository.borrowers.get(id).await
    }

    pub async fn create(&self, request: &CreateBorrower) -> AppResult<Borrower> {
        let borrower = self.repository.borrowers.create(request).await?;
        tracing::info!(borrower = borrower.id, "borrower registered");
        Ok(borrower)
    }

    pub async fn update(&self, id: i32, request: &UpdateBorrower) -> AppResult<Borrower> {
        self.repository.borrowers.update(id, request).await
    }

    pub async fn list(&self, page: i64, per_page: i64) -> AppResult<Vec<Borrower>> {
        self.repository.borrowers.list(page, per_page.clamp(1, 200)).await
    }

    /// Remove a borrower. Outstanding circulation rows become orphans for
    /// the auditor, mirroring document removal.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let pool = &self.repository.pool;
        let outstanding = self.repository.loans.active_count_for_borrower(pool, id).await?;
        let waiting = self
            .repository
            .reservations
            .active_count_for_borrower(pool, id)
            .await?;
        if outstanding > 0 || waiting > 0 {
            tracing::warn!(
                borrower = id,
                loans = outstanding,
                reservations = waiting,
                "deleting borrower with outstanding circulation; rows become orphans"
            );
        }
        self.repository.borrowers.delete(id).await
    }
}
