//! Inventory store operations: registering and resizing copy-counter rows.
//!
//! Only the counters live here; bibliographic metadata belongs to the
//! catalog layers outside the circulation engine.

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::document::{CreateDocument, Document},
    repository::{self, Repository},
    services::availability,
};

#[derive(Clone)]
pub struct InventoryService {
    repository: Repository,
    circulation: CirculationConfig,
}

impl InventoryService {
    pub fn new(repository: Repository, circulation: CirculationConfig) -> Self {
        Self { repository, circulation }
    }

    pub async fn get(&self, document_id: i32) -> AppResult<Document> {
        self.repository.documents.get(document_id).await
    }

    pub async fn create(&self, request: &CreateDocument) -> AppResult<Document> {
        // Academic works circulate as a single implicit unit; books default
        // to one copy until the pool is resized
        let total_copies = request.total_copies.unwrap_or(1);
        let document = self
            .repository
            .documents
            .create(request.kind, &request.title, total_copies)
            .await?;

        tracing::info!(
            document = document.id,
            kind = document.kind.as_str(),
            copies = total_copies,
            "document registered"
        );
        Ok(document)
    }

    /// Resize the copy pool. The availability cache is recomputed from live
    /// loan/reservation counts inside the same transaction.
    pub async fn resize(&self, document_id: i32, total_copies: i16) -> AppResult<Document> {
        repository::with_retry(self.circulation.max_tx_retries, || {
            self.try_resize(document_id, total_copies)
        })
        .await
    }

    async fn try_resize(&self, document_id: i32, total_copies: i16) -> AppResult<Document> {
        let repo = &self.repository;
        let mut tx = repo.pool.begin().await?;

        let document = repo.documents.lock(&mut *tx, document_id).await?;
        let active_loans = repo
            .loans
            .active_count_for_document(&mut *tx, document_id)
            .await?;
        if i64::from(total_copies) < active_loans {
            return Err(AppError::BadRequest(format!(
                "Cannot shrink document {} below its {} outstanding loans",
                document_id, active_loans
            )));
        }

        let active_reservations = repo
            .reservations
            .active_count_for_document(&mut *tx, document_id)
            .await?;
        let available =
            availability::compute_available(total_copies, active_loans, active_reservations);
        repo.documents
            .resize(&mut *tx, document_id, total_copies, available)
            .await?;
        tx.commit().await?;

        tracing::info!(document = document_id, copies = total_copies, "copy pool resized");
        Ok(Document { total_copies, available_copies: available, ..document })
    }

    /// Remove a counter row. Outstanding loans or reservations are logged
    /// and left behind as orphans; the auditor reports and repairs them.
    pub async fn delete(&self, document_id: i32) -> AppResult<()> {
        let pool = &self.repository.pool;
        let outstanding = self
            .repository
            .loans
            .active_count_for_document(pool, document_id)
            .await?;
        let waiting = self
            .repository
            .reservations
            .active_count_for_document(pool, document_id)
            .await?;
        if outstanding > 0 || waiting > 0 {
            tracing::warn!(
                document = document_id,
                loans = outstanding,
                reservations = waiting,
                "deleting document with outstanding circulation; rows become orphans"
            );
        }
        self.repository.documents.delete(document_id).await
    }
}
