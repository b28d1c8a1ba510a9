//! Documents repository: inventory counter rows

use sqlx::{PgExecutor, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::document::{Document, DocumentKind},
};

#[derive(Clone)]
pub struct DocumentsRepository {
    pool: Pool<Postgres>,
}

impl DocumentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get document by ID
    pub async fn get(&self, id: i32) -> AppResult<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::no_such_document(id))
    }

    /// Lock the document row for the duration of the caller's transaction.
    /// Every queue/counter mutation goes through this lock, which serializes
    /// circulation per document across concurrent request handlers.
    pub async fn lock(&self, exec: impl PgExecutor<'_>, id: i32) -> AppResult<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| AppError::no_such_document(id))
    }

    /// Register a new counter row; the pool starts fully available
    pub async fn create(
        &self,
        kind: DocumentKind,
        title: &str,
        total_copies: i16,
    ) -> AppResult<Document> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (kind, title, total_copies, available_copies, created_at, updated_at)
            VALUES ($1, $2, $3, $3, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(kind)
        .bind(title)
        .bind(total_copies)
        .fetch_one(&self.pool)
        .await?;

        Ok(document)
    }

    /// Rewrite the stored availability cache
    pub async fn set_available(
        &self,
        exec: impl PgExecutor<'_>,
        id: i32,
        available_copies: i16,
    ) -> AppResult<()> {
        sqlx::query("UPDATE documents SET available_copies = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(available_copies)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Resize the copy pool, rewriting both counters in one statement
    pub async fn resize(
        &self,
        exec: impl PgExecutor<'_>,
        id: i32,
        total_copies: i16,
        available_copies: i16,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET total_copies = $2, available_copies = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(total_copies)
        .bind(available_copies)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::no_such_document(id));
        }
        Ok(())
    }

    /// Remove a counter row. Loans and reservations referencing it become
    /// orphans for the auditor; callers are expected to drain circulation
    /// first.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::no_such_document(id));
        }
        Ok(())
    }

    /// All counter rows, for the audit sweep
    pub async fn all(&self) -> AppResult<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>("SELECT * FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(documents)
    }
}
