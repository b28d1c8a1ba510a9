//! Borrowers repository for database operations

use sqlx::{PgExecutor, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::borrower::{Borrower, BorrowerStatus, CreateBorrower, UpdateBorrower},
};

#[derive(Clone)]
pub struct BorrowersRepository {
    pool: Pool<Postgres>,
}

impl BorrowersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrower by ID
    pub async fn get(&self, id: i32) -> AppResult<Borrower> {
        sqlx::query_as::<_, Borrower>("SELECT * FROM borrowers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::no_such_borrower(id))
    }

    /// Get borrower by ID on the caller's connection (transactional reads)
    pub async fn get_in(&self, exec: impl PgExecutor<'_>, id: i32) -> AppResult<Borrower> {
        sqlx::query_as::<_, Borrower>("SELECT * FROM borrowers WHERE id = $1")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| AppError::no_such_borrower(id))
    }

    pub async fn create(&self, borrower: &CreateBorrower) -> AppResult<Borrower> {
        let created = sqlx::query_as::<_, Borrower>(
            r#"
            INSERT INTO borrowers (name, email, max_loans, max_reservations, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(&borrower.name)
        .bind(&borrower.email)
        .bind(borrower.max_loans.unwrap_or(5))
        .bind(borrower.max_reservations.unwrap_or(5))
        .bind(BorrowerStatus::Active)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn update(&self, id: i32, update: &UpdateBorrower) -> AppResult<Borrower> {
        let current = self.get(id).await?;

        let updated = sqlx::query_as::<_, Borrower>(
            r#"
            UPDATE borrowers
            SET name = $2, email = $3, max_loans = $4, max_reservations = $5,
                status = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.name.as_deref().unwrap_or(&current.name))
        .bind(update.email.as_deref().or(current.email.as_deref()))
        .bind(update.max_loans.unwrap_or(current.max_loans))
        .bind(update.max_reservations.unwrap_or(current.max_reservations))
        .bind(update.status.unwrap_or(current.status))
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn list(&self, page: i64, per_page: i64) -> AppResult<Vec<Borrower>> {
        let borrowers = sqlx::query_as::<_, Borrower>(
            "SELECT * FROM borrowers ORDER BY name, id LIMIT $1 OFFSET $2",
        )
        .bind(per_page)
        .bind((page - 1).max(0) * per_page)
        .fetch_all(&self.pool)
        .await?;
        Ok(borrowers)
    }

    /// Remove a borrower. Loans and reservations referencing the row become
    /// orphans for the auditor.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM borrowers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::no_such_borrower(id));
        }
        Ok(())
    }
}
