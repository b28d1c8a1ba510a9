//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanDetails, LoanStatus},
};

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::no_such_loan(id))
    }

    /// Get loan by ID on the caller's connection (transactional reads)
    pub async fn get_in(&self, exec: impl PgExecutor<'_>, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| AppError::no_such_loan(id))
    }

    /// Insert a loan row. Only the fulfillment coordinator calls this, inside
    /// its transaction.
    pub async fn create(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
        borrower_id: i32,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (document_id, borrower_id, loan_date, due_date, extended_count)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING *
            "#,
        )
        .bind(document_id)
        .bind(borrower_id)
        .bind(loan_date)
        .bind(due_date)
        .fetch_one(exec)
        .await?;

        Ok(loan)
    }

    /// Set the return date on an outstanding loan
    pub async fn mark_returned(
        &self,
        exec: impl PgExecutor<'_>,
        id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            "UPDATE loans SET return_date = $2 WHERE id = $1 AND return_date IS NULL RETURNING *",
        )
        .bind(id)
        .bind(returned_at)
        .fetch_optional(exec)
        .await?
        .ok_or_else(|| AppError::no_such_loan(id))
    }

    /// Move the due date and bump the extension counter
    pub async fn extend(
        &self,
        exec: impl PgExecutor<'_>,
        id: i32,
        new_due_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET due_date = $2, extended_count = extended_count + 1
            WHERE id = $1 AND return_date IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_due_date)
        .fetch_optional(exec)
        .await?
        .ok_or_else(|| AppError::no_such_loan(id))
    }

    /// Hard-delete a loan row (administrative path and orphan repair)
    pub async fn delete(&self, exec: impl PgExecutor<'_>, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(exec)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::no_such_loan(id));
        }
        Ok(())
    }

    /// Outstanding loan count for a document
    pub async fn active_count_for_document(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE document_id = $1 AND return_date IS NULL",
        )
        .bind(document_id)
        .fetch_one(exec)
        .await?;
        Ok(count)
    }

    /// Outstanding loan count for a borrower (quota checks)
    pub async fn active_count_for_borrower(
        &self,
        exec: impl PgExecutor<'_>,
        borrower_id: i32,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE borrower_id = $1 AND return_date IS NULL",
        )
        .bind(borrower_id)
        .fetch_one(exec)
        .await?;
        Ok(count)
    }

    /// Whether the borrower already holds this document
    pub async fn has_outstanding(
        &self,
        exec: impl PgExecutor<'_>,
        borrower_id: i32,
        document_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loans
                WHERE borrower_id = $1 AND document_id = $2 AND return_date IS NULL
            )
            "#,
        )
        .bind(borrower_id)
        .bind(document_id)
        .fetch_one(exec)
        .await?;
        Ok(exists)
    }

    /// Earliest due date among outstanding loans, used to refine queue wait
    /// estimates
    pub async fn earliest_due_date(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let due: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MIN(due_date) FROM loans WHERE document_id = $1 AND return_date IS NULL",
        )
        .bind(document_id)
        .fetch_one(exec)
        .await?;
        Ok(due)
    }

    /// Outstanding loans for a borrower, with document context
    pub async fn list_for_borrower(&self, borrower_id: i32) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.document_id, d.kind as document_kind, d.title as document_title,
                   l.borrower_id, b.name as borrower_name,
                   l.loan_date, l.due_date, l.return_date, l.extended_count
            FROM loans l
            JOIN documents d ON l.document_id = d.id
            JOIN borrowers b ON l.borrower_id = b.id
            WHERE l.borrower_id = $1 AND l.return_date IS NULL
            ORDER BY l.loan_date
            "#,
        )
        .bind(borrower_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let due_date: DateTime<Utc> = row.get("due_date");
            let return_date: Option<DateTime<Utc>> = row.get("return_date");
            let status = if return_date.is_some() {
                LoanStatus::Returned
            } else if due_date < now {
                LoanStatus::Overdue
            } else {
                LoanStatus::Active
            };
            result.push(LoanDetails {
                id: row.get("id"),
                document_id: row.get("document_id"),
                document_kind: row.get("document_kind"),
                document_title: row.get("document_title"),
                borrower_id: row.get("borrower_id"),
                borrower_name: row.get("borrower_name"),
                loan_date: row.get("loan_date"),
                due_date,
                return_date,
                extended_count: row.get("extended_count"),
                status,
            });
        }
        Ok(result)
    }

    /// Loan rows whose document or borrower no longer exists
    pub async fn orphaned(&self) -> AppResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, Loan>(
            r#"
            SELECT l.* FROM loans l
            LEFT JOIN documents d ON l.document_id = d.id
            LEFT JOIN borrowers b ON l.borrower_id = b.id
            WHERE d.id IS NULL OR b.id IS NULL
            ORDER BY l.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
