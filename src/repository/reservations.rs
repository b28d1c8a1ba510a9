//! Reservations repository: the per-document waitlist

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::reservation::{QueueEntry, Reservation, ReservationStatus},
};

/// Partial unique index guarding one active reservation per borrower per
/// document; a 23505 on it is a duplicate-admission race, not an outage.
pub const ACTIVE_RESERVATION_UNIQUE: &str = "reservations_active_borrower_document_key";

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get reservation by ID
    pub async fn get(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::no_such_reservation(id))
    }

    /// Get reservation by ID on the caller's connection
    pub async fn get_in(&self, exec: impl PgExecutor<'_>, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| AppError::no_such_reservation(id))
    }

    /// Re-read a reservation under row lock, after the document lock is held
    pub async fn get_locked(&self, exec: impl PgExecutor<'_>, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| AppError::no_such_reservation(id))
    }

    /// Append to the document's queue. The caller holds the document row
    /// lock and passes `max_priority + 1`.
    pub async fn insert(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
        borrower_id: i32,
        reservation_date: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
        priority_order: i16,
    ) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations
                (document_id, borrower_id, reservation_date, expiry_date, status, priority_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(document_id)
        .bind(borrower_id)
        .bind(reservation_date)
        .bind(expiry_date)
        .bind(ReservationStatus::Active)
        .bind(priority_order)
        .fetch_one(exec)
        .await?;

        Ok(reservation)
    }

    /// Current highest priority in the document's active queue (0 if empty)
    pub async fn max_priority(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
    ) -> AppResult<i16> {
        let max: i16 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(priority_order), 0)::smallint
            FROM reservations
            WHERE document_id = $1 AND status = $2
            "#,
        )
        .bind(document_id)
        .bind(ReservationStatus::Active)
        .fetch_one(exec)
        .await?;
        Ok(max)
    }

    pub async fn set_status(
        &self,
        exec: impl PgExecutor<'_>,
        id: i32,
        status: ReservationStatus,
    ) -> AppResult<()> {
        sqlx::query("UPDATE reservations SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Close the gap left by a fulfilled/cancelled/expired entry. One
    /// declarative statement so no renumbering update can be lost; must run
    /// in the same transaction as the status flip.
    pub async fn renumber_after_removal(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
        removed_priority: i16,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reservations SET priority_order = priority_order - 1
            WHERE document_id = $1 AND status = $2 AND priority_order > $3
            "#,
        )
        .bind(document_id)
        .bind(ReservationStatus::Active)
        .bind(removed_priority)
        .execute(exec)
        .await?;
        Ok(result.rows_affected())
    }

    /// Rewrite the whole active queue to `{1..N}` in the current order
    /// (audit repair path)
    pub async fn resequence(&self, exec: impl PgExecutor<'_>, document_id: i32) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reservations r
            SET priority_order = ranked.rn
            FROM (
                SELECT id, ROW_NUMBER() OVER (
                    ORDER BY priority_order, reservation_date, id
                )::smallint AS rn
                FROM reservations
                WHERE document_id = $1 AND status = $2
            ) ranked
            WHERE r.id = ranked.id AND r.priority_order <> ranked.rn
            "#,
        )
        .bind(document_id)
        .bind(ReservationStatus::Active)
        .execute(exec)
        .await?;
        Ok(result.rows_affected())
    }

    /// Active queue size for a document
    pub async fn active_count_for_document(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE document_id = $1 AND status = $2",
        )
        .bind(document_id)
        .bind(ReservationStatus::Active)
        .fetch_one(exec)
        .await?;
        Ok(count)
    }

    /// Active entries ahead of the given priority. Fulfillment eligibility
    /// counts only these: the entry being fulfilled and everyone behind it
    /// must not block the head of the queue.
    pub async fn active_count_ahead(
        &self,
        exec: impl PgExecutor<'_>,
        document_id: i32,
        priority_order: i16,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reservations
            WHERE document_id = $1 AND status = $2 AND priority_order < $3
            "#,
        )
        .bind(document_id)
        .bind(ReservationStatus::Active)
        .bind(priority_order)
        .fetch_one(exec)
        .await?;
        Ok(count)
    }

    /// Active reservation count for a borrower (quota checks)
    pub async fn active_count_for_borrower(
        &self,
        exec: impl PgExecutor<'_>,
        borrower_id: i32,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE borrower_id = $1 AND status = $2",
        )
        .bind(borrower_id)
        .bind(ReservationStatus::Active)
        .fetch_one(exec)
        .await?;
        Ok(count)
    }

    /// Whether the borrower already waits for this document
    pub async fn has_active_for(
        &self,
        exec: impl PgExecutor<'_>,
        borrower_id: i32,
        document_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE borrower_id = $1 AND document_id = $2 AND status = $3
            )
            "#,
        )
        .bind(borrower_id)
        .bind(document_id)
        .bind(ReservationStatus::Active)
        .fetch_one(exec)
        .await?;
        Ok(exists)
    }

    /// The document's active queue in serving order, with borrower context
    pub async fn queue_for_document(
        &self,
        document_id: i32,
        limit: Option<i64>,
    ) -> AppResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT r.id as reservation_id, r.borrower_id, b.name as borrower_name,
                   b.email as borrower_email, r.priority_order, r.reservation_date, r.expiry_date
            FROM reservations r
            JOIN borrowers b ON r.borrower_id = b.id
            WHERE r.document_id = $1 AND r.status = $2
            ORDER BY r.priority_order
            LIMIT $3
            "#,
        )
        .bind(document_id)
        .bind(ReservationStatus::Active)
        // LIMIT NULL means no limit
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Active reservations held by a borrower
    pub async fn list_for_borrower(&self, borrower_id: i32) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE borrower_id = $1 AND status = $2
            ORDER BY reservation_date
            "#,
        )
        .bind(borrower_id)
        .bind(ReservationStatus::Active)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    /// IDs of active reservations whose grace window has lapsed
    pub async fn lapsed_active_ids(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar(
            "SELECT id FROM reservations WHERE status = $1 AND expiry_date < $2 ORDER BY id",
        )
        .bind(ReservationStatus::Active)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// All active reservations grouped for priority-sequence checks,
    /// ordered by document then priority
    pub async fn all_active_ordered(&self) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE status = $1
            ORDER BY document_id, priority_order, reservation_date, id
            "#,
        )
        .bind(ReservationStatus::Active)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Reservation rows whose document or borrower no longer exists
    pub async fn orphaned(&self) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT r.* FROM reservations r
            LEFT JOIN documents d ON r.document_id = d.id
            LEFT JOIN borrowers b ON r.borrower_id = b.id
            WHERE d.id IS NULL OR b.id IS NULL
            ORDER BY r.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Hard-delete a reservation row (orphan repair only; normal removal is
    /// a status transition)
    pub async fn delete(&self, exec: impl PgExecutor<'_>, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(exec)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::no_such_reservation(id));
        }
        Ok(())
    }
}
