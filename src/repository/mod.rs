//! Repository layer for database operations

pub mod borrowers;
pub mod documents;
pub mod loans;
pub mod reservations;

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use sqlx::{Pool, Postgres};

use crate::error::{AppError, AppResult};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub documents: documents::DocumentsRepository,
    pub borrowers: borrowers::BorrowersRepository,
    pub loans: loans::LoansRepository,
    pub reservations: reservations::ReservationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            documents: documents::DocumentsRepository::new(pool.clone()),
            borrowers: borrowers::BorrowersRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            pool,
        }
    }
}

/// Run a transactional operation, retrying a bounded number of times when it
/// loses a serialization race or deadlocks. Each attempt must open and commit
/// its own transaction; anything else (admission rejections, not-found,
/// validation) passes through untouched.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let jitter = rand::thread_rng().gen_range(0..50);
                let backoff = Duration::from_millis(u64::from(attempt) * 50 + jitter);
                tracing::warn!(attempt, "transaction conflict, retrying in {:?}: {}", backoff, err);
                tokio::time::sleep(backoff).await;
            }
            other => return other,
        }
    }
}

/// Serialization failure (40001) and deadlock (40P01) are safe to retry:
/// the transaction rolled back without applying anything.
pub fn is_retryable(err: &AppError) -> bool {
    matches!(pg_error_code(err).as_deref(), Some("40001") | Some("40P01"))
}

/// Whether a database error is a unique violation on the given constraint
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db) = err {
        db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint)
    } else {
        false
    }
}

fn pg_error_code(err: &AppError) -> Option<String> {
    if let AppError::Database(sqlx::Error::Database(db)) = err {
        db.code().map(|c| c.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn non_retryable_errors_pass_through_immediately() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::Admission(
                    ErrorCode::DuplicateReservation,
                    "dup".to_string(),
                ))
            }
        })
        .await;
        assert!(matches!(result, Err(AppError::Admission(..))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_returns_first_value() {
        let result = with_retry(3, || async { Ok::<_, AppError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
