//! Retryable unit-of-work wrapper.
//!
//! Every business event runs as one multi-record SQLite transaction. On the
//! transient class of store errors (lock conflicts, pool timeouts) the whole
//! unit is retried from the top with exponential backoff inside a bounded
//! elapsed budget; it is never resumed mid-way. Non-transient errors abort
//! immediately and surface to the caller.

use crate::error::SettlementError;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

/// Future type returned by a unit-of-work body.
pub type UowFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, SettlementError>> + Send + 'c>>;

/// Run `body` inside one transaction, retrying the whole unit on transient
/// store errors until `budget_ms` elapses.
///
/// `body` must be re-runnable from scratch: each attempt opens a fresh
/// transaction and a failed attempt is rolled back before the next one.
pub async fn run_unit_of_work<T, F>(
    pool: &SqlitePool,
    budget_ms: i64,
    name: &str,
    body: F,
) -> Result<T, SettlementError>
where
    F: for<'c> Fn(&'c mut SqliteConnection) -> UowFuture<'c, T>,
{
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(20),
        max_elapsed_time: Some(Duration::from_millis(budget_ms.max(0) as u64)),
        ..Default::default()
    };

    retry(backoff, || async {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| to_backoff(name, SettlementError::from(e)))?;

        match body(&mut tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| to_backoff(name, SettlementError::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                // Rollback failure is secondary to the original error.
                let _ = tx.rollback().await;
                Err(to_backoff(name, err))
            }
        }
    })
    .await
}

fn to_backoff(name: &str, err: SettlementError) -> backoff::Error<SettlementError> {
    if err.is_transient() {
        warn!(unit = name, error = %err, "transient store error, retrying unit of work");
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    async fn test_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        (init_db(&db_path).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_commits_on_success() {
        let (pool, _temp) = test_pool().await;

        let value = run_unit_of_work(&pool, 1_000, "test", |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO ads (id, advertiser_id) VALUES ('a', 'u')")
                    .execute(&mut *conn)
                    .await
                    .map_err(SettlementError::from)?;
                Ok(42)
            })
        })
        .await
        .unwrap();
        assert_eq!(value, 42);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ads")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_rolls_back_on_permanent_error() {
        let (pool, _temp) = test_pool().await;

        let result: Result<(), _> = run_unit_of_work(&pool, 1_000, "test", |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO ads (id, advertiser_id) VALUES ('a', 'u')")
                    .execute(&mut *conn)
                    .await
                    .map_err(SettlementError::from)?;
                Err(SettlementError::Validation("boom".to_string()))
            })
        })
        .await;
        assert!(matches!(result, Err(SettlementError::Validation(_))));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ads")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0, "aborted unit of work must leave no rows");
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let (pool, _temp) = test_pool().await;
        let attempts = AtomicU32::new(0);

        let value = run_unit_of_work(&pool, 5_000, "test", |_conn| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if attempt < 2 {
                    Err(SettlementError::TransientStore("locked".to_string()))
                } else {
                    Ok("done")
                }
            })
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let (pool, _temp) = test_pool().await;
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = run_unit_of_work(&pool, 5_000, "test", |_conn| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Err(SettlementError::StateConflict("no".to_string())) })
        })
        .await;

        assert!(matches!(result, Err(SettlementError::StateConflict(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
