//! Bounded transactions over the SQLite pool.
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::errors::RepositoryError;

/// Upper bound for a whole transaction, from `BEGIN` to `COMMIT`.
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

const NESTED_TRANSACTION: &str = "cannot start a transaction within a transaction";

/// Runs `f` inside a transaction.
///
/// The transaction commits when `f` returns `Ok` and rolls back when it
/// returns `Err`. The body and the commit together must finish within
/// [`TRANSACTION_TIMEOUT`]; past it the transaction is dropped, which rolls
/// it back. A failed rollback is logged; the error from `f` (or the timeout)
/// is what the caller sees.
///
/// Opening the transaction is retried briefly while the database reports
/// itself busy. If the driver refuses because a transaction is already open on
/// the connection, a `ROLLBACK` is issued before the error is returned so the
/// connection goes back to the pool clean.
///
/// # Arguments
///
/// * `pool` - The pool to take a connection from
/// * `f` - The body, receiving the transaction's connection
///
/// # Returns
///
/// * `Ok(T)` - The body's value, after a successful commit
/// * `Err(RepositoryError)` - The body's error, a timeout, or a begin / commit failure
pub async fn transaction<T, F>(pool: &SqlitePool, f: F) -> Result<T, RepositoryError>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, RepositoryError>>
        + Send,
{
    bounded_transaction(pool, TRANSACTION_TIMEOUT, f).await
}

pub(crate) async fn bounded_transaction<T, F>(
    pool: &SqlitePool,
    limit: Duration,
    f: F,
) -> Result<T, RepositoryError>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, RepositoryError>>
        + Send,
{
    let mut tx = begin(pool).await?;

    let work = async move {
        let result = f(&mut *tx).await;
        match result {
            Ok(value) => tx
                .commit()
                .await
                .map(|()| value)
                .map_err(RepositoryError::from),
            Err(reason) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(
                        error = %rollback_error,
                        reason = %reason,
                        "Failed to roll back transaction"
                    );
                }
                Err(reason)
            }
        }
    };

    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            warn!(limit = ?limit, "Transaction timed out and was rolled back");
            Err(RepositoryError::Timeout(limit))
        }
    }
}

async fn begin(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, RepositoryError> {
    let strategy = ExponentialBackoff::from_millis(10)
        .factor(2)
        .max_delay(Duration::from_millis(500))
        .map(jitter)
        .take(5);

    match RetryIf::spawn(strategy, || pool.begin(), is_busy).await {
        Ok(tx) => Ok(tx),
        Err(e) => {
            if e.to_string().contains(NESTED_TRANSACTION) {
                rollback_dangling(pool).await;
            }
            Err(e.into())
        }
    }
}

async fn rollback_dangling(pool: &SqlitePool) {
    match pool.acquire().await {
        Ok(mut conn) => {
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %e, "Rollback of dangling transaction failed");
            } else {
                debug!("Rolled back a dangling transaction");
            }
        }
        Err(e) => warn!(error = %e, "Could not acquire a connection to roll back a dangling transaction"),
    }
}

fn is_busy(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            let message = db.message();
            message.contains("database is locked") || message.contains("database is busy")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}
