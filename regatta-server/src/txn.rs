//! Transaction Execution
//!
//! Runs a unit of work inside a store transaction at a chosen isolation
//! level, retrying the whole unit from scratch on write conflicts. The unit
//! receives the open connection as an explicit handle; there is no ambient
//! transaction state anywhere in the server.

use futures::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{Error, Result};

/// Default retry budget for conflicting transactions.
pub const DEFAULT_TXN_ATTEMPTS: u32 = 10;

/// Transaction mode, mapped onto the store's `BEGIN` variants.
///
/// `Immediate` takes the write lock up front, which is what keeps concurrent
/// status and metadata edits from losing updates. `Deferred` is the store
/// default and is enough for read-only work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    Deferred,
    Immediate,
}

impl Isolation {
    fn begin_stmt(self) -> &'static str {
        match self {
            Isolation::Deferred => "BEGIN DEFERRED",
            Isolation::Immediate => "BEGIN IMMEDIATE",
        }
    }
}

/// Execute `work` inside a transaction, retrying on write conflict.
///
/// Every attempt re-runs the whole unit of work against a fresh `BEGIN`, so
/// anything the unit does must be safe to repeat. Validation and not-found
/// failures roll back and propagate immediately; only write conflicts
/// consume the attempt budget. An exhausted budget is logged with its
/// attempt count and surfaced as [`Error::Unavailable`], with nothing
/// committed.
pub async fn run_txn<T, F>(
    pool: &SqlitePool,
    isolation: Isolation,
    max_attempts: u32,
    mut work: F,
) -> Result<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_txn(pool, isolation, &mut work).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_race() => {
                if attempt >= max_attempts {
                    tracing::error!(
                        attempts = attempt,
                        "giving up on transaction after repeated write conflicts"
                    );
                    return Err(Error::Unavailable { attempts: attempt });
                }
                tracing::warn!(attempt, max_attempts, "retrying transaction after write conflict");
            }
            Err(err) => return Err(err),
        }
    }
}

async fn attempt_txn<T, F>(pool: &SqlitePool, isolation: Isolation, work: &mut F) -> Result<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
{
    let mut conn = pool.acquire().await?;
    sqlx::query(isolation.begin_stmt())
        .execute(&mut *conn)
        .await?;
    match work(&mut *conn).await {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(value),
            Err(err) => {
                // The connection goes back to the pool; leave it clean.
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(err.into())
            }
        },
        Err(err) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(err)
        }
    }
}
