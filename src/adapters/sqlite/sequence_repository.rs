//! SQLite adapter for SequenceRepository.
//!
//! Each attempt runs in its own `BEGIN IMMEDIATE` transaction and writes the
//! counter with a compare-and-swap on the value it read. A concurrent writer
//! makes the attempt fail as `Contention` (lock timeout or lost swap); the
//! transaction is rolled back so a failed attempt leaves no trace.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};

use crate::adapters::sqlite::format_datetime;
use crate::domain::errors::SequenceError;
use crate::domain::ports::SequenceRepository;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Clone)]
pub struct SqliteSequenceRepository {
    pool: SqlitePool,
}

impl SqliteSequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Map a store error to contention when another writer holds the lock.
fn classify(category: &str, err: sqlx::Error) -> SequenceError {
    let contended = match &err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    };

    if contended {
        SequenceError::Contention {
            category: category.to_string(),
            message: err.to_string(),
        }
    } else {
        SequenceError::Database(err.to_string())
    }
}

async fn allocate_in_transaction(
    conn: &mut PoolConnection<Sqlite>,
    category: &str,
) -> Result<i64, SequenceError> {
    let current: Option<i64> =
        sqlx::query_scalar("SELECT last_value FROM sequence_counters WHERE category = ?1")
            .bind(category)
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| classify(category, e))?;

    let now = format_datetime(Utc::now());
    let (next, result) = match current {
        None => (
            1,
            sqlx::query(
                "INSERT INTO sequence_counters (category, last_value, updated_at)
                 VALUES (?1, 1, ?2)
                 ON CONFLICT(category) DO NOTHING",
            )
            .bind(category)
            .bind(&now)
            .execute(&mut **conn)
            .await,
        ),
        Some(last) => (
            last + 1,
            sqlx::query(
                "UPDATE sequence_counters SET last_value = ?1, updated_at = ?2
                 WHERE category = ?3 AND last_value = ?4",
            )
            .bind(last + 1)
            .bind(&now)
            .bind(category)
            .bind(last)
            .execute(&mut **conn)
            .await,
        ),
    };

    let affected = result.map_err(|e| classify(category, e))?.rows_affected();
    if affected == 0 {
        return Err(SequenceError::Contention {
            category: category.to_string(),
            message: "counter changed between read and write".to_string(),
        });
    }
    Ok(next)
}

#[async_trait]
impl SequenceRepository for SqliteSequenceRepository {
    async fn try_allocate(&self, category: &str) -> Result<i64, SequenceError> {
        let mut conn = self.pool.acquire().await.map_err(|e| classify(category, e))?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| classify(category, e))?;

        let outcome = match allocate_in_transaction(&mut conn, category).await {
            Ok(value) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| value)
                .map_err(|e| classify(category, e)),
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                tracing::debug!(category, error = %e, "rollback after failed allocation");
            }
        }
        outcome
    }

    async fn current(&self, category: &str) -> Result<i64, SequenceError> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_value FROM sequence_counters WHERE category = ?1")
                .bind(category)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| classify(category, e))?;
        Ok(value.unwrap_or(0))
    }
}
