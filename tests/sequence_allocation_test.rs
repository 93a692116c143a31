//! Concurrency tests for per-category ticket number allocation on a
//! file-backed store shared by several pooled connections.

mod common;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use oak::adapters::sqlite::{initialize_database, tickets_migrations, PoolConfig, SqliteSequenceRepository};
use oak::domain::errors::SequenceError;
use oak::domain::models::AllocationConfig;
use oak::services::TicketNumbering;
use sqlx::SqlitePool;

async fn open_store(path: &Path, busy_timeout: Duration) -> SqlitePool {
    let config = PoolConfig {
        max_connections: 8,
        busy_timeout,
        ..PoolConfig::default()
    };
    initialize_database(&format!("sqlite:{}", path.display()), config, tickets_migrations())
        .await
        .expect("Failed to open store")
}

fn numbering(pool: &SqlitePool, policy: AllocationConfig) -> Arc<TicketNumbering> {
    Arc::new(TicketNumbering::new(
        Arc::new(SqliteSequenceRepository::new(pool.clone())),
        policy,
    ))
}

async fn allocate_concurrently(numbering: &Arc<TicketNumbering>, category: &str, n: usize) -> Vec<i64> {
    let tasks: Vec<_> = (0..n)
        .map(|_| {
            let numbering = numbering.clone();
            let category = category.to_string();
            tokio::spawn(async move { numbering.allocate(&category).await })
        })
        .collect();

    let mut values = Vec::with_capacity(n);
    for task in tasks {
        values.push(task.await.expect("allocation task panicked").expect("allocation failed"));
    }
    values
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_are_distinct_and_gapless() {
    let dir = common::temp_dir();
    let pool = open_store(&dir.path().join("data.db"), Duration::from_secs(5)).await;
    let numbering = numbering(&pool, AllocationConfig::default());

    for expected in 1..=7 {
        assert_eq!(numbering.allocate("support").await.unwrap(), expected);
    }

    let values = allocate_concurrently(&numbering, "support", 50).await;
    let issued: BTreeSet<i64> = values.iter().copied().collect();

    assert_eq!(issued.len(), 50, "duplicate numbers issued: {values:?}");
    assert_eq!(issued, (8..=57).collect::<BTreeSet<i64>>());
    assert_eq!(numbering.current("support").await.unwrap(), 57);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_categories_are_independent_under_concurrency() {
    let dir = common::temp_dir();
    let pool = open_store(&dir.path().join("data.db"), Duration::from_secs(5)).await;
    let numbering = numbering(&pool, AllocationConfig::default());

    let (support, report) = tokio::join!(
        allocate_concurrently(&numbering, "support", 20),
        allocate_concurrently(&numbering, "report", 20),
    );

    let expected: BTreeSet<i64> = (1..=20).collect();
    assert_eq!(support.into_iter().collect::<BTreeSet<_>>(), expected);
    assert_eq!(report.into_iter().collect::<BTreeSet<_>>(), expected);
}

#[tokio::test]
async fn test_exhausted_retries_leave_counter_untouched() {
    let dir = common::temp_dir();
    let pool = open_store(&dir.path().join("data.db"), Duration::ZERO).await;
    let numbering = numbering(
        &pool,
        AllocationConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
    );
    assert_eq!(numbering.allocate("support").await.unwrap(), 1);

    // Another writer holds the database lock for the whole retry window.
    let mut blocker = pool.acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await.unwrap();

    let err = numbering.allocate("support").await.unwrap_err();
    assert!(
        matches!(err, SequenceError::ContentionExhausted { attempts: 3, .. }),
        "unexpected error: {err:?}"
    );
    assert!(err.is_retryable());

    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);

    assert_eq!(numbering.current("support").await.unwrap(), 1);
    assert_eq!(numbering.allocate("support").await.unwrap(), 2);
}

#[tokio::test]
async fn test_counter_survives_reopening_the_store() {
    let dir = common::temp_dir();
    let path = dir.path().join("data.db");

    let pool = open_store(&path, Duration::from_secs(5)).await;
    let first = numbering(&pool, AllocationConfig::default());
    for _ in 0..3 {
        first.allocate("appeal").await.unwrap();
    }
    pool.close().await;

    let reopened = open_store(&path, Duration::from_secs(5)).await;
    let second = numbering(&reopened, AllocationConfig::default());
    assert_eq!(second.allocate("appeal").await.unwrap(), 4);
}
