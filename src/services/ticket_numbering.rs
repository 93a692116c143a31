//! Retrying allocator for per-category ticket numbers.
//!
//! A single attempt is delegated to the [`SequenceRepository`]; lost races
//! are retried with exponential backoff and jitter up to a bounded number of
//! attempts, after which the caller gets `ContentionExhausted`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::future::retry_notify;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use crate::domain::errors::SequenceError;
use crate::domain::models::AllocationConfig;
use crate::domain::ports::SequenceRepository;

pub struct TicketNumbering {
    repo: Arc<dyn SequenceRepository>,
    policy: AllocationConfig,
}

impl TicketNumbering {
    pub fn new(repo: Arc<dyn SequenceRepository>, policy: AllocationConfig) -> Self {
        Self { repo, policy }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.policy.initial_backoff_ms))
            .with_multiplier(2.0)
            .with_randomization_factor(0.5)
            .with_max_interval(Duration::from_millis(self.policy.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build()
    }

    /// Issue the next number for `category`.
    pub async fn allocate(&self, category: &str) -> Result<i64, SequenceError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let attempts = AtomicU32::new(0);
        let repo = &self.repo;
        let attempts_ref = &attempts;

        let result = retry_notify(
            self.backoff(),
            move || async move {
                let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
                match repo.try_allocate(category).await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_retryable() && attempt < max_attempts => {
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            },
            |err: SequenceError, delay: Duration| {
                tracing::debug!(
                    category,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "ticket number allocation contended, retrying"
                );
            },
        )
        .await;

        match result {
            Ok(value) => {
                tracing::debug!(category, value, attempts = attempts.load(Ordering::SeqCst), "allocated ticket number");
                Ok(value)
            }
            Err(SequenceError::Contention { .. }) => {
                let attempts = attempts.load(Ordering::SeqCst);
                tracing::warn!(category, attempts, "ticket number allocation still contended, giving up");
                Err(SequenceError::ContentionExhausted {
                    category: category.to_string(),
                    attempts,
                })
            }
            Err(err) => Err(err),
        }
    }

    pub async fn current(&self, category: &str) -> Result<i64, SequenceError> {
        self.repo.current(category).await
    }
}
