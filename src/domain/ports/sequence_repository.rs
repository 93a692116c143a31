//! Repository port for per-category sequence counters.

use async_trait::async_trait;

use crate::domain::errors::SequenceError;

#[async_trait]
pub trait SequenceRepository: Send + Sync {
    /// One allocation attempt in its own transaction.
    ///
    /// Returns the newly issued value, or [`SequenceError::Contention`] when
    /// a concurrent writer won and this attempt changed nothing.
    async fn try_allocate(&self, category: &str) -> Result<i64, SequenceError>;

    /// Last issued value for `category`, `0` if none was issued yet.
    async fn current(&self, category: &str) -> Result<i64, SequenceError>;
}
