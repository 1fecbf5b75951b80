//! Execution seam for rollback statements. The crate never opens a
//! database connection itself; callers supply an executor bound to
//! whatever engine they are fronting.

use async_trait::async_trait;

/// Result of executing one statement against the target database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub affected_rows: Option<u64>,
}

/// Failure reported by the backing database for one statement.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExecutorFailure {
    pub message: String,
}

impl ExecutorFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Executes a single statement on the connection's session.
    async fn execute(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<ExecutionOutcome, ExecutorFailure>;
}
