//! Version control for database mutations. Statements executed against a
//! connection are classified, paired with a synthesized inverse, staged in
//! a pending changeset, and grouped into commits on branchable linear
//! histories that can be diffed, reverted, and rolled back.

pub mod branch;
pub mod change;
pub mod classify;
pub mod commit;
pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod revert;
pub mod revision;
pub mod state;
pub mod store;
pub mod synthesize;

pub(crate) mod sqltext;

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

pub use crate::change::{
    ChangeMetadata, ChangeOperation, ChangeStatus, ChangeType, DatabaseChange, MANUAL_SENTINEL,
    RollbackSql, RowValues,
};
pub use crate::classify::classify;
pub use crate::config::SqlvcConfig;
pub use crate::diff::{DiffReport, DiffSide};
pub use crate::error::{BlockingChange, SqlvcError, SqlvcErrorCode};
pub use crate::executor::{ExecutionOutcome, ExecutorFailure, SqlExecutor};
pub use crate::revert::{PlannedInverse, RevertOutcome, RollbackOutcome};
pub use crate::state::{Author, Branch, Commit, RepositoryState};
pub use crate::store::{JsonFileStore, MemoryStateStore, StateStore};
pub use crate::synthesize::synthesize;

/// Entry point: tracks changes per connection against a `StateStore` and
/// executes inverses through the caller-supplied `SqlExecutor`.
///
/// Repository state is loaded per call and written back only after a
/// mutation fully succeeds, so a failed operation leaves the stored
/// state untouched.
pub struct SqlvcInstance {
    config: SqlvcConfig,
    store: Arc<dyn StateStore>,
    executor: Arc<dyn SqlExecutor>,
}

impl SqlvcInstance {
    pub fn new(
        config: SqlvcConfig,
        store: Arc<dyn StateStore>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Result<Self, SqlvcError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            executor,
        })
    }

    pub fn config(&self) -> &SqlvcConfig {
        &self.config
    }

    async fn load_or_init(&self, connection_id: &str) -> Result<RepositoryState, SqlvcError> {
        match self.store.load(connection_id).await? {
            Some(state) => Ok(state),
            None => Ok(RepositoryState::new(
                connection_id,
                self.config.default_branch.clone(),
            )),
        }
    }

    /// Classifies a forward statement and stages the resulting change.
    /// Returns `None` for statements outside the tracked taxonomy
    /// (reads, transaction control); nothing is stored for those.
    pub async fn track(
        &self,
        connection_id: &str,
        query: &str,
        affected_rows_hint: Option<u64>,
        metadata: Option<&ChangeMetadata>,
    ) -> Result<Option<DatabaseChange>, SqlvcError> {
        let Some(change) = classify(query, affected_rows_hint, metadata) else {
            debug!(connection_id, "statement not tracked");
            return Ok(None);
        };
        self.stage(connection_id, change.clone()).await?;
        Ok(Some(change))
    }

    /// Appends an already-classified change to the pending changeset.
    pub async fn stage(
        &self,
        connection_id: &str,
        change: DatabaseChange,
    ) -> Result<(), SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let limit = self.config.max_pending_changes;
        if limit > 0 && state.pending.len() >= limit {
            return Err(SqlvcError::PendingLimitExceeded {
                connection_id: connection_id.to_string(),
                limit,
            });
        }
        debug!(
            connection_id,
            operation = %change.operation,
            target = %change.target,
            manual = change.requires_manual_rollback(),
            "change staged"
        );
        state.pending.push(change);
        self.store.save(&state).await
    }

    pub async fn pending(&self, connection_id: &str) -> Result<Vec<DatabaseChange>, SqlvcError> {
        Ok(self.load_or_init(connection_id).await?.pending)
    }

    /// Commits pending changes to the current branch. `selection` limits
    /// the commit to the named change ids; `None` commits everything.
    pub async fn commit(
        &self,
        connection_id: &str,
        message: &str,
        author: Author,
        selection: Option<&[Uuid]>,
        snapshot: Option<serde_json::Value>,
    ) -> Result<Commit, SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let commit = commit::create_commit(&mut state, message, author, selection, snapshot)?;
        self.store.save(&state).await?;
        info!(
            connection_id,
            commit = %commit.short_id(),
            branch = %commit.branch_name,
            changes = commit.changes.len(),
            "committed"
        );
        Ok(commit)
    }

    /// History of the current branch, newest first.
    pub async fn history(&self, connection_id: &str) -> Result<Vec<Commit>, SqlvcError> {
        let state = self.load_or_init(connection_id).await?;
        Ok(state.current_chain().into_iter().cloned().collect())
    }

    pub async fn find_commit(
        &self,
        connection_id: &str,
        commit_id: Uuid,
    ) -> Result<Commit, SqlvcError> {
        let state = self.load_or_init(connection_id).await?;
        state
            .find_commit(commit_id)
            .cloned()
            .ok_or_else(|| SqlvcError::CommitNotFound {
                commit_id: commit_id.to_string(),
            })
    }

    /// Creates a branch pointing at the current head and leaves the
    /// current branch checked out.
    pub async fn create_branch(
        &self,
        connection_id: &str,
        name: &str,
    ) -> Result<Branch, SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let branch = branch::create_branch(&mut state, name)?;
        self.store.save(&state).await?;
        info!(connection_id, branch = %branch.name, "branch created");
        Ok(branch)
    }

    pub async fn checkout(&self, connection_id: &str, name: &str) -> Result<Branch, SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let branch = branch::checkout(&mut state, name)?;
        self.store.save(&state).await?;
        Ok(branch)
    }

    pub async fn delete_branch(&self, connection_id: &str, name: &str) -> Result<(), SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        branch::delete_branch(&mut state, name)?;
        self.store.save(&state).await
    }

    pub async fn rename_branch(
        &self,
        connection_id: &str,
        name: &str,
        new_name: &str,
    ) -> Result<Branch, SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let branch = branch::rename_branch(&mut state, name, new_name)?;
        self.store.save(&state).await?;
        Ok(branch)
    }

    pub async fn current_branch(&self, connection_id: &str) -> Result<Branch, SqlvcError> {
        let state = self.load_or_init(connection_id).await?;
        Ok(state.current()?.clone())
    }

    pub async fn branches(&self, connection_id: &str) -> Result<Vec<Branch>, SqlvcError> {
        let state = self.load_or_init(connection_id).await?;
        Ok(state.branches.values().cloned().collect())
    }

    /// Resolves a revision on the current branch: 0 is head, -k is k
    /// commits behind head.
    pub async fn resolve_revision(
        &self,
        connection_id: &str,
        revision: i64,
    ) -> Result<Commit, SqlvcError> {
        let state = self.load_or_init(connection_id).await?;
        Ok(revision::resolve(&state, revision)?.clone())
    }

    /// Undoes one commit by executing the inverse of each of its applied
    /// changes, newest first, and records the inverses as a new commit.
    pub async fn revert_commit(
        &self,
        connection_id: &str,
        commit_id: Uuid,
        author: Author,
    ) -> Result<RevertOutcome, SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let outcome =
            revert::revert_commit(&mut state, self.executor.as_ref(), commit_id, author).await?;
        self.store.save(&state).await?;
        Ok(outcome)
    }

    /// Rolls the database back to a prior revision of the current branch
    /// by undoing every commit made after it.
    pub async fn rollback_to_revision(
        &self,
        connection_id: &str,
        revision: i64,
        author: Author,
    ) -> Result<RollbackOutcome, SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let outcome =
            revert::rollback_to_revision(&mut state, self.executor.as_ref(), revision, author)
                .await?;
        self.store.save(&state).await?;
        Ok(outcome)
    }

    /// Rolls back to an explicit commit, which must be an ancestor of the
    /// current branch head.
    pub async fn rollback_to_commit(
        &self,
        connection_id: &str,
        commit_id: Uuid,
        author: Author,
    ) -> Result<RollbackOutcome, SqlvcError> {
        let mut state = self.load_or_init(connection_id).await?;
        let outcome =
            revert::rollback_to_commit(&mut state, self.executor.as_ref(), commit_id, author)
                .await?;
        self.store.save(&state).await?;
        Ok(outcome)
    }

    /// Compares two revisions of the current branch.
    pub async fn diff(
        &self,
        connection_id: &str,
        from_revision: i64,
        to_revision: i64,
    ) -> Result<DiffReport, SqlvcError> {
        let state = self.load_or_init(connection_id).await?;
        diff::diff(&state, from_revision, to_revision)
    }
}
