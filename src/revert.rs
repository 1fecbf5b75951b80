//! Revert and rollback execution. Every inverse in a plan is validated
//! before any statement runs, so a plan containing a MANUAL change fails
//! up front with nothing executed. Once execution starts, a database
//! failure aborts the run and already-executed statements stay applied.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::change::{
    ChangeOperation, ChangeStatus, ChangeType, DatabaseChange, RollbackSql, now_micros,
};
use crate::error::{BlockingChange, SqlvcError};
use crate::executor::SqlExecutor;
use crate::revision;
use crate::state::{Author, Commit, RepositoryState, commit_checksum};

/// One validated inverse, ready to execute.
#[derive(Debug, Clone)]
pub struct PlannedInverse {
    pub source_commit: Uuid,
    pub change_id: Uuid,
    pub change_type: ChangeType,
    pub operation: ChangeOperation,
    pub target: String,
    pub table_name: Option<String>,
    pub description: String,
    pub forward_query: String,
    pub inverse_sql: String,
}

#[derive(Debug, Clone)]
pub struct RevertOutcome {
    pub commit: Commit,
    pub reverted_commits: Vec<Uuid>,
    pub executed_statements: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    /// The commit history was rolled back to; it is the head ancestor
    /// whose state the database now reflects.
    pub target: Commit,
    pub commit: Commit,
    pub executed_statements: Vec<String>,
}

pub(crate) async fn revert_commit(
    state: &mut RepositoryState,
    executor: &dyn SqlExecutor,
    commit_id: Uuid,
    author: Author,
) -> Result<RevertOutcome, SqlvcError> {
    let source = state
        .find_commit(commit_id)
        .cloned()
        .ok_or_else(|| SqlvcError::CommitNotFound {
            commit_id: commit_id.to_string(),
        })?;
    let planned = plan_inverses(std::slice::from_ref(&source))?;
    debug!(commit = %source.short_id(), inverses = planned.len(), "revert plan validated");

    let message = format!("Revert \"{}\"", source.message);
    let (commit, executed) =
        execute_and_record(state, executor, &planned, &message, author).await?;
    info!(
        commit = %commit.short_id(),
        reverted = %source.short_id(),
        statements = executed.len(),
        "commit reverted"
    );
    Ok(RevertOutcome {
        commit,
        reverted_commits: vec![source.id],
        executed_statements: executed,
    })
}

pub(crate) async fn rollback_to_revision(
    state: &mut RepositoryState,
    executor: &dyn SqlExecutor,
    revision: i64,
    author: Author,
) -> Result<RollbackOutcome, SqlvcError> {
    let target = revision::resolve(state, revision)?.clone();
    let message = format!("Rollback to revision {revision} ({})", target.short_id());
    rollback_past(state, executor, target, message, author).await
}

/// Rolls back to an explicit commit id. The target must be an ancestor
/// of the current branch head; commits on other branches are unreachable.
pub(crate) async fn rollback_to_commit(
    state: &mut RepositoryState,
    executor: &dyn SqlExecutor,
    commit_id: Uuid,
    author: Author,
) -> Result<RollbackOutcome, SqlvcError> {
    let chain = state.current_chain();
    let target = chain
        .iter()
        .find(|c| c.id == commit_id)
        .map(|c| (*c).clone())
        .ok_or_else(|| SqlvcError::UnreachableRevision {
            target: commit_id.to_string(),
        })?;
    let message = format!("Rollback to commit {}", target.short_id());
    rollback_past(state, executor, target, message, author).await
}

async fn rollback_past(
    state: &mut RepositoryState,
    executor: &dyn SqlExecutor,
    target: Commit,
    message: String,
    author: Author,
) -> Result<RollbackOutcome, SqlvcError> {
    let undone: Vec<Commit> = revision::commits_after(state, target.id)
        .into_iter()
        .cloned()
        .collect();
    if undone.is_empty() {
        return Err(SqlvcError::Validation("nothing to roll back".into()));
    }
    let planned = plan_inverses(&undone)?;
    debug!(
        target = %target.short_id(),
        commits = undone.len(),
        inverses = planned.len(),
        "rollback plan validated"
    );

    let (commit, executed) =
        execute_and_record(state, executor, &planned, &message, author).await?;
    info!(
        commit = %commit.short_id(),
        target = %target.short_id(),
        statements = executed.len(),
        "rolled back"
    );
    Ok(RollbackOutcome {
        target,
        commit,
        executed_statements: executed,
    })
}

/// Builds the execution plan for a set of commits, newest first. Changes
/// within a commit are undone in reverse application order. A single
/// MANUAL change anywhere in the set blocks the whole plan.
fn plan_inverses(commits: &[Commit]) -> Result<Vec<PlannedInverse>, SqlvcError> {
    let mut planned = Vec::new();
    let mut blocking = Vec::new();
    for commit in commits {
        for change in commit.changes.iter().rev() {
            if change.status == ChangeStatus::Reverted {
                continue;
            }
            match change.rollback_sql.as_sql() {
                Some(sql) => planned.push(PlannedInverse {
                    source_commit: commit.id,
                    change_id: change.id,
                    change_type: change.change_type,
                    operation: change.operation.inverse(),
                    target: change.target.clone(),
                    table_name: change.table_name.clone(),
                    description: change.description.clone(),
                    forward_query: change.query.clone(),
                    inverse_sql: sql.to_string(),
                }),
                None => blocking.push(BlockingChange {
                    change_id: change.id,
                    operation: change.operation,
                    target: change.target.clone(),
                }),
            }
        }
    }
    if !blocking.is_empty() {
        warn!(blocking = blocking.len(), "revert blocked by manual rollbacks");
        return Err(SqlvcError::ManualInterventionRequired { blocking });
    }
    if planned.is_empty() {
        return Err(SqlvcError::Validation(
            "no applied changes to revert".into(),
        ));
    }
    Ok(planned)
}

/// Runs every planned inverse in order, then mutates repository state in
/// one pass: source changes flip to `Reverted` and a new commit records
/// the inverses. A statement failure aborts before any state mutation.
async fn execute_and_record(
    state: &mut RepositoryState,
    executor: &dyn SqlExecutor,
    planned: &[PlannedInverse],
    message: &str,
    author: Author,
) -> Result<(Commit, Vec<String>), SqlvcError> {
    let mut executed = Vec::new();
    let mut changes = Vec::new();
    for inverse in planned {
        let mut affected: Option<u64> = None;
        for statement in split_statements(&inverse.inverse_sql) {
            let outcome = executor
                .execute(&state.connection_id, &statement)
                .await
                .map_err(|failure| SqlvcError::ExecutionFailure {
                    statement: statement.clone(),
                    executed: executed.len(),
                    reason: failure.message,
                })?;
            if let Some(rows) = outcome.affected_rows {
                *affected.get_or_insert(0) += rows;
            }
            executed.push(statement);
        }
        changes.push(DatabaseChange {
            id: Uuid::new_v4(),
            change_type: inverse.change_type,
            operation: inverse.operation,
            target: inverse.target.clone(),
            description: format!("Revert of {}", inverse.description),
            query: inverse.inverse_sql.clone(),
            // Undoing this change means re-running the original statement.
            rollback_sql: RollbackSql::Sql(inverse.forward_query.clone()),
            status: ChangeStatus::Applied,
            table_name: inverse.table_name.clone(),
            affected_rows: affected,
            metadata: None,
            timestamp_micros: now_micros(),
        });
    }

    for inverse in planned {
        if let Some(commit) = state.find_commit_mut(inverse.source_commit) {
            if let Some(change) = commit.changes.iter_mut().find(|c| c.id == inverse.change_id) {
                change.status = ChangeStatus::Reverted;
            }
        }
    }

    let branch = state.current()?;
    let parent_id = branch.head;
    let branch_name = branch.name.clone();
    let commit = Commit {
        id: Uuid::new_v4(),
        connection_id: state.connection_id.clone(),
        message: message.to_string(),
        author,
        checksum_hex: commit_checksum(message, parent_id, &changes)?,
        changes,
        snapshot: None,
        branch_name,
        parent_id,
        timestamp_micros: now_micros(),
    };
    state.record_commit(commit.clone());
    Ok((commit, executed))
}

/// Splits a synthesized inverse into individual statements on `;`
/// boundaries, ignoring separators inside quoted strings. Terminators
/// are preserved on each statement.
pub(crate) fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in sql.chars() {
        current.push(ch);
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                ';' => {
                    let statement = current.trim().to_string();
                    if !statement.is_empty() {
                        statements.push(statement);
                    }
                    current.clear();
                }
                _ => {}
            },
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        statements.push(tail);
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::{plan_inverses, split_statements};
    use crate::change::ChangeStatus;
    use crate::classify::classify;
    use crate::commit::create_commit;
    use crate::error::{SqlvcError, SqlvcErrorCode};
    use crate::state::{Author, Commit, RepositoryState};

    fn author() -> Author {
        Author {
            name: "dev".into(),
            email: "dev@example.com".into(),
            user_id: "u1".into(),
        }
    }

    fn commit_of(queries: &[&str]) -> Commit {
        let mut state = RepositoryState::new("conn-1", "main");
        for query in queries {
            state
                .pending
                .push(classify(query, None, None).expect("classify"));
        }
        create_commit(&mut state, "changes", author(), None, None).expect("commit")
    }

    #[test]
    fn split_preserves_terminators_and_quoted_semicolons() {
        let statements = split_statements(
            "INSERT INTO t (id, note) VALUES (1, 'a;b');\nINSERT INTO t (id, note) VALUES (2, 'c');",
        );
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO t (id, note) VALUES (1, 'a;b');");
        assert_eq!(statements[1], "INSERT INTO t (id, note) VALUES (2, 'c');");
    }

    #[test]
    fn plan_undoes_changes_in_reverse_order() {
        let commit = commit_of(&[
            "CREATE TABLE a (id INT)",
            "CREATE TABLE b (id INT)",
        ]);
        let planned = plan_inverses(std::slice::from_ref(&commit)).expect("plan");
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].target, "b", "last applied is undone first");
        assert_eq!(planned[1].target, "a");
        assert_eq!(planned[0].inverse_sql, "DROP TABLE IF EXISTS b;");
    }

    #[test]
    fn single_manual_change_blocks_the_whole_plan() {
        let commit = commit_of(&[
            "CREATE TABLE a (id INT)",
            "TRUNCATE TABLE logs",
            "DROP TABLE old_data",
        ]);
        let err = plan_inverses(std::slice::from_ref(&commit)).expect_err("manual must block");
        let SqlvcError::ManualInterventionRequired { blocking } = err else {
            panic!("expected manual intervention, got {err}");
        };
        assert_eq!(blocking.len(), 2, "every blocker is listed");
        assert_eq!(blocking[0].target, "old_data", "reverse order");
        assert_eq!(blocking[1].target, "logs");
    }

    #[test]
    fn already_reverted_changes_are_skipped() {
        let mut commit = commit_of(&["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
        commit.changes[0].status = ChangeStatus::Reverted;
        let planned = plan_inverses(std::slice::from_ref(&commit)).expect("plan");
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].target, "b");
    }

    #[test]
    fn fully_reverted_commit_has_nothing_to_plan() {
        let mut commit = commit_of(&["CREATE TABLE a (id INT)"]);
        commit.changes[0].status = ChangeStatus::Reverted;
        let err = plan_inverses(std::slice::from_ref(&commit)).expect_err("empty plan");
        assert_eq!(err.code(), SqlvcErrorCode::Validation);
    }
}
