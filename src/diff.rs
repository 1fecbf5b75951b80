//! Diffing two revisions on the current branch. A side's change list is
//! everything committed after that revision up to the branch head, so the
//! older side carries the changes the newer side no longer needs to replay.

use serde::{Deserialize, Serialize};

use crate::change::DatabaseChange;
use crate::error::SqlvcError;
use crate::revision;
use crate::state::{Commit, RepositoryState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSide {
    pub revision: i64,
    pub commit: Commit,
    /// Changes committed strictly after this revision, newest first.
    pub changes: Vec<DatabaseChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub from: DiffSide,
    pub to: DiffSide,
}

pub(crate) fn diff(
    state: &RepositoryState,
    from_revision: i64,
    to_revision: i64,
) -> Result<DiffReport, SqlvcError> {
    let commits = state.current_chain().len();
    if commits < 2 {
        return Err(SqlvcError::InsufficientHistory { commits });
    }
    Ok(DiffReport {
        from: side(state, from_revision)?,
        to: side(state, to_revision)?,
    })
}

fn side(state: &RepositoryState, rev: i64) -> Result<DiffSide, SqlvcError> {
    let commit = revision::resolve(state, rev)?.clone();
    let changes = revision::commits_after(state, commit.id)
        .iter()
        .flat_map(|c| c.changes.iter().cloned())
        .collect();
    Ok(DiffSide {
        revision: rev,
        commit,
        changes,
    })
}
