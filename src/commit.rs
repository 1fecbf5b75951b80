//! Commit construction: moves a chosen subset of the pending changeset
//! into a new immutable commit. Validation happens before any state is
//! touched, so a failed commit leaves pending and history byte-identical.

use uuid::Uuid;

use crate::change::{DatabaseChange, now_micros};
use crate::error::SqlvcError;
use crate::state::{Author, Commit, RepositoryState, commit_checksum};

pub(crate) fn create_commit(
    state: &mut RepositoryState,
    message: &str,
    author: Author,
    selection: Option<&[Uuid]>,
    snapshot: Option<serde_json::Value>,
) -> Result<Commit, SqlvcError> {
    if message.trim().is_empty() {
        return Err(SqlvcError::CommitValidation(
            "commit message must not be empty".into(),
        ));
    }
    let selected = select_changes(&state.pending, selection)?;
    if selected.is_empty() {
        return Err(SqlvcError::CommitValidation(
            "commit requires at least one change".into(),
        ));
    }
    let branch = state.current()?;
    let parent_id = branch.head;
    let branch_name = branch.name.clone();

    let commit = Commit {
        id: Uuid::new_v4(),
        connection_id: state.connection_id.clone(),
        message: message.to_string(),
        author,
        checksum_hex: commit_checksum(message, parent_id, &selected)?,
        changes: selected,
        snapshot,
        branch_name,
        parent_id,
        timestamp_micros: now_micros(),
    };

    // Validation is complete; mutate in one pass.
    let committed: std::collections::HashSet<Uuid> =
        commit.changes.iter().map(|c| c.id).collect();
    state.pending.retain(|c| !committed.contains(&c.id));
    state.record_commit(commit.clone());
    Ok(commit)
}

/// Resolves the caller's selection against the pending list, preserving
/// insertion order. `None` selects the full pending set.
fn select_changes(
    pending: &[DatabaseChange],
    selection: Option<&[Uuid]>,
) -> Result<Vec<DatabaseChange>, SqlvcError> {
    let Some(ids) = selection else {
        return Ok(pending.to_vec());
    };
    let requested: std::collections::HashSet<Uuid> = ids.iter().copied().collect();
    let selected: Vec<DatabaseChange> = pending
        .iter()
        .filter(|c| requested.contains(&c.id))
        .cloned()
        .collect();
    if selected.len() != requested.len() {
        let missing = ids
            .iter()
            .find(|id| !pending.iter().any(|c| c.id == **id))
            .copied()
            .unwrap_or_default();
        return Err(SqlvcError::CommitValidation(format!(
            "selected change {missing} is not in the pending changeset"
        )));
    }
    Ok(selected)
}
