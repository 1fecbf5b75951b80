//! Revision addressing on the current branch. Revision 0 is the head
//! commit; negative values walk back along parent links, so -1 is the
//! head's parent and -k is k commits behind head.

use uuid::Uuid;

use crate::error::SqlvcError;
use crate::state::{Commit, RepositoryState};

pub(crate) fn resolve(state: &RepositoryState, revision: i64) -> Result<&Commit, SqlvcError> {
    let chain = state.current_chain();
    let depth = chain.len();
    if revision > 0 {
        return Err(SqlvcError::RevisionNotFound { revision, depth });
    }
    chain
        .get(revision.unsigned_abs() as usize)
        .copied()
        .ok_or(SqlvcError::RevisionNotFound { revision, depth })
}

/// Commits on the current branch strictly after `target`, newest first.
/// These are the commits a rollback to `target` must undo.
pub(crate) fn commits_after(state: &RepositoryState, target: Uuid) -> Vec<&Commit> {
    let chain = state.current_chain();
    match chain.iter().position(|c| c.id == target) {
        Some(pos) => chain[..pos].to_vec(),
        None => Vec::new(),
    }
}
