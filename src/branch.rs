//! Branch registry: named pointers into a connection's history. The
//! default branch is protected and can be neither deleted nor renamed.

use crate::error::SqlvcError;
use crate::state::{Branch, RepositoryState};

pub(crate) fn create_branch(
    state: &mut RepositoryState,
    name: &str,
) -> Result<Branch, SqlvcError> {
    if name.trim().is_empty() {
        return Err(SqlvcError::Validation("branch name must not be empty".into()));
    }
    if state.branches.contains_key(name) {
        return Err(SqlvcError::DuplicateBranch { name: name.into() });
    }
    let head = state.current()?.head;
    let branch = Branch {
        name: name.to_string(),
        head,
        protected: false,
    };
    state.branches.insert(name.to_string(), branch.clone());
    Ok(branch)
}

/// Moves the current-branch pointer. Never touches commits.
pub(crate) fn checkout(state: &mut RepositoryState, name: &str) -> Result<Branch, SqlvcError> {
    let branch = state
        .branch(name)
        .cloned()
        .ok_or_else(|| SqlvcError::BranchNotFound { name: name.into() })?;
    state.current_branch = branch.name.clone();
    Ok(branch)
}

pub(crate) fn delete_branch(state: &mut RepositoryState, name: &str) -> Result<(), SqlvcError> {
    let branch = state
        .branch(name)
        .ok_or_else(|| SqlvcError::BranchNotFound { name: name.into() })?;
    if branch.protected {
        return Err(SqlvcError::ProtectedBranch {
            name: name.into(),
            action: "deleted",
        });
    }
    if state.current_branch == name {
        return Err(SqlvcError::Validation(format!(
            "cannot delete the checked-out branch '{name}'"
        )));
    }
    state.branches.remove(name);
    Ok(())
}

pub(crate) fn rename_branch(
    state: &mut RepositoryState,
    name: &str,
    new_name: &str,
) -> Result<Branch, SqlvcError> {
    if new_name.trim().is_empty() {
        return Err(SqlvcError::Validation("branch name must not be empty".into()));
    }
    let branch = state
        .branch(name)
        .ok_or_else(|| SqlvcError::BranchNotFound { name: name.into() })?;
    if branch.protected {
        return Err(SqlvcError::ProtectedBranch {
            name: name.into(),
            action: "renamed",
        });
    }
    if state.branches.contains_key(new_name) {
        return Err(SqlvcError::DuplicateBranch {
            name: new_name.into(),
        });
    }
    let Some(mut branch) = state.branches.remove(name) else {
        return Err(SqlvcError::BranchNotFound { name: name.into() });
    };
    branch.name = new_name.to_string();
    state.branches.insert(new_name.to_string(), branch.clone());
    if state.current_branch == name {
        state.current_branch = new_name.to_string();
    }
    Ok(branch)
}
