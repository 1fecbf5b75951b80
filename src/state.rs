use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::change::DatabaseChange;
use crate::error::SqlvcError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    /// Id of the head commit, `None` while the branch has no commits.
    pub head: Option<Uuid>,
    pub protected: bool,
}

/// An immutable, timestamped group of changes appended to history.
///
/// The only mutation permitted after creation is flipping a contained
/// change's status to `Reverted` when a later commit undoes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: Uuid,
    pub connection_id: String,
    pub message: String,
    pub author: Author,
    pub changes: Vec<DatabaseChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
    pub branch_name: String,
    /// Parent commit on the same history line; `None` for a root commit.
    pub parent_id: Option<Uuid>,
    pub checksum_hex: String,
    pub timestamp_micros: u64,
}

impl Commit {
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

pub(crate) fn commit_checksum(
    message: &str,
    parent_id: Option<Uuid>,
    changes: &[DatabaseChange],
) -> Result<String, SqlvcError> {
    let bytes = serde_json::to_vec(&(message, parent_id, changes))
        .map_err(|e| SqlvcError::Encode(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Per-connection repository state: the pending changeset, the full commit
/// log (newest first), and the branch map. Branches are independent linear
/// histories sharing a common prefix; a branch's history is the walk from
/// its head through parent links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryState {
    pub connection_id: String,
    pub pending: Vec<DatabaseChange>,
    pub commits: Vec<Commit>,
    pub branches: BTreeMap<String, Branch>,
    pub current_branch: String,
}

impl RepositoryState {
    pub fn new(connection_id: impl Into<String>, default_branch: impl Into<String>) -> Self {
        let default_branch = default_branch.into();
        let mut branches = BTreeMap::new();
        branches.insert(
            default_branch.clone(),
            Branch {
                name: default_branch.clone(),
                head: None,
                protected: true,
            },
        );
        Self {
            connection_id: connection_id.into(),
            pending: Vec::new(),
            commits: Vec::new(),
            branches,
            current_branch: default_branch,
        }
    }

    pub fn branch(&self, name: &str) -> Option<&Branch> {
        self.branches.get(name)
    }

    pub fn current(&self) -> Result<&Branch, SqlvcError> {
        self.branches
            .get(&self.current_branch)
            .ok_or_else(|| SqlvcError::BranchNotFound {
                name: self.current_branch.clone(),
            })
    }

    pub fn find_commit(&self, id: Uuid) -> Option<&Commit> {
        self.commits.iter().find(|c| c.id == id)
    }

    pub(crate) fn find_commit_mut(&mut self, id: Uuid) -> Option<&mut Commit> {
        self.commits.iter_mut().find(|c| c.id == id)
    }

    /// Walks a branch's history from head through parent links, newest
    /// first. A dangling parent reference ends the walk.
    pub fn branch_chain(&self, name: &str) -> Vec<&Commit> {
        let mut chain = Vec::new();
        let mut cursor = self.branch(name).and_then(|b| b.head);
        while let Some(id) = cursor {
            let Some(commit) = self.find_commit(id) else {
                break;
            };
            cursor = commit.parent_id;
            chain.push(commit);
        }
        chain
    }

    pub fn current_chain(&self) -> Vec<&Commit> {
        self.branch_chain(&self.current_branch)
    }

    pub fn head_commit(&self) -> Option<&Commit> {
        self.branch(&self.current_branch)
            .and_then(|b| b.head)
            .and_then(|id| self.find_commit(id))
    }

    /// Prepends the commit to the log and advances its branch's head.
    pub(crate) fn record_commit(&mut self, commit: Commit) {
        if let Some(branch) = self.branches.get_mut(&commit.branch_name) {
            branch.head = Some(commit.id);
        }
        self.commits.insert(0, commit);
    }
}
