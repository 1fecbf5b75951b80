use thiserror::Error;

use crate::change::ChangeOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlvcErrorCode {
    Io,
    Encode,
    Decode,
    Validation,
    InvalidConfig,
    DuplicateBranch,
    BranchNotFound,
    ProtectedBranch,
    CommitNotFound,
    CommitValidation,
    PendingLimitExceeded,
    ManualInterventionRequired,
    ExecutionFailure,
    InsufficientHistory,
    RevisionNotFound,
    UnreachableRevision,
}

impl SqlvcErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SqlvcErrorCode::Io => "io",
            SqlvcErrorCode::Encode => "encode",
            SqlvcErrorCode::Decode => "decode",
            SqlvcErrorCode::Validation => "validation",
            SqlvcErrorCode::InvalidConfig => "invalid_config",
            SqlvcErrorCode::DuplicateBranch => "duplicate_branch",
            SqlvcErrorCode::BranchNotFound => "branch_not_found",
            SqlvcErrorCode::ProtectedBranch => "protected_branch",
            SqlvcErrorCode::CommitNotFound => "commit_not_found",
            SqlvcErrorCode::CommitValidation => "commit_validation",
            SqlvcErrorCode::PendingLimitExceeded => "pending_limit_exceeded",
            SqlvcErrorCode::ManualInterventionRequired => "manual_intervention_required",
            SqlvcErrorCode::ExecutionFailure => "execution_failure",
            SqlvcErrorCode::InsufficientHistory => "insufficient_history",
            SqlvcErrorCode::RevisionNotFound => "revision_not_found",
            SqlvcErrorCode::UnreachableRevision => "unreachable_revision",
        }
    }
}

/// One change that blocks an automatic revert because its rollback is MANUAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingChange {
    pub change_id: uuid::Uuid,
    pub operation: ChangeOperation,
    pub target: String,
}

impl std::fmt::Display for BlockingChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.operation.keyword(), self.target)
    }
}

#[derive(Debug, Error)]
pub enum SqlvcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("branch '{name}' already exists")]
    DuplicateBranch { name: String },
    #[error("branch '{name}' not found")]
    BranchNotFound { name: String },
    #[error("branch '{name}' is protected and cannot be {action}")]
    ProtectedBranch { name: String, action: &'static str },
    #[error("commit '{commit_id}' not found")]
    CommitNotFound { commit_id: String },
    #[error("commit validation failed: {0}")]
    CommitValidation(String),
    #[error("pending changeset limit of {limit} reached for connection '{connection_id}'")]
    PendingLimitExceeded { connection_id: String, limit: usize },
    #[error(
        "revert blocked: {} changes require manual rollback: {}",
        blocking.len(),
        format_blocking(blocking)
    )]
    ManualInterventionRequired { blocking: Vec<BlockingChange> },
    #[error("execution failed after {executed} statements, aborting at '{statement}': {reason}")]
    ExecutionFailure {
        statement: String,
        executed: usize,
        reason: String,
    },
    #[error("insufficient history: diff requires at least two commits, found {commits}")]
    InsufficientHistory { commits: usize },
    #[error("revision {revision} not found (history depth {depth})")]
    RevisionNotFound { revision: i64, depth: usize },
    #[error("revision target '{target}' is not reachable from the current branch head")]
    UnreachableRevision { target: String },
}

fn format_blocking(blocking: &[BlockingChange]) -> String {
    blocking
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl SqlvcError {
    pub fn code(&self) -> SqlvcErrorCode {
        match self {
            SqlvcError::Io(_) => SqlvcErrorCode::Io,
            SqlvcError::Encode(_) => SqlvcErrorCode::Encode,
            SqlvcError::Decode(_) => SqlvcErrorCode::Decode,
            SqlvcError::Validation(_) => SqlvcErrorCode::Validation,
            SqlvcError::InvalidConfig { .. } => SqlvcErrorCode::InvalidConfig,
            SqlvcError::DuplicateBranch { .. } => SqlvcErrorCode::DuplicateBranch,
            SqlvcError::BranchNotFound { .. } => SqlvcErrorCode::BranchNotFound,
            SqlvcError::ProtectedBranch { .. } => SqlvcErrorCode::ProtectedBranch,
            SqlvcError::CommitNotFound { .. } => SqlvcErrorCode::CommitNotFound,
            SqlvcError::CommitValidation(_) => SqlvcErrorCode::CommitValidation,
            SqlvcError::PendingLimitExceeded { .. } => SqlvcErrorCode::PendingLimitExceeded,
            SqlvcError::ManualInterventionRequired { .. } => {
                SqlvcErrorCode::ManualInterventionRequired
            }
            SqlvcError::ExecutionFailure { .. } => SqlvcErrorCode::ExecutionFailure,
            SqlvcError::InsufficientHistory { .. } => SqlvcErrorCode::InsufficientHistory,
            SqlvcError::RevisionNotFound { .. } => SqlvcErrorCode::RevisionNotFound,
            SqlvcError::UnreachableRevision { .. } => SqlvcErrorCode::UnreachableRevision,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
