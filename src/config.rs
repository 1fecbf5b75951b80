use crate::error::SqlvcError;

/// Runtime configuration for a sqlvc instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlvcConfig {
    /// Name of the protected branch created automatically per connection.
    pub default_branch: String,
    /// Upper bound on staged-but-uncommitted changes per connection.
    /// `0` disables the limit.
    pub max_pending_changes: usize,
}

impl Default for SqlvcConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            max_pending_changes: 10_000,
        }
    }
}

impl SqlvcConfig {
    /// Profile for interactive sessions: no staging limit.
    pub fn unbounded() -> Self {
        Self {
            max_pending_changes: 0,
            ..Self::default()
        }
    }

    pub fn with_default_branch(mut self, name: impl Into<String>) -> Self {
        self.default_branch = name.into();
        self
    }

    pub fn with_max_pending_changes(mut self, limit: usize) -> Self {
        self.max_pending_changes = limit;
        self
    }

    pub fn validate(&self) -> Result<(), SqlvcError> {
        if self.default_branch.trim().is_empty() {
            return Err(SqlvcError::InvalidConfig {
                message: "default_branch must not be empty".into(),
            });
        }
        Ok(())
    }
}
