use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exact sentinel recorded when no safe automatic inverse exists.
pub const MANUAL_SENTINEL: &str = "MANUAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Schema,
    Data,
    Acl,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOperation {
    Create,
    Alter,
    Drop,
    Rename,
    Truncate,
    Insert,
    Update,
    Delete,
    Grant,
    Revoke,
}

impl ChangeOperation {
    pub fn keyword(self) -> &'static str {
        match self {
            ChangeOperation::Create => "CREATE",
            ChangeOperation::Alter => "ALTER",
            ChangeOperation::Drop => "DROP",
            ChangeOperation::Rename => "RENAME",
            ChangeOperation::Truncate => "TRUNCATE",
            ChangeOperation::Insert => "INSERT",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
            ChangeOperation::Grant => "GRANT",
            ChangeOperation::Revoke => "REVOKE",
        }
    }

    /// The operation an executed inverse statement performs.
    pub fn inverse(self) -> Self {
        match self {
            ChangeOperation::Create => ChangeOperation::Drop,
            ChangeOperation::Drop => ChangeOperation::Create,
            ChangeOperation::Insert => ChangeOperation::Delete,
            ChangeOperation::Delete => ChangeOperation::Insert,
            ChangeOperation::Grant => ChangeOperation::Revoke,
            ChangeOperation::Revoke => ChangeOperation::Grant,
            ChangeOperation::Alter => ChangeOperation::Alter,
            ChangeOperation::Rename => ChangeOperation::Rename,
            ChangeOperation::Truncate => ChangeOperation::Truncate,
            ChangeOperation::Update => ChangeOperation::Update,
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    Applied,
    Reverted,
}

/// Synthesized inverse of a forward statement.
///
/// Serialized as the raw statement text, or the literal string `MANUAL`
/// when no safe inverse could be synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RollbackSql {
    Sql(String),
    Manual,
}

impl RollbackSql {
    pub fn is_manual(&self) -> bool {
        matches!(self, RollbackSql::Manual)
    }

    pub fn as_sql(&self) -> Option<&str> {
        match self {
            RollbackSql::Sql(sql) => Some(sql),
            RollbackSql::Manual => None,
        }
    }
}

impl From<String> for RollbackSql {
    fn from(value: String) -> Self {
        if value == MANUAL_SENTINEL {
            RollbackSql::Manual
        } else {
            RollbackSql::Sql(value)
        }
    }
}

impl From<RollbackSql> for String {
    fn from(value: RollbackSql) -> Self {
        match value {
            RollbackSql::Sql(sql) => sql,
            RollbackSql::Manual => MANUAL_SENTINEL.to_string(),
        }
    }
}

impl std::fmt::Display for RollbackSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackSql::Sql(sql) => f.write_str(sql),
            RollbackSql::Manual => f.write_str(MANUAL_SENTINEL),
        }
    }
}

/// Row values keyed by column name. BTreeMap keeps rendering deterministic.
pub type RowValues = BTreeMap<String, serde_json::Value>;

/// Before-state captured externally (e.g. by a statement interceptor) and
/// consumed by the rollback synthesizer. The synthesizer never invents
/// values that are absent here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    /// Full definition statement of an object about to be dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_definition: Option<String>,
    /// Column definition (name + type + constraints) of a dropped column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_definition: Option<String>,
    /// Prior DEFAULT expression of a column whose default is being changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_default: Option<String>,
    /// Prior owner of an object whose ownership is being transferred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_owner: Option<String>,
    /// Primary key of an inserted row, for DELETE-by-key inversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<RowValues>,
    /// Rows removed by a DELETE, for re-insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<RowValues>>,
    /// Pre-update images of rows touched by an UPDATE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_rows: Option<Vec<RowValues>>,
    /// Column names forming the primary key of `old_rows`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_fields: Option<Vec<String>>,
}

impl ChangeMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One classified mutation: forward SQL plus its synthesized inverse.
///
/// Immutable once committed, except for `status`, which flips to
/// `Reverted` when a later commit undoes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseChange {
    pub id: Uuid,
    pub change_type: ChangeType,
    pub operation: ChangeOperation,
    pub target: String,
    pub description: String,
    pub query: String,
    pub rollback_sql: RollbackSql,
    pub status: ChangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChangeMetadata>,
    pub timestamp_micros: u64,
}

impl DatabaseChange {
    pub fn requires_manual_rollback(&self) -> bool {
        self.rollback_sql.is_manual()
    }
}

pub(crate) fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
