//! SQL change classification: turns a raw mutating statement into a
//! structured [`DatabaseChange`].
//!
//! Classification is an ordered cascade of statement-shape matchers, first
//! match wins. Non-mutating or unrecognized statements (SELECT, BEGIN,
//! EXPLAIN, ...) classify to `None` — that is not an error, the statement
//! is simply untracked. Multi-table statements report only the first
//! identifier as target.

use uuid::Uuid;

use crate::change::{
    ChangeMetadata, ChangeOperation, ChangeStatus, ChangeType, DatabaseChange, now_micros,
};
use crate::sqltext::{
    ObjectKind, Token, create_target, drop_target, ident_at, is_kw, kw_at, parse_alter_table,
    render_tokens, skip_if_exists, strip_comments, tokenize, AlterTableAction,
};
use crate::synthesize::synthesize;

struct StatementShape {
    change_type: ChangeType,
    operation: ChangeOperation,
    target: String,
    description: String,
    table_name: Option<String>,
    affected_rows: Option<u64>,
}

/// Classifies one executed statement. `affected_rows_hint` is the row count
/// reported by the executing driver, if known; `metadata` is externally
/// captured before-state forwarded to the rollback synthesizer.
pub fn classify(
    query: &str,
    affected_rows_hint: Option<u64>,
    metadata: Option<&ChangeMetadata>,
) -> Option<DatabaseChange> {
    let stripped = strip_comments(query);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return None;
    }
    let tokens = tokenize(trimmed);

    // Precedence cascade; ordering is load-bearing.
    let shape = match_database_ddl(&tokens)
        .or_else(|| match_index_like_create(&tokens))
        .or_else(|| match_table_ddl(&tokens))
        .or_else(|| match_materialized_view(&tokens))
        .or_else(|| match_routine_create(&tokens))
        .or_else(|| match_generic_drop(&tokens))
        .or_else(|| match_acl(&tokens))
        .or_else(|| match_comment_on(&tokens))
        .or_else(|| match_dml(&tokens, affected_rows_hint))
        .or_else(|| match_maintenance(&tokens))?;

    Some(DatabaseChange {
        id: Uuid::new_v4(),
        change_type: shape.change_type,
        operation: shape.operation,
        target: shape.target,
        description: shape.description,
        query: query.trim().to_string(),
        rollback_sql: synthesize(query, metadata),
        status: ChangeStatus::Applied,
        table_name: shape.table_name,
        affected_rows: shape.affected_rows,
        metadata: metadata.cloned(),
        timestamp_micros: now_micros(),
    })
}

fn ddl_shape(operation: ChangeOperation, kind: ObjectKind, name: String) -> StatementShape {
    let verb = match operation {
        ChangeOperation::Create => "Created",
        ChangeOperation::Drop => "Dropped",
        _ => "Changed",
    };
    let table_name = (kind == ObjectKind::Table).then(|| name.clone());
    StatementShape {
        change_type: if kind == ObjectKind::Role {
            ChangeType::Acl
        } else {
            ChangeType::Schema
        },
        operation,
        description: format!("{verb} {} {name}", kind.noun()),
        target: name,
        table_name,
        affected_rows: None,
    }
}

fn match_database_ddl(tokens: &[Token]) -> Option<StatementShape> {
    let (operation, (kind, name)) = if is_kw(tokens, 0, "CREATE") {
        (ChangeOperation::Create, create_target(tokens)?)
    } else if is_kw(tokens, 0, "DROP") {
        (ChangeOperation::Drop, drop_target(tokens)?)
    } else {
        return None;
    };
    matches!(kind, ObjectKind::Database | ObjectKind::Schema)
        .then(|| ddl_shape(operation, kind, name))
}

fn match_index_like_create(tokens: &[Token]) -> Option<StatementShape> {
    if !is_kw(tokens, 0, "CREATE") {
        return None;
    }
    let (kind, name) = create_target(tokens)?;
    matches!(
        kind,
        ObjectKind::Index | ObjectKind::Trigger | ObjectKind::Sequence
    )
    .then(|| ddl_shape(ChangeOperation::Create, kind, name))
}

fn match_table_ddl(tokens: &[Token]) -> Option<StatementShape> {
    match kw_at(tokens, 0).as_deref() {
        Some("CREATE") => {
            let (kind, name) = create_target(tokens)?;
            (kind == ObjectKind::Table).then(|| ddl_shape(ChangeOperation::Create, kind, name))
        }
        Some("DROP") => {
            let (kind, name) = drop_target(tokens)?;
            (kind == ObjectKind::Table).then(|| ddl_shape(ChangeOperation::Drop, kind, name))
        }
        Some("ALTER") => {
            let (table, action) = parse_alter_table(tokens)?;
            Some(alter_table_shape(table, &action))
        }
        Some("TRUNCATE") => {
            let i = if is_kw(tokens, 1, "TABLE") { 2 } else { 1 };
            let i = skip_if_exists(tokens, i);
            let (name, _) = ident_at(tokens, i)?;
            Some(StatementShape {
                change_type: ChangeType::Data,
                operation: ChangeOperation::Truncate,
                description: format!("Truncated table {name}"),
                table_name: Some(name.clone()),
                target: name,
                affected_rows: None,
            })
        }
        _ => None,
    }
}

fn alter_table_shape(table: String, action: &AlterTableAction) -> StatementShape {
    let (operation, description) = match action {
        AlterTableAction::RenameTable { new_name } => (
            ChangeOperation::Rename,
            format!("Renamed table {table} to {new_name}"),
        ),
        AlterTableAction::RenameColumn { column, new_name } => (
            ChangeOperation::Rename,
            format!("Renamed column {column} to {new_name} on {table}"),
        ),
        AlterTableAction::AddColumn { column, .. } => (
            ChangeOperation::Alter,
            format!("Added column {column} to {table}"),
        ),
        AlterTableAction::DropColumn { column } => (
            ChangeOperation::Alter,
            format!("Dropped column {column} from {table}"),
        ),
        AlterTableAction::AddConstraint { name } => (
            ChangeOperation::Alter,
            format!("Added constraint {name} to {table}"),
        ),
        AlterTableAction::DropConstraint { name } => (
            ChangeOperation::Alter,
            format!("Dropped constraint {name} from {table}"),
        ),
        AlterTableAction::SetDefault { column } | AlterTableAction::DropDefault { column } => (
            ChangeOperation::Alter,
            format!("Changed default for column {column} on {table}"),
        ),
        AlterTableAction::SetNotNull { column } | AlterTableAction::DropNotNull { column } => (
            ChangeOperation::Alter,
            format!("Changed nullability of column {column} on {table}"),
        ),
        AlterTableAction::ChangeOwner { new_owner } => (
            ChangeOperation::Alter,
            format!("Changed owner of table {table} to {new_owner}"),
        ),
        AlterTableAction::Other => (ChangeOperation::Alter, format!("Altered table {table}")),
    };
    StatementShape {
        change_type: ChangeType::Schema,
        operation,
        description,
        table_name: Some(table.clone()),
        target: table,
        affected_rows: None,
    }
}

fn match_materialized_view(tokens: &[Token]) -> Option<StatementShape> {
    if is_kw(tokens, 0, "REFRESH") && is_kw(tokens, 1, "MATERIALIZED") && is_kw(tokens, 2, "VIEW") {
        let i = if is_kw(tokens, 3, "CONCURRENTLY") { 4 } else { 3 };
        let (name, _) = ident_at(tokens, i)?;
        return Some(StatementShape {
            change_type: ChangeType::Schema,
            operation: ChangeOperation::Alter,
            description: format!("Refreshed materialized view {name}"),
            target: name,
            table_name: None,
            affected_rows: None,
        });
    }
    if is_kw(tokens, 0, "DROP") {
        let (kind, name) = drop_target(tokens)?;
        return (kind == ObjectKind::MaterializedView)
            .then(|| ddl_shape(ChangeOperation::Drop, kind, name));
    }
    None
}

fn match_routine_create(tokens: &[Token]) -> Option<StatementShape> {
    if !is_kw(tokens, 0, "CREATE") {
        return None;
    }
    let (kind, name) = create_target(tokens)?;
    matches!(
        kind,
        ObjectKind::Procedure
            | ObjectKind::Function
            | ObjectKind::View
            | ObjectKind::MaterializedView
            | ObjectKind::Role
    )
    .then(|| ddl_shape(ChangeOperation::Create, kind, name))
}

fn match_generic_drop(tokens: &[Token]) -> Option<StatementShape> {
    if !is_kw(tokens, 0, "DROP") {
        return None;
    }
    let (kind, name) = drop_target(tokens)?;
    Some(ddl_shape(ChangeOperation::Drop, kind, name))
}

/// Skips the optional object-kind keyword after `ON` (`ON TABLE orders`,
/// `ON ALL TABLES IN SCHEMA reporting`) so the target is the object name.
/// `end` is the index of the TO/FROM separator; a keyword-looking token is
/// only a kind prefix when an object name still fits before it.
fn acl_object_start(tokens: &[Token], i: usize, end: usize) -> usize {
    if is_kw(tokens, i, "ALL")
        && is_kw(tokens, i + 1, "TABLES")
        && is_kw(tokens, i + 2, "IN")
        && is_kw(tokens, i + 3, "SCHEMA")
        && i + 4 < end
    {
        return i + 4;
    }
    let is_kind = kw_at(tokens, i).is_some_and(|k| {
        matches!(
            k.as_str(),
            "TABLE" | "SEQUENCE" | "SCHEMA" | "DATABASE" | "FUNCTION" | "PROCEDURE"
        )
    });
    if is_kind && i + 1 < end {
        i + 1
    } else {
        i
    }
}

fn match_acl(tokens: &[Token]) -> Option<StatementShape> {
    let (operation, sep) = match kw_at(tokens, 0).as_deref() {
        Some("GRANT") => (ChangeOperation::Grant, "TO"),
        Some("REVOKE") => (ChangeOperation::Revoke, "FROM"),
        _ => return None,
    };
    // REVOKE GRANT OPTION FOR <privileges> revokes the grant option only;
    // the privilege list starts after the prefix.
    let priv_start = if operation == ChangeOperation::Revoke
        && is_kw(tokens, 1, "GRANT")
        && is_kw(tokens, 2, "OPTION")
        && is_kw(tokens, 3, "FOR")
    {
        4
    } else {
        1
    };
    let on_idx = (priv_start..tokens.len()).find(|&i| is_kw(tokens, i, "ON"))?;
    let sep_idx = (on_idx + 1..tokens.len()).find(|&i| is_kw(tokens, i, sep))?;
    let (target, _) = ident_at(tokens, acl_object_start(tokens, on_idx + 1, sep_idx))?;
    let privileges = render_tokens(&tokens[priv_start..on_idx]);
    let (grantee, _) = ident_at(tokens, sep_idx + 1)?;
    let verb = if operation == ChangeOperation::Grant {
        format!("Granted {privileges} on {target} to {grantee}")
    } else {
        format!("Revoked {privileges} on {target} from {grantee}")
    };
    Some(StatementShape {
        change_type: ChangeType::Acl,
        operation,
        description: verb,
        target,
        table_name: None,
        affected_rows: None,
    })
}

fn match_comment_on(tokens: &[Token]) -> Option<StatementShape> {
    if !is_kw(tokens, 0, "COMMENT") || !is_kw(tokens, 1, "ON") {
        return None;
    }
    let kind = kw_at(tokens, 2)?;
    let (name, _) = ident_at(tokens, 3)?;
    Some(StatementShape {
        change_type: ChangeType::Schema,
        operation: ChangeOperation::Alter,
        description: format!("Set comment on {} {name}", kind.to_lowercase()),
        target: name,
        table_name: None,
        affected_rows: None,
    })
}

fn rows_phrase(affected: Option<u64>) -> String {
    match affected {
        Some(1) => "1 row".to_string(),
        Some(n) => format!("{n} rows"),
        None => "rows".to_string(),
    }
}

fn match_dml(tokens: &[Token], affected: Option<u64>) -> Option<StatementShape> {
    let (operation, table, description) = match kw_at(tokens, 0).as_deref() {
        Some("INSERT") if is_kw(tokens, 1, "INTO") => {
            let (table, _) = ident_at(tokens, 2)?;
            let desc = format!("Inserted {} into {table}", rows_phrase(affected));
            (ChangeOperation::Insert, table, desc)
        }
        Some("MERGE") if is_kw(tokens, 1, "INTO") => {
            let (table, _) = ident_at(tokens, 2)?;
            let desc = format!("Merged {} into {table}", rows_phrase(affected));
            (ChangeOperation::Insert, table, desc)
        }
        Some("UPDATE") => {
            let i = if is_kw(tokens, 1, "ONLY") { 2 } else { 1 };
            let (table, _) = ident_at(tokens, i)?;
            let desc = format!("Updated {} in {table}", rows_phrase(affected));
            (ChangeOperation::Update, table, desc)
        }
        Some("DELETE") if is_kw(tokens, 1, "FROM") => {
            let i = if is_kw(tokens, 2, "ONLY") { 3 } else { 2 };
            let (table, _) = ident_at(tokens, i)?;
            let desc = format!("Deleted {} from {table}", rows_phrase(affected));
            (ChangeOperation::Delete, table, desc)
        }
        _ => return None,
    };
    Some(StatementShape {
        change_type: ChangeType::Data,
        operation,
        description,
        table_name: Some(table.clone()),
        target: table,
        affected_rows: affected,
    })
}

fn match_maintenance(tokens: &[Token]) -> Option<StatementShape> {
    let head = kw_at(tokens, 0)?;
    if !matches!(head.as_str(), "VACUUM" | "ANALYZE" | "REINDEX") {
        return None;
    }
    // Optional modifiers (FULL, VERBOSE, TABLE, ...) then an optional target.
    let mut i = 1;
    while kw_at(tokens, i).is_some_and(|k| {
        matches!(
            k.as_str(),
            "FULL" | "FREEZE" | "VERBOSE" | "ANALYZE" | "TABLE" | "INDEX" | "SCHEMA" | "DATABASE"
        )
    }) {
        i += 1;
    }
    let target = ident_at(tokens, i).map(|(name, _)| name);
    let description = match &target {
        Some(name) => format!("Ran {head} on {name}"),
        None => format!("Ran {head}"),
    };
    Some(StatementShape {
        change_type: ChangeType::System,
        operation: ChangeOperation::Alter,
        description,
        target: target.clone().unwrap_or_else(|| head.clone()),
        table_name: target,
        affected_rows: None,
    })
}
