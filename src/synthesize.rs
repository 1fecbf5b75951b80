//! Rollback synthesis: best-effort inverse statement for one forward
//! statement. Pure and stateless.
//!
//! The safety invariant here is absolute: the synthesizer never fabricates
//! before-state it was not given. Whenever an inverse would need data that
//! the supplied [`ChangeMetadata`] does not carry, the result is
//! [`RollbackSql::Manual`] — never a guessed statement.

use crate::change::{ChangeMetadata, RollbackSql, RowValues};
use crate::sqltext::{
    ObjectKind, Token, create_target, ident_at, is_kw, kw_at, parse_alter_table, render_tokens,
    sql_literal, strip_comments, tokenize, AlterTableAction,
};

/// Synthesizes the inverse of `query`, consuming externally captured
/// before-state from `metadata` where the statement class requires it.
pub fn synthesize(query: &str, metadata: Option<&ChangeMetadata>) -> RollbackSql {
    let stripped = strip_comments(query);
    let tokens = tokenize(stripped.trim());
    let Some(head) = kw_at(&tokens, 0) else {
        return RollbackSql::Manual;
    };
    match head.as_str() {
        "CREATE" => inverse_create(&tokens),
        "DROP" => inverse_drop(metadata),
        "ALTER" => inverse_alter(&tokens, metadata),
        "INSERT" => inverse_insert(&tokens, metadata),
        "DELETE" => inverse_delete(&tokens, metadata),
        "UPDATE" => inverse_update(&tokens, metadata),
        "GRANT" => inverse_grant(&tokens),
        "REVOKE" => inverse_revoke(&tokens),
        // TRUNCATE, MERGE, maintenance, and anything unparseable.
        _ => RollbackSql::Manual,
    }
}

fn inverse_create(tokens: &[Token]) -> RollbackSql {
    match create_target(tokens) {
        Some((kind, name)) => RollbackSql::Sql(format!(
            "DROP {} IF EXISTS {name};",
            kind.keyword()
        )),
        None => RollbackSql::Manual,
    }
}

fn inverse_drop(metadata: Option<&ChangeMetadata>) -> RollbackSql {
    match metadata.and_then(|m| m.original_definition.as_deref()) {
        Some(definition) => RollbackSql::Sql(with_terminator(definition)),
        None => RollbackSql::Manual,
    }
}

fn inverse_alter(tokens: &[Token], metadata: Option<&ChangeMetadata>) -> RollbackSql {
    if is_kw(tokens, 1, "TABLE") {
        return inverse_alter_table(tokens, metadata);
    }
    // Generic object rename: ALTER <kind> <name> RENAME TO <new>.
    let Some((kind, mut i)) = alter_object_kind(tokens) else {
        return RollbackSql::Manual;
    };
    let Some((name, after)) = ident_at(tokens, i) else {
        return RollbackSql::Manual;
    };
    i = after;
    if is_kw(tokens, i, "RENAME") && is_kw(tokens, i + 1, "TO") {
        if let Some((new_name, _)) = ident_at(tokens, i + 2) {
            return RollbackSql::Sql(format!(
                "ALTER {} {new_name} RENAME TO {name};",
                kind.keyword()
            ));
        }
    }
    RollbackSql::Manual
}

fn alter_object_kind(tokens: &[Token]) -> Option<(ObjectKind, usize)> {
    let kind = match kw_at(tokens, 1)?.as_str() {
        "INDEX" => ObjectKind::Index,
        "SEQUENCE" => ObjectKind::Sequence,
        "VIEW" => ObjectKind::View,
        "MATERIALIZED" if is_kw(tokens, 2, "VIEW") => return Some((ObjectKind::MaterializedView, 3)),
        "TRIGGER" => ObjectKind::Trigger,
        "SCHEMA" => ObjectKind::Schema,
        "DATABASE" => ObjectKind::Database,
        _ => return None,
    };
    Some((kind, 2))
}

fn inverse_alter_table(tokens: &[Token], metadata: Option<&ChangeMetadata>) -> RollbackSql {
    let Some((table, action)) = parse_alter_table(tokens) else {
        return RollbackSql::Manual;
    };
    match action {
        AlterTableAction::RenameTable { new_name } => {
            RollbackSql::Sql(format!("ALTER TABLE {new_name} RENAME TO {table};"))
        }
        AlterTableAction::RenameColumn { column, new_name } => RollbackSql::Sql(format!(
            "ALTER TABLE {table} RENAME COLUMN {new_name} TO {column};"
        )),
        // Lossy on reapply: any data in the added column is gone after the
        // inverse DROP COLUMN runs.
        AlterTableAction::AddColumn { column, .. } => {
            RollbackSql::Sql(format!("ALTER TABLE {table} DROP COLUMN {column};"))
        }
        AlterTableAction::DropColumn { .. } => {
            match metadata.and_then(|m| m.column_definition.as_deref()) {
                Some(definition) => RollbackSql::Sql(format!(
                    "ALTER TABLE {table} ADD COLUMN {definition};"
                )),
                None => RollbackSql::Manual,
            }
        }
        AlterTableAction::AddConstraint { name } => {
            RollbackSql::Sql(format!("ALTER TABLE {table} DROP CONSTRAINT {name};"))
        }
        AlterTableAction::DropConstraint { .. } => {
            match metadata.and_then(|m| m.original_definition.as_deref()) {
                Some(definition) => RollbackSql::Sql(with_terminator(definition)),
                None => RollbackSql::Manual,
            }
        }
        AlterTableAction::SetDefault { column } => {
            match metadata.and_then(|m| m.previous_default.as_deref()) {
                Some(previous) => RollbackSql::Sql(format!(
                    "ALTER TABLE {table} ALTER COLUMN {column} SET DEFAULT {previous};"
                )),
                None => RollbackSql::Sql(format!(
                    "ALTER TABLE {table} ALTER COLUMN {column} DROP DEFAULT;"
                )),
            }
        }
        AlterTableAction::DropDefault { column } => {
            match metadata.and_then(|m| m.previous_default.as_deref()) {
                Some(previous) => RollbackSql::Sql(format!(
                    "ALTER TABLE {table} ALTER COLUMN {column} SET DEFAULT {previous};"
                )),
                None => RollbackSql::Manual,
            }
        }
        AlterTableAction::SetNotNull { column } => RollbackSql::Sql(format!(
            "ALTER TABLE {table} ALTER COLUMN {column} DROP NOT NULL;"
        )),
        AlterTableAction::DropNotNull { column } => RollbackSql::Sql(format!(
            "ALTER TABLE {table} ALTER COLUMN {column} SET NOT NULL;"
        )),
        AlterTableAction::ChangeOwner { .. } => {
            match metadata.and_then(|m| m.previous_owner.as_deref()) {
                Some(previous) => {
                    RollbackSql::Sql(format!("ALTER TABLE {table} OWNER TO {previous};"))
                }
                None => RollbackSql::Manual,
            }
        }
        AlterTableAction::Other => RollbackSql::Manual,
    }
}

fn inverse_insert(tokens: &[Token], metadata: Option<&ChangeMetadata>) -> RollbackSql {
    if !is_kw(tokens, 1, "INTO") {
        return RollbackSql::Manual;
    }
    let Some((table, _)) = ident_at(tokens, 2) else {
        return RollbackSql::Manual;
    };
    let Some(key) = metadata.and_then(|m| m.primary_key.as_ref()).filter(|k| !k.is_empty())
    else {
        return RollbackSql::Manual;
    };
    RollbackSql::Sql(format!("DELETE FROM {table} WHERE {};", predicate(key)))
}

fn inverse_delete(tokens: &[Token], metadata: Option<&ChangeMetadata>) -> RollbackSql {
    if !is_kw(tokens, 1, "FROM") {
        return RollbackSql::Manual;
    }
    let i = if is_kw(tokens, 2, "ONLY") { 3 } else { 2 };
    let Some((table, _)) = ident_at(tokens, i) else {
        return RollbackSql::Manual;
    };
    let Some(rows) = metadata.and_then(|m| m.rows.as_ref()).filter(|r| !r.is_empty()) else {
        return RollbackSql::Manual;
    };
    let statements: Vec<String> = rows
        .iter()
        .map(|row| {
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            let values: Vec<String> = row.values().map(sql_literal).collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({});",
                columns.join(", "),
                values.join(", ")
            )
        })
        .collect();
    RollbackSql::Sql(statements.join("\n"))
}

fn inverse_update(tokens: &[Token], metadata: Option<&ChangeMetadata>) -> RollbackSql {
    let i = if is_kw(tokens, 1, "ONLY") { 2 } else { 1 };
    let Some((table, _)) = ident_at(tokens, i) else {
        return RollbackSql::Manual;
    };
    let Some(meta) = metadata else {
        return RollbackSql::Manual;
    };
    let Some(old_rows) = meta.old_rows.as_ref().filter(|r| !r.is_empty()) else {
        return RollbackSql::Manual;
    };
    let Some(key_fields) = meta.primary_key_fields.as_ref().filter(|f| !f.is_empty()) else {
        return RollbackSql::Manual;
    };

    let mut statements = Vec::with_capacity(old_rows.len());
    for row in old_rows {
        // Every captured row must carry its full primary key.
        if key_fields.iter().any(|field| !row.contains_key(field)) {
            return RollbackSql::Manual;
        }
        let assignments: Vec<String> = row
            .iter()
            .filter(|(column, _)| !key_fields.contains(column))
            .map(|(column, value)| format!("{column} = {}", sql_literal(value)))
            .collect();
        if assignments.is_empty() {
            return RollbackSql::Manual;
        }
        let conditions: Vec<String> = key_fields
            .iter()
            .map(|field| format!("{field} = {}", sql_literal(&row[field])))
            .collect();
        statements.push(format!(
            "UPDATE {table} SET {} WHERE {};",
            assignments.join(", "),
            conditions.join(" AND ")
        ));
    }
    RollbackSql::Sql(statements.join("\n"))
}

fn inverse_grant(tokens: &[Token]) -> RollbackSql {
    let Some(on_idx) = (1..tokens.len()).find(|&i| is_kw(tokens, i, "ON")) else {
        return RollbackSql::Manual;
    };
    let Some(to_idx) = (on_idx + 1..tokens.len()).find(|&i| is_kw(tokens, i, "TO")) else {
        return RollbackSql::Manual;
    };
    // Grantee list runs to end of statement, minus any WITH GRANT OPTION tail.
    let end = (to_idx + 1..tokens.len())
        .find(|&i| is_kw(tokens, i, "WITH") || tokens[i] == Token::Symbol(';'))
        .unwrap_or(tokens.len());
    let privileges = render_tokens(&tokens[1..on_idx]);
    let object = render_tokens(&tokens[on_idx + 1..to_idx]);
    let grantee = render_tokens(&tokens[to_idx + 1..end]);
    RollbackSql::Sql(format!("REVOKE {privileges} ON {object} FROM {grantee};"))
}

fn inverse_revoke(tokens: &[Token]) -> RollbackSql {
    // Tolerate the REVOKE GRANT OPTION FOR prefix.
    let priv_start = if is_kw(tokens, 1, "GRANT")
        && is_kw(tokens, 2, "OPTION")
        && is_kw(tokens, 3, "FOR")
    {
        4
    } else {
        1
    };
    let Some(on_idx) = (priv_start..tokens.len()).find(|&i| is_kw(tokens, i, "ON")) else {
        return RollbackSql::Manual;
    };
    let Some(from_idx) = (on_idx + 1..tokens.len()).find(|&i| is_kw(tokens, i, "FROM")) else {
        return RollbackSql::Manual;
    };
    let end = (from_idx + 1..tokens.len())
        .find(|&i| {
            is_kw(tokens, i, "CASCADE")
                || is_kw(tokens, i, "RESTRICT")
                || tokens[i] == Token::Symbol(';')
        })
        .unwrap_or(tokens.len());
    let privileges = render_tokens(&tokens[priv_start..on_idx]);
    let object = render_tokens(&tokens[on_idx + 1..from_idx]);
    let grantee = render_tokens(&tokens[from_idx + 1..end]);
    RollbackSql::Sql(format!("GRANT {privileges} ON {object} TO {grantee};"))
}

fn predicate(values: &RowValues) -> String {
    values
        .iter()
        .map(|(column, value)| format!("{column} = {}", sql_literal(value)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn with_terminator(statement: &str) -> String {
    let trimmed = statement.trim();
    if trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{trimmed};")
    }
}

#[cfg(test)]
mod tests {
    use super::synthesize;
    use crate::change::{ChangeMetadata, RollbackSql, RowValues};
    use serde_json::json;

    fn sql(result: RollbackSql) -> String {
        match result {
            RollbackSql::Sql(s) => s,
            RollbackSql::Manual => panic!("expected a concrete inverse, got MANUAL"),
        }
    }

    fn row(pairs: &[(&str, serde_json::Value)]) -> RowValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn create_statements_invert_to_matching_drops() {
        assert_eq!(
            sql(synthesize("CREATE TABLE foo (id INT)", None)),
            "DROP TABLE IF EXISTS foo;"
        );
        assert_eq!(
            sql(synthesize("CREATE UNIQUE INDEX idx_a ON t (a)", None)),
            "DROP INDEX IF EXISTS idx_a;"
        );
        assert_eq!(
            sql(synthesize("CREATE OR REPLACE VIEW v AS SELECT 1", None)),
            "DROP VIEW IF EXISTS v;"
        );
        assert_eq!(
            sql(synthesize("CREATE MATERIALIZED VIEW mv AS SELECT 1", None)),
            "DROP MATERIALIZED VIEW IF EXISTS mv;"
        );
        assert_eq!(
            sql(synthesize("CREATE SEQUENCE seq_orders", None)),
            "DROP SEQUENCE IF EXISTS seq_orders;"
        );
        assert_eq!(
            sql(synthesize("CREATE ROLE readonly", None)),
            "DROP ROLE IF EXISTS readonly;"
        );
        assert_eq!(
            sql(synthesize(
                "CREATE FUNCTION add_one(i INT) RETURNS INT AS $$ SELECT i + 1 $$",
                None
            )),
            "DROP FUNCTION IF EXISTS add_one;"
        );
    }

    #[test]
    fn drop_without_original_definition_is_manual() {
        assert_eq!(synthesize("DROP TABLE foo", None), RollbackSql::Manual);
        assert_eq!(
            synthesize("DROP TABLE foo", Some(&ChangeMetadata::default())),
            RollbackSql::Manual
        );
    }

    #[test]
    fn drop_with_original_definition_restores_it() {
        let metadata = ChangeMetadata {
            original_definition: Some("CREATE TABLE foo (id INT)".into()),
            ..Default::default()
        };
        assert_eq!(
            sql(synthesize("DROP TABLE foo", Some(&metadata))),
            "CREATE TABLE foo (id INT);"
        );
    }

    #[test]
    fn renames_invert_by_swapping_names() {
        assert_eq!(
            sql(synthesize("ALTER TABLE users RENAME TO customers", None)),
            "ALTER TABLE customers RENAME TO users;"
        );
        assert_eq!(
            sql(synthesize("ALTER TABLE t RENAME COLUMN a TO b", None)),
            "ALTER TABLE t RENAME COLUMN b TO a;"
        );
        assert_eq!(
            sql(synthesize("ALTER INDEX idx_old RENAME TO idx_new", None)),
            "ALTER INDEX idx_new RENAME TO idx_old;"
        );
    }

    #[test]
    fn add_column_inverts_to_drop_column() {
        assert_eq!(
            sql(synthesize(
                "ALTER TABLE users ADD COLUMN age INT NOT NULL DEFAULT 0",
                None
            )),
            "ALTER TABLE users DROP COLUMN age;"
        );
    }

    #[test]
    fn drop_column_requires_captured_definition() {
        assert_eq!(
            synthesize("ALTER TABLE users DROP COLUMN age", None),
            RollbackSql::Manual
        );
        let metadata = ChangeMetadata {
            column_definition: Some("age INT NOT NULL DEFAULT 0".into()),
            ..Default::default()
        };
        assert_eq!(
            sql(synthesize("ALTER TABLE users DROP COLUMN age", Some(&metadata))),
            "ALTER TABLE users ADD COLUMN age INT NOT NULL DEFAULT 0;"
        );
    }

    #[test]
    fn default_and_not_null_toggles() {
        assert_eq!(
            sql(synthesize("ALTER TABLE t ALTER COLUMN c SET DEFAULT 5", None)),
            "ALTER TABLE t ALTER COLUMN c DROP DEFAULT;"
        );
        let metadata = ChangeMetadata {
            previous_default: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(
            sql(synthesize("ALTER TABLE t ALTER COLUMN c SET DEFAULT 5", Some(&metadata))),
            "ALTER TABLE t ALTER COLUMN c SET DEFAULT 1;"
        );
        assert_eq!(
            synthesize("ALTER TABLE t ALTER COLUMN c DROP DEFAULT", None),
            RollbackSql::Manual
        );
        assert_eq!(
            sql(synthesize("ALTER TABLE t ALTER COLUMN c SET NOT NULL", None)),
            "ALTER TABLE t ALTER COLUMN c DROP NOT NULL;"
        );
        assert_eq!(
            sql(synthesize("ALTER TABLE t ALTER COLUMN c DROP NOT NULL", None)),
            "ALTER TABLE t ALTER COLUMN c SET NOT NULL;"
        );
    }

    #[test]
    fn insert_inverts_to_delete_by_primary_key() {
        let metadata = ChangeMetadata {
            primary_key: Some(row(&[("id", json!(5))])),
            ..Default::default()
        };
        assert_eq!(
            sql(synthesize("INSERT INTO t (a, b) VALUES (1, 2)", Some(&metadata))),
            "DELETE FROM t WHERE id = 5;"
        );
        assert_eq!(
            synthesize("INSERT INTO t (a, b) VALUES (1, 2)", None),
            RollbackSql::Manual
        );
    }

    #[test]
    fn composite_primary_keys_join_with_and() {
        let metadata = ChangeMetadata {
            primary_key: Some(row(&[("order_id", json!(7)), ("line", json!(2))])),
            ..Default::default()
        };
        assert_eq!(
            sql(synthesize("INSERT INTO lines VALUES (7, 2)", Some(&metadata))),
            "DELETE FROM lines WHERE line = 2 AND order_id = 7;"
        );
    }

    #[test]
    fn delete_inverts_to_reinsert_of_captured_rows() {
        let metadata = ChangeMetadata {
            rows: Some(vec![
                row(&[("id", json!(1)), ("name", json!("a"))]),
                row(&[("id", json!(2)), ("name", json!("o'b"))]),
            ]),
            ..Default::default()
        };
        assert_eq!(
            sql(synthesize("DELETE FROM users WHERE id < 3", Some(&metadata))),
            "INSERT INTO users (id, name) VALUES (1, 'a');\n\
             INSERT INTO users (id, name) VALUES (2, 'o''b');"
        );
        assert_eq!(
            synthesize("DELETE FROM users WHERE id < 3", None),
            RollbackSql::Manual
        );
    }

    #[test]
    fn update_inverts_to_restore_of_old_rows() {
        let metadata = ChangeMetadata {
            old_rows: Some(vec![row(&[
                ("id", json!(1)),
                ("total", json!(10)),
                ("note", json!(serde_json::Value::Null)),
            ])]),
            primary_key_fields: Some(vec!["id".into()]),
            ..Default::default()
        };
        assert_eq!(
            sql(synthesize("UPDATE orders SET total = 0", Some(&metadata))),
            "UPDATE orders SET note = NULL, total = 10 WHERE id = 1;"
        );
    }

    #[test]
    fn update_without_key_fields_or_old_rows_is_manual() {
        let missing_keys = ChangeMetadata {
            old_rows: Some(vec![row(&[("id", json!(1))])]),
            ..Default::default()
        };
        assert_eq!(
            synthesize("UPDATE orders SET total = 0", Some(&missing_keys)),
            RollbackSql::Manual
        );
        let row_without_key = ChangeMetadata {
            old_rows: Some(vec![row(&[("total", json!(10))])]),
            primary_key_fields: Some(vec!["id".into()]),
            ..Default::default()
        };
        assert_eq!(
            synthesize("UPDATE orders SET total = 0", Some(&row_without_key)),
            RollbackSql::Manual
        );
    }

    #[test]
    fn grant_and_revoke_swap() {
        assert_eq!(
            sql(synthesize("GRANT SELECT ON t TO alice", None)),
            "REVOKE SELECT ON t FROM alice;"
        );
        assert_eq!(
            sql(synthesize("REVOKE SELECT ON t FROM alice", None)),
            "GRANT SELECT ON t TO alice;"
        );
        // Round trip: inverting the inverse restores the original shape.
        assert_eq!(
            sql(synthesize("REVOKE SELECT ON t FROM alice;", None)),
            "GRANT SELECT ON t TO alice;"
        );
    }

    #[test]
    fn grant_with_grant_option_drops_the_with_clause() {
        assert_eq!(
            sql(synthesize(
                "GRANT SELECT, INSERT ON TABLE orders TO alice WITH GRANT OPTION",
                None
            )),
            "REVOKE SELECT, INSERT ON TABLE orders FROM alice;"
        );
    }

    #[test]
    fn truncate_merge_and_unparseable_are_always_manual() {
        assert_eq!(synthesize("TRUNCATE TABLE logs", None), RollbackSql::Manual);
        assert_eq!(
            synthesize("MERGE INTO users USING staged ON (1=1)", None),
            RollbackSql::Manual
        );
        assert_eq!(synthesize("VACUUM FULL", None), RollbackSql::Manual);
        assert_eq!(synthesize("not sql at all", None), RollbackSql::Manual);
        assert_eq!(synthesize("", None), RollbackSql::Manual);
    }
}
