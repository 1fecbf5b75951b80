//! Shared text-level SQL helpers: comment stripping, a small tokenizer,
//! identifier extraction, and statement-shape parsing used by both the
//! classifier and the rollback synthesizer. This is deliberately not a
//! grammar-aware parser; it recognizes statement shapes by leading
//! keywords only.

/// Removes `--` line comments and `/* */` block comments, leaving string
/// literals and quoted identifiers untouched.
pub(crate) fn strip_comments(sql: &str) -> String {
    #[derive(PartialEq)]
    enum Mode {
        Normal,
        SingleQuote,
        DoubleQuote,
        Backtick,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len());
    let mut mode = Mode::Normal;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match mode {
            Mode::Normal => match c {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    mode = Mode::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    mode = Mode::BlockComment;
                    out.push(' ');
                }
                '\'' => {
                    mode = Mode::SingleQuote;
                    out.push(c);
                }
                '"' => {
                    mode = Mode::DoubleQuote;
                    out.push(c);
                }
                '`' => {
                    mode = Mode::Backtick;
                    out.push(c);
                }
                _ => out.push(c),
            },
            Mode::SingleQuote => {
                out.push(c);
                if c == '\'' {
                    mode = Mode::Normal;
                }
            }
            Mode::DoubleQuote => {
                out.push(c);
                if c == '"' {
                    mode = Mode::Normal;
                }
            }
            Mode::Backtick => {
                out.push(c);
                if c == '`' {
                    mode = Mode::Normal;
                }
            }
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Normal;
                    out.push('\n');
                }
            }
            Mode::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    mode = Mode::Normal;
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Bare word: keyword, identifier, or number.
    Word(String),
    /// Identifier quoted with double quotes or backticks, delimiters removed.
    Quoted(String),
    /// String literal, quotes removed and `''` unescaped.
    Literal(String),
    Symbol(char),
}

impl Token {
    pub(crate) fn ident_part(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Quoted(q) => Some(q),
            _ => None,
        }
    }
}

pub(crate) fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' {
            chars.next();
            let mut lit = String::new();
            while let Some(ch) = chars.next() {
                if ch == '\'' {
                    if chars.peek() == Some(&'\'') {
                        lit.push('\'');
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    lit.push(ch);
                }
            }
            tokens.push(Token::Literal(lit));
        } else if c == '"' || c == '`' {
            let quote = c;
            chars.next();
            let mut name = String::new();
            for ch in chars.by_ref() {
                if ch == quote {
                    break;
                }
                name.push(ch);
            }
            tokens.push(Token::Quoted(name));
        } else if c.is_alphanumeric() || c == '_' || c == '$' {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                    word.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(word));
        } else {
            tokens.push(Token::Symbol(c));
            chars.next();
        }
    }
    tokens
}

/// Uppercased keyword at `i`, if the token is a bare word.
pub(crate) fn kw_at(tokens: &[Token], i: usize) -> Option<String> {
    match tokens.get(i) {
        Some(Token::Word(w)) => Some(w.to_ascii_uppercase()),
        _ => None,
    }
}

pub(crate) fn is_kw(tokens: &[Token], i: usize, keyword: &str) -> bool {
    kw_at(tokens, i).as_deref() == Some(keyword)
}

/// Reads a possibly-qualified identifier starting at `i`, joining dotted
/// segments. Returns the unquoted name and the index past it.
pub(crate) fn ident_at(tokens: &[Token], i: usize) -> Option<(String, usize)> {
    let mut name = tokens.get(i)?.ident_part()?.to_string();
    let mut next = i + 1;
    loop {
        let dotted = matches!(tokens.get(next), Some(Token::Symbol('.')))
            .then(|| tokens.get(next + 1).and_then(Token::ident_part))
            .flatten();
        match dotted {
            Some(part) => {
                name.push('.');
                name.push_str(part);
                next += 2;
            }
            None => break,
        }
    }
    Some((name, next))
}

pub(crate) fn skip_if_exists(tokens: &[Token], i: usize) -> usize {
    if is_kw(tokens, i, "IF") && is_kw(tokens, i + 1, "EXISTS") {
        i + 2
    } else {
        i
    }
}

pub(crate) fn skip_if_not_exists(tokens: &[Token], i: usize) -> usize {
    if is_kw(tokens, i, "IF") && is_kw(tokens, i + 1, "NOT") && is_kw(tokens, i + 2, "EXISTS") {
        i + 3
    } else {
        i
    }
}

/// Renders a token slice back to SQL text with conventional spacing.
pub(crate) fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        let piece = match token {
            Token::Word(w) => w.clone(),
            Token::Quoted(q) => format!("\"{q}\""),
            Token::Literal(l) => format!("'{}'", l.replace('\'', "''")),
            Token::Symbol(s) => s.to_string(),
        };
        let no_space_before = matches!(token, Token::Symbol(',' | ')' | ';' | '.'));
        let no_space_after_prev = out.ends_with(['(', '.']);
        if !out.is_empty() && !no_space_before && !no_space_after_prev {
            out.push(' ');
        }
        out.push_str(&piece);
    }
    out
}

/// Renders a captured value as a SQL literal. Strings are single-quoted
/// with embedded quotes doubled; structured values fall back to their
/// JSON text, quoted.
pub(crate) fn sql_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(true) => "TRUE".to_string(),
        serde_json::Value::Bool(false) => "FALSE".to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    Database,
    Schema,
    Table,
    Index,
    Sequence,
    View,
    MaterializedView,
    Trigger,
    Function,
    Procedure,
    Role,
}

impl ObjectKind {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            ObjectKind::Database => "DATABASE",
            ObjectKind::Schema => "SCHEMA",
            ObjectKind::Table => "TABLE",
            ObjectKind::Index => "INDEX",
            ObjectKind::Sequence => "SEQUENCE",
            ObjectKind::View => "VIEW",
            ObjectKind::MaterializedView => "MATERIALIZED VIEW",
            ObjectKind::Trigger => "TRIGGER",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Procedure => "PROCEDURE",
            ObjectKind::Role => "ROLE",
        }
    }

    pub(crate) fn noun(self) -> &'static str {
        match self {
            ObjectKind::Database => "database",
            ObjectKind::Schema => "schema",
            ObjectKind::Table => "table",
            ObjectKind::Index => "index",
            ObjectKind::Sequence => "sequence",
            ObjectKind::View => "view",
            ObjectKind::MaterializedView => "materialized view",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Function => "function",
            ObjectKind::Procedure => "procedure",
            ObjectKind::Role => "role",
        }
    }
}

fn object_kind_at(tokens: &[Token], i: usize) -> Option<(ObjectKind, usize)> {
    let kind = match kw_at(tokens, i)?.as_str() {
        "DATABASE" => ObjectKind::Database,
        "SCHEMA" => ObjectKind::Schema,
        "TABLE" => ObjectKind::Table,
        "INDEX" => ObjectKind::Index,
        "SEQUENCE" => ObjectKind::Sequence,
        "VIEW" => ObjectKind::View,
        "MATERIALIZED" if is_kw(tokens, i + 1, "VIEW") => {
            return Some((ObjectKind::MaterializedView, i + 2));
        }
        "TRIGGER" => ObjectKind::Trigger,
        "FUNCTION" => ObjectKind::Function,
        "PROCEDURE" => ObjectKind::Procedure,
        "ROLE" => ObjectKind::Role,
        _ => return None,
    };
    Some((kind, i + 1))
}

const CREATE_MODIFIERS: &[&str] = &["OR", "REPLACE", "UNIQUE", "TEMP", "TEMPORARY", "GLOBAL", "LOCAL"];

/// Parses `CREATE <kind> <name>` heads, tolerating the usual modifiers.
pub(crate) fn create_target(tokens: &[Token]) -> Option<(ObjectKind, String)> {
    if !is_kw(tokens, 0, "CREATE") {
        return None;
    }
    let mut i = 1;
    while kw_at(tokens, i).is_some_and(|k| CREATE_MODIFIERS.contains(&k.as_str())) {
        i += 1;
    }
    let (kind, mut i) = object_kind_at(tokens, i)?;
    if is_kw(tokens, i, "CONCURRENTLY") {
        i += 1;
    }
    i = skip_if_not_exists(tokens, i);
    let (name, _) = ident_at(tokens, i)?;
    Some((kind, name))
}

/// Parses `DROP <kind> <name>` heads.
pub(crate) fn drop_target(tokens: &[Token]) -> Option<(ObjectKind, String)> {
    if !is_kw(tokens, 0, "DROP") {
        return None;
    }
    let (kind, mut i) = object_kind_at(tokens, 1)?;
    if is_kw(tokens, i, "CONCURRENTLY") {
        i += 1;
    }
    i = skip_if_exists(tokens, i);
    let (name, _) = ident_at(tokens, i)?;
    Some((kind, name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AlterTableAction {
    RenameTable { new_name: String },
    RenameColumn { column: String, new_name: String },
    AddColumn { column: String, definition: String },
    DropColumn { column: String },
    AddConstraint { name: String },
    DropConstraint { name: String },
    SetDefault { column: String },
    DropDefault { column: String },
    SetNotNull { column: String },
    DropNotNull { column: String },
    ChangeOwner { new_owner: String },
    Other,
}

fn trim_trailing_semicolons(tokens: &[Token]) -> &[Token] {
    let mut end = tokens.len();
    while end > 0 && tokens[end - 1] == Token::Symbol(';') {
        end -= 1;
    }
    &tokens[..end]
}

/// Parses `ALTER TABLE <name> <action>`, returning the table name and the
/// recognized action shape. Unrecognized actions come back as `Other`.
pub(crate) fn parse_alter_table(tokens: &[Token]) -> Option<(String, AlterTableAction)> {
    let tokens = trim_trailing_semicolons(tokens);
    if !is_kw(tokens, 0, "ALTER") || !is_kw(tokens, 1, "TABLE") {
        return None;
    }
    let mut i = skip_if_exists(tokens, 2);
    if is_kw(tokens, i, "ONLY") {
        i += 1;
    }
    let (table, i) = ident_at(tokens, i)?;

    let action = match kw_at(tokens, i).as_deref() {
        Some("RENAME") => {
            if is_kw(tokens, i + 1, "TO") {
                let (new_name, _) = ident_at(tokens, i + 2)?;
                AlterTableAction::RenameTable { new_name }
            } else {
                let col_idx = if is_kw(tokens, i + 1, "COLUMN") { i + 2 } else { i + 1 };
                let (column, after) = ident_at(tokens, col_idx)?;
                if !is_kw(tokens, after, "TO") {
                    return Some((table, AlterTableAction::Other));
                }
                let (new_name, _) = ident_at(tokens, after + 1)?;
                AlterTableAction::RenameColumn { column, new_name }
            }
        }
        Some("ADD") => {
            if is_kw(tokens, i + 1, "CONSTRAINT") {
                let (name, _) = ident_at(tokens, i + 2)?;
                AlterTableAction::AddConstraint { name }
            } else {
                let mut j = if is_kw(tokens, i + 1, "COLUMN") { i + 2 } else { i + 1 };
                j = skip_if_not_exists(tokens, j);
                let (column, _) = ident_at(tokens, j)?;
                let definition = render_tokens(&tokens[j..]);
                AlterTableAction::AddColumn { column, definition }
            }
        }
        Some("DROP") => {
            if is_kw(tokens, i + 1, "CONSTRAINT") {
                let (name, _) = ident_at(tokens, i + 2)?;
                AlterTableAction::DropConstraint { name }
            } else {
                let mut j = if is_kw(tokens, i + 1, "COLUMN") { i + 2 } else { i + 1 };
                j = skip_if_exists(tokens, j);
                let (column, _) = ident_at(tokens, j)?;
                AlterTableAction::DropColumn { column }
            }
        }
        Some("ALTER") => {
            let col_idx = if is_kw(tokens, i + 1, "COLUMN") { i + 2 } else { i + 1 };
            let (column, after) = ident_at(tokens, col_idx)?;
            match (kw_at(tokens, after).as_deref(), kw_at(tokens, after + 1).as_deref()) {
                (Some("SET"), Some("DEFAULT")) => AlterTableAction::SetDefault { column },
                (Some("DROP"), Some("DEFAULT")) => AlterTableAction::DropDefault { column },
                (Some("SET"), Some("NOT")) if is_kw(tokens, after + 2, "NULL") => {
                    AlterTableAction::SetNotNull { column }
                }
                (Some("DROP"), Some("NOT")) if is_kw(tokens, after + 2, "NULL") => {
                    AlterTableAction::DropNotNull { column }
                }
                _ => AlterTableAction::Other,
            }
        }
        Some("OWNER") if is_kw(tokens, i + 1, "TO") => {
            let (new_owner, _) = ident_at(tokens, i + 2)?;
            AlterTableAction::ChangeOwner { new_owner }
        }
        _ => AlterTableAction::Other,
    };
    Some((table, action))
}
