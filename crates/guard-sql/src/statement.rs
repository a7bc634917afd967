// SPDX-License-Identifier: Apache-2.0

//! Statement splitting and classification
//!
//! Classification only looks at the leading keywords, the target table of
//! DELETE and DROP statements and a handful of top-level clauses. It never
//! validates the statement; the engine does that when it runs it.

use std::fmt;

use guard_core::{quote_ident, ClassificationError, StatementKind};
use serde::{Deserialize, Serialize};

use crate::lexer::{tokenize, Token, TokenKind};

/// A table named by a DELETE or DROP statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
    /// Byte span of the reference in the statement text
    pub span: (usize, usize),
}

impl TableRef {
    /// Quoted, optionally schema-qualified reference usable in generated SQL
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// True when `schema` names the same database as this reference
    pub fn schema_matches(&self, schema: &str) -> bool {
        match &self.schema {
            Some(own) => own.eq_ignore_ascii_case(schema),
            None => schema.eq_ignore_ascii_case("main"),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Structural facts the danger evaluator needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// A WHERE clause at the top level of the main statement
    pub has_where: bool,
    /// DROP of any object, or `ALTER TABLE … DROP COLUMN`
    pub drops_structure: bool,
    /// The statement produces a row set
    pub returns_rows: bool,
}

/// One classified statement. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    text: String,
    kind: StatementKind,
    target: Option<TableRef>,
    shape: Shape,
}

impl Statement {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Target table; only ever set for DELETE and DROP
    pub fn target(&self) -> Option<&TableRef> {
        self.target.as_ref()
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }
}

/// Classifies text that must hold exactly one statement
pub fn classify(sql: &str) -> Result<Statement, ClassificationError> {
    let tokens = tokenize(sql)?;
    let groups = statement_groups(&tokens);
    match groups.as_slice() {
        [] => Err(ClassificationError::Empty),
        [single] => Ok(classify_tokens(sql, single)),
        many => Err(ClassificationError::MultipleStatements { count: many.len() }),
    }
}

/// Splits text into its top-level statements
///
/// Returned fragments exclude the terminating semicolon and any leading or
/// trailing comments. Fragments that hold nothing but comments or
/// whitespace are dropped.
pub fn split_statements(sql: &str) -> Result<Vec<&str>, ClassificationError> {
    let tokens = tokenize(sql)?;
    Ok(statement_groups(&tokens)
        .into_iter()
        .map(|group| &sql[group[0].start..group[group.len() - 1].end])
        .collect())
}

/// Groups tokens by top-level semicolons. Every returned group is non-empty.
fn statement_groups<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<&'t [Token<'a>]> {
    let mut groups = Vec::new();
    let mut begin = 0;
    let mut trigger = TriggerState::default();

    for (idx, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Semicolon && !trigger.in_body() {
            if idx > begin {
                groups.push(&tokens[begin..idx]);
            }
            begin = idx + 1;
            trigger = TriggerState::default();
            continue;
        }
        trigger.observe(&tokens[begin..=idx]);
    }
    if begin < tokens.len() {
        groups.push(&tokens[begin..]);
    }
    groups
}

/// Tracks whether the lexer position is inside a `CREATE TRIGGER` body,
/// where semicolons separate the body's statements rather than ours.
#[derive(Default)]
struct TriggerState {
    is_trigger: bool,
    in_body: bool,
    case_depth: usize,
}

impl TriggerState {
    fn in_body(&self) -> bool {
        self.in_body
    }

    /// `so_far` is the current statement up to and including the newest token
    fn observe(&mut self, so_far: &[Token<'_>]) {
        let Some(token) = so_far.last() else {
            return;
        };
        if !self.is_trigger {
            self.is_trigger = is_create_trigger(so_far);
            return;
        }
        if !self.in_body {
            if token.is_keyword("BEGIN") {
                self.in_body = true;
            }
            return;
        }
        if token.is_keyword("CASE") {
            self.case_depth += 1;
        } else if token.is_keyword("END") {
            if self.case_depth > 0 {
                self.case_depth -= 1;
            } else {
                self.in_body = false;
            }
        }
    }
}

/// `CREATE [TEMP|TEMPORARY] TRIGGER`
fn is_create_trigger(tokens: &[Token<'_>]) -> bool {
    match tokens {
        [create, trigger] => create.is_keyword("CREATE") && trigger.is_keyword("TRIGGER"),
        [create, temp, trigger] => {
            create.is_keyword("CREATE")
                && (temp.is_keyword("TEMP") || temp.is_keyword("TEMPORARY"))
                && trigger.is_keyword("TRIGGER")
        }
        _ => false,
    }
}

fn classify_tokens(sql: &str, tokens: &[Token<'_>]) -> Statement {
    let main = main_keyword_index(tokens);
    let lead = tokens[main];
    let kind = kind_of(&lead);

    let target = match kind {
        StatementKind::Delete => delete_target(&tokens[main + 1..]),
        StatementKind::Drop => drop_target(&tokens[main + 1..]),
        _ => None,
    };

    let body = &tokens[main..];
    let has_where = any_top_level(body, "WHERE");
    let drops_structure = kind == StatementKind::Drop
        || (lead.is_keyword("ALTER") && any_top_level(body, "DROP"));
    let returns_rows = kind == StatementKind::Select
        || lead.is_keyword("PRAGMA")
        || lead.is_keyword("EXPLAIN")
        || (kind.is_mutation() && any_top_level(body, "RETURNING"));

    Statement {
        text: sql.to_string(),
        kind,
        target,
        shape: Shape {
            has_where,
            drops_structure,
            returns_rows,
        },
    }
}

fn kind_of(lead: &Token<'_>) -> StatementKind {
    if lead.kind != TokenKind::Word {
        return StatementKind::Other;
    }
    match lead.text.to_ascii_uppercase().as_str() {
        "SELECT" | "VALUES" => StatementKind::Select,
        "INSERT" | "REPLACE" => StatementKind::Insert,
        "UPDATE" => StatementKind::Update,
        "DELETE" => StatementKind::Delete,
        "DROP" => StatementKind::Drop,
        "CREATE" => StatementKind::Create,
        _ => StatementKind::Other,
    }
}

/// Index of the keyword that decides the statement kind. For a `WITH`
/// prefix this is the first top-level DML keyword after the CTEs.
fn main_keyword_index(tokens: &[Token<'_>]) -> usize {
    if !tokens[0].is_keyword("WITH") {
        return 0;
    }
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(1) {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0
            && ["SELECT", "VALUES", "INSERT", "REPLACE", "UPDATE", "DELETE"]
                .iter()
                .any(|kw| token.is_keyword(kw))
        {
            return idx;
        }
    }
    0
}

fn any_top_level(tokens: &[Token<'_>], keyword: &str) -> bool {
    let mut depth = 0usize;
    tokens.iter().any(|token| {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        }
        depth == 0 && token.is_keyword(keyword)
    })
}

/// `FROM [schema.]name` following `DELETE`
fn delete_target(rest: &[Token<'_>]) -> Option<TableRef> {
    match rest {
        [from, name @ ..] if from.is_keyword("FROM") => table_ref(name),
        _ => None,
    }
}

/// `<TABLE|INDEX|TRIGGER|VIEW> [IF EXISTS] [schema.]name` following `DROP`
fn drop_target(rest: &[Token<'_>]) -> Option<TableRef> {
    let (object, rest) = rest.split_first()?;
    if !["TABLE", "INDEX", "TRIGGER", "VIEW"]
        .iter()
        .any(|kw| object.is_keyword(kw))
    {
        return None;
    }
    match rest {
        [if_kw, exists, name @ ..] if if_kw.is_keyword("IF") && exists.is_keyword("EXISTS") => {
            table_ref(name)
        }
        _ => table_ref(rest),
    }
}

/// Parses `name` or `schema.name` at the start of `tokens`
pub(crate) fn table_ref(tokens: &[Token<'_>]) -> Option<TableRef> {
    match tokens {
        [schema, dot, name, ..]
            if schema.is_identifier() && dot.is_symbol('.') && name.is_identifier() =>
        {
            Some(TableRef {
                schema: schema.ident_value(),
                name: name.ident_value()?,
                span: (schema.start, name.end),
            })
        }
        [name, ..] if name.is_identifier() => Some(TableRef {
            schema: None,
            name: name.ident_value()?,
            span: (name.start, name.end),
        }),
        _ => None,
    }
}
