// SPDX-License-Identifier: Apache-2.0

//! Scratch table definitions derived from a table's own `CREATE TABLE`
//!
//! The scratch copy keeps every column definition, collation, primary key
//! and table option of the original, so a DELETE replayed against it sees
//! the same rowids, comparisons and affinities. Foreign key clauses are
//! removed because their parent tables are not visible from the temp schema,
//! and `AUTOINCREMENT` is removed so no `sqlite_sequence` is left behind.

use guard_core::quote_ident;

use crate::lexer::{tokenize, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchDefinition {
    /// `CREATE TEMP TABLE "scratch" (...)`
    pub sql: String,
    pub without_rowid: bool,
}

/// Rebuilds `create_sql` as a TEMP table named `scratch`.
///
/// Returns `None` for anything that is not a plain column-list `CREATE
/// TABLE`, such as virtual tables.
pub fn scratch_table_definition(create_sql: &str, scratch: &str) -> Option<ScratchDefinition> {
    let tokens = tokenize(create_sql).ok()?;
    let mut idx = 0;

    if !tokens.first()?.is_keyword("CREATE") {
        return None;
    }
    idx += 1;
    if tokens.get(idx).is_some_and(|t| t.is_keyword("TEMP") || t.is_keyword("TEMPORARY")) {
        idx += 1;
    }
    if !tokens.get(idx)?.is_keyword("TABLE") {
        return None;
    }
    idx += 1;
    if matches!(
        tokens.get(idx..idx + 3),
        Some([a, b, c]) if a.is_keyword("IF") && b.is_keyword("NOT") && c.is_keyword("EXISTS")
    ) {
        idx += 3;
    }

    // name, or schema.name
    tokens.get(idx)?.ident_value()?;
    if tokens.get(idx + 1).is_some_and(|t| t.is_symbol('.')) {
        idx += 2;
        tokens.get(idx)?.ident_value()?;
    }
    let name_end = tokens[idx].end;
    idx += 1;

    let open = idx;
    if !tokens.get(open)?.is_symbol('(') {
        return None;
    }
    let close = matching_paren(&tokens, open)?;

    let mut removals: Vec<(usize, usize)> = Vec::new();
    for (item_start, item_end) in body_items(&tokens, open, close) {
        let item = &tokens[item_start..item_end];
        if is_foreign_key_constraint(item) {
            // table constraints always follow a comma
            let comma = &tokens[item_start - 1];
            removals.push((comma.start, tokens[item_end - 1].end));
            continue;
        }
        column_removals(item, &mut removals);
    }

    let trailer = &tokens[close + 1..];
    let without_rowid = trailer
        .windows(2)
        .any(|w| w[0].is_keyword("WITHOUT") && w[1].is_keyword("ROWID"));

    let mut sql = format!("CREATE TEMP TABLE {}", quote_ident(scratch));
    let mut cursor = name_end;
    for (start, end) in removals {
        sql.push_str(&create_sql[cursor..start]);
        cursor = end;
    }
    sql.push_str(&create_sql[cursor..]);

    Some(ScratchDefinition { sql, without_rowid })
}

fn matching_paren(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth -= 1;
            if depth == 0 {
                return Some(open + offset);
            }
        }
    }
    None
}

/// Token ranges of the comma-separated definitions between `open` and `close`
fn body_items(tokens: &[Token<'_>], open: usize, close: usize) -> Vec<(usize, usize)> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = open + 1;
    for idx in open + 1..close {
        let token = &tokens[idx];
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_symbol(',') {
            if start < idx {
                items.push((start, idx));
            }
            start = idx + 1;
        }
    }
    if start < close {
        items.push((start, close));
    }
    items
}

fn is_foreign_key_constraint(item: &[Token<'_>]) -> bool {
    let rest = match item {
        [constraint, _name, rest @ ..] if constraint.is_keyword("CONSTRAINT") => rest,
        _ => item,
    };
    matches!(rest, [foreign, key, ..] if foreign.is_keyword("FOREIGN") && key.is_keyword("KEY"))
}

/// Collects the byte ranges of `REFERENCES` clauses and `AUTOINCREMENT`
/// keywords inside one column definition
fn column_removals(item: &[Token<'_>], removals: &mut Vec<(usize, usize)>) {
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < item.len() {
        let token = &item[idx];
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_keyword("AUTOINCREMENT") {
            removals.push((token.start, token.end));
        } else if depth == 0 && token.is_keyword("REFERENCES") {
            let from = match idx.checked_sub(2).map(|p| &item[p]) {
                Some(constraint) if constraint.is_keyword("CONSTRAINT") => idx - 2,
                _ => idx,
            };
            let last = references_end(item, idx);
            removals.push((item[from].start, item[last].end));
            idx = last + 1;
            continue;
        }
        idx += 1;
    }
}

/// Index of the last token of the foreign key clause starting at `idx`
fn references_end(item: &[Token<'_>], idx: usize) -> usize {
    let mut last = idx;
    if item.get(last + 1).is_some_and(|t| t.ident_value().is_some()) {
        last += 1;
    }
    if item.get(last + 1).is_some_and(|t| t.is_symbol('(')) {
        if let Some(close) = matching_paren(item, last + 1) {
            last = close;
        }
    }

    let kw = |at: usize, keyword: &str| item.get(at).is_some_and(|t| t.is_keyword(keyword));
    loop {
        let next = last + 1;
        if kw(next, "ON") && (kw(next + 1, "DELETE") || kw(next + 1, "UPDATE")) {
            let action = next + 2;
            last = if kw(action, "SET") || kw(action, "NO") {
                action + 1
            } else {
                action
            };
        } else if kw(next, "MATCH") {
            last = next + 1;
        } else if kw(next, "NOT") && kw(next + 1, "DEFERRABLE") {
            last = next + 1;
        } else if kw(next, "DEFERRABLE") {
            last = next;
        } else if kw(next, "INITIALLY") {
            last = next + 1;
        } else {
            break;
        }
    }
    last.min(item.len() - 1)
}
