// SPDX-License-Identifier: Apache-2.0

//! Redirects a DELETE at a scratch copy of its target table

use guard_core::quote_ident;

use crate::lexer::{tokenize, Token};
use crate::statement::TableRef;

/// Rewrites `sql` so that every reference to `target` names the TEMP table
/// `scratch` instead.
///
/// Table positions (`FROM target`, `JOIN target`) become `temp."scratch"`;
/// qualifiers (`target.col`, `main.target.col`) become `"scratch".col`. An
/// `INDEXED BY` / `NOT INDEXED` hint on the main target is removed since the
/// scratch copy has no indexes. Literals and comments are copied unchanged.
///
/// Returns `None` when no table position referring to `target` was found.
pub fn rewrite_delete_target(sql: &str, target: &TableRef, scratch: &str) -> Option<String> {
    let tokens = tokenize(sql).ok()?;
    let table_sql = format!("temp.{}", quote_ident(scratch));
    let qualifier_sql = quote_ident(scratch);

    let mut edits: Vec<(usize, usize, &str)> = Vec::new();
    let mut redirected = false;
    let mut idx = 0;

    while idx < tokens.len() {
        let prev = idx.checked_sub(1).map(|p| &tokens[p]);
        if prev.is_some_and(|p| p.is_symbol('.')) || !tokens[idx].is_identifier() {
            idx += 1;
            continue;
        }

        let Some(last) = reference_end(&tokens, idx, target) else {
            idx += 1;
            continue;
        };
        let start = tokens[idx].start;
        let end = tokens[last].end;
        let next = tokens.get(last + 1);

        if next.is_some_and(|n| n.is_symbol('.')) {
            edits.push((start, end, qualifier_sql.as_str()));
        } else if prev.is_some_and(|p| p.is_keyword("FROM") || p.is_keyword("JOIN")) {
            edits.push((start, end, table_sql.as_str()));
            if !redirected {
                if let Some(hint_end) = index_hint_end(&tokens[last + 1..]) {
                    edits.push((end, hint_end, ""));
                }
            }
            redirected = true;
        }
        idx = last + 1;
    }

    if !redirected {
        return None;
    }

    let mut out = String::with_capacity(sql.len() + edits.len() * scratch.len());
    let mut cursor = 0;
    for (start, end, replacement) in edits {
        out.push_str(&sql[cursor..start]);
        out.push_str(replacement);
        cursor = end;
    }
    out.push_str(&sql[cursor..]);
    Some(out)
}

/// If the tokens at `idx` name `target` (bare or schema-qualified), returns
/// the index of the last token of that name.
fn reference_end(tokens: &[Token<'_>], idx: usize, target: &TableRef) -> Option<usize> {
    let first = tokens[idx].ident_value()?;
    let qualified = match (tokens.get(idx + 1), tokens.get(idx + 2)) {
        (Some(dot), Some(name)) if dot.is_symbol('.') && name.is_identifier() => name.ident_value(),
        _ => None,
    };

    if let Some(name) = qualified {
        if target.schema_matches(&first) && name.eq_ignore_ascii_case(&target.name) {
            return Some(idx + 2);
        }
    }
    // a bare name still qualifies columns of a schema-qualified target
    let is_qualifier = tokens.get(idx + 1).is_some_and(|t| t.is_symbol('.'));
    if first.eq_ignore_ascii_case(&target.name) && (target.schema.is_none() || is_qualifier) {
        return Some(idx);
    }
    None
}

/// End offset of a leading `INDEXED BY name` or `NOT INDEXED` clause
fn index_hint_end(tokens: &[Token<'_>]) -> Option<usize> {
    match tokens {
        [indexed, by, name, ..] if indexed.is_keyword("INDEXED") && by.is_keyword("BY") => {
            Some(name.end)
        }
        [not, indexed, ..] if not.is_keyword("NOT") && indexed.is_keyword("INDEXED") => {
            Some(indexed.end)
        }
        _ => None,
    }
}
