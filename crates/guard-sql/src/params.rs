// SPDX-License-Identifier: Apache-2.0

//! Parameter resolution
//!
//! SQLite accepts `?`, `?NNN`, `:name`, `@name` and `$name` placeholders,
//! but values are only ever bound by position. Named parameters are
//! therefore rewritten to numbered placeholders before execution.

use guard_core::{GuardError, GuardResult, Params, Value};

use crate::lexer::{tokenize, TokenKind};

/// Statement text paired with the values to bind, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Prepares `sql` and `params` for positional binding
pub fn resolve_params(sql: &str, params: &Params) -> GuardResult<BoundSql> {
    match params {
        Params::None => Ok(BoundSql {
            sql: sql.to_string(),
            values: Vec::new(),
        }),
        Params::Positional(values) => Ok(BoundSql {
            sql: sql.to_string(),
            values: values.clone(),
        }),
        Params::Named(values) => resolve_named(sql, values),
    }
}

fn lookup<'v>(values: &'v [(String, Value)], placeholder: &str) -> Option<&'v Value> {
    let bare = &placeholder[1..];
    values
        .iter()
        .find(|(key, _)| key == bare || key == placeholder)
        .map(|(_, value)| value)
}

fn resolve_named(sql: &str, values: &[(String, Value)]) -> GuardResult<BoundSql> {
    let tokens = tokenize(sql)?;
    let mut out = String::with_capacity(sql.len());
    let mut order: Vec<&str> = Vec::new();
    let mut bound = Vec::new();
    let mut cursor = 0;

    for token in tokens.iter().filter(|t| t.kind == TokenKind::Param) {
        if token.text.starts_with('?') {
            return Err(GuardError::execution_in(
                "Positional placeholders cannot be mixed with named parameters",
                sql,
            ));
        }
        let number = match order.iter().position(|name| *name == token.text) {
            Some(existing) => existing + 1,
            None => {
                let value = lookup(values, token.text).ok_or_else(|| {
                    GuardError::execution_in(
                        format!("No value supplied for parameter {}", token.text),
                        sql,
                    )
                })?;
                order.push(token.text);
                bound.push(value.clone());
                order.len()
            }
        };
        out.push_str(&sql[cursor..token.start]);
        out.push('?');
        out.push_str(&number.to_string());
        cursor = token.end;
    }
    out.push_str(&sql[cursor..]);

    Ok(BoundSql {
        sql: out,
        values: bound,
    })
}

/// Number of positional values `sql` consumes, following SQLite's
/// numbering: `?` takes the next number, `?NNN` takes NNN, and each distinct
/// named parameter takes the next number on first appearance.
pub fn placeholder_count(sql: &str) -> GuardResult<usize> {
    let tokens = tokenize(sql)?;
    let mut highest = 0usize;
    let mut seen: Vec<&str> = Vec::new();

    for token in tokens.iter().filter(|t| t.kind == TokenKind::Param) {
        if token.text == "?" {
            highest += 1;
        } else if let Some(digits) = token.text.strip_prefix('?') {
            let number: usize = digits.parse().map_err(|_| {
                GuardError::execution_in(format!("Invalid placeholder {}", token.text), sql)
            })?;
            highest = highest.max(number);
        } else if !seen.contains(&token.text) {
            seen.push(token.text);
            highest += 1;
        }
    }
    Ok(highest)
}

/// Slices the parameters one fragment of a batch needs
///
/// Positional values are consumed in order across the batch; `cursor`
/// tracks how many have been used so far. Named parameters are shared by
/// every fragment.
pub fn params_for_fragment(
    fragment: &str,
    params: &Params,
    cursor: &mut usize,
) -> GuardResult<Params> {
    match params {
        Params::None => Ok(Params::None),
        Params::Named(values) => Ok(Params::Named(values.clone())),
        Params::Positional(values) => {
            let wanted = placeholder_count(fragment)?;
            let end = *cursor + wanted;
            if end > values.len() {
                return Err(GuardError::execution_in(
                    format!(
                        "Statement needs {} parameters but only {} remain",
                        wanted,
                        values.len().saturating_sub(*cursor)
                    ),
                    fragment,
                ));
            }
            let slice = values[*cursor..end].to_vec();
            *cursor = end;
            Ok(Params::Positional(slice))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_parameters_become_numbered() {
        let params = Params::named([("name", Value::from("ada")), ("age", Value::from(36))]);
        let bound = resolve_params(
            "SELECT * FROM people WHERE name = :name AND (age = @age OR :name = 'x')",
            &params,
        )
        .unwrap();
        assert_eq!(
            bound.sql,
            "SELECT * FROM people WHERE name = ?1 AND (age = ?2 OR ?1 = 'x')"
        );
        assert_eq!(bound.values, vec![Value::from("ada"), Value::from(36)]);
    }

    #[test]
    fn named_keys_may_carry_their_prefix() {
        let params = Params::named([(":id", 4)]);
        let bound = resolve_params("DELETE FROM t WHERE id = :id", &params).unwrap();
        assert_eq!(bound.sql, "DELETE FROM t WHERE id = ?1");
    }

    #[test]
    fn placeholders_inside_literals_are_ignored() {
        let params = Params::named([("a", 1)]);
        let bound = resolve_params("SELECT ':b', :a", &params).unwrap();
        assert_eq!(bound.sql, "SELECT ':b', ?1");
    }

    #[test]
    fn missing_named_value_is_an_execution_error() {
        let params = Params::named([("a", 1)]);
        let err = resolve_params("SELECT :a, :b", &params).unwrap_err();
        assert!(err.is_execution());
    }

    #[test]
    fn counts_follow_sqlite_numbering() {
        assert_eq!(placeholder_count("SELECT 1").unwrap(), 0);
        assert_eq!(placeholder_count("SELECT ?, ?").unwrap(), 2);
        assert_eq!(placeholder_count("SELECT ?3, ?").unwrap(), 4);
        assert_eq!(placeholder_count("SELECT :a, :a, :b").unwrap(), 2);
    }

    #[test]
    fn fragments_consume_positional_values_in_order() {
        let params = Params::positional([1, 2, 3]);
        let mut cursor = 0;
        assert_eq!(
            params_for_fragment("INSERT INTO t VALUES (?)", &params, &mut cursor).unwrap(),
            Params::positional([1])
        );
        assert_eq!(
            params_for_fragment("SELECT 1", &params, &mut cursor).unwrap(),
            Params::Positional(vec![])
        );
        assert_eq!(
            params_for_fragment("INSERT INTO t VALUES (?), (?)", &params, &mut cursor).unwrap(),
            Params::positional([2, 3])
        );
        assert!(params_for_fragment("SELECT ?", &params, &mut cursor).is_err());
    }
}
