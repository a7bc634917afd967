// SPDX-License-Identifier: Apache-2.0

//! Column references and filter conditions

use guard_core::{quote_ident, Value};

use crate::error::{BuildError, BuildResult};

/// Renders a column reference: `*`, `name` or `table.name`
pub(crate) fn render_column(name: &str) -> BuildResult<String> {
    if name == "*" {
        return Ok("*".to_string());
    }
    match name.rsplit_once('.') {
        Some((table, "*")) if !table.is_empty() => Ok(format!("{}.*", render_name(table)?)),
        Some((table, column)) if !table.is_empty() && !column.is_empty() => {
            Ok(format!("{}.{}", render_name(table)?, quote_ident(column)))
        }
        _ => render_name(name),
    }
}

/// Renders a table name, honouring a `schema.` prefix
pub(crate) fn render_name(name: &str) -> BuildResult<String> {
    if name.is_empty() {
        return Err(BuildError::EmptyIdentifier);
    }
    Ok(guard_core::quote_qualified(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl CompareOp {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// A column to compare against
///
/// ```
/// use guard_query::col;
///
/// let adults = col("age").ge(18).and(col("name").is_not_null());
/// ```
#[derive(Debug, Clone)]
pub struct Column(String);

/// Shorthand for [`Column::new`]
pub fn col(name: impl Into<String>) -> Column {
    Column::new(name)
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Condition {
        Condition::Compare {
            column: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Ge, value)
    }

    pub fn like(self, pattern: impl Into<String>) -> Condition {
        self.compare(CompareOp::Like, Value::Text(pattern.into()))
    }

    pub fn is_in<I, V>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In {
            column: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(self) -> Condition {
        Condition::IsNull {
            column: self.0,
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Condition {
        Condition::IsNull {
            column: self.0,
            negated: true,
        }
    }
}

/// A boolean expression usable in WHERE, ON and HAVING clauses
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    /// Column-to-column comparison, mostly for join constraints
    Columns {
        left: String,
        op: CompareOp,
        right: String,
    },
    /// Caller-written SQL with its own `?` placeholders
    Raw { sql: String, params: Vec<Value> },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn raw_with<I, V>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Raw {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// `left = right` between two columns
    pub fn columns_eq(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::Columns {
            left: left.into(),
            op: CompareOp::Eq,
            right: right.into(),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            this => Self::And(vec![this, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            this => Self::Or(vec![this, other]),
        }
    }

    pub(crate) fn render(&self, out: &mut String, params: &mut Vec<Value>) -> BuildResult<()> {
        match self {
            Self::Compare { column, op, value } => {
                out.push_str(&render_column(column)?);
                out.push(' ');
                out.push_str(op.as_sql());
                out.push_str(" ?");
                params.push(value.clone());
            }
            Self::In { column, values } => {
                if values.is_empty() {
                    return Err(BuildError::EmptyInList {
                        column: column.clone(),
                    });
                }
                out.push_str(&render_column(column)?);
                out.push_str(" IN (");
                out.push_str(&vec!["?"; values.len()].join(", "));
                out.push(')');
                params.extend(values.iter().cloned());
            }
            Self::IsNull { column, negated } => {
                out.push_str(&render_column(column)?);
                out.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Self::Columns { left, op, right } => {
                out.push_str(&render_column(left)?);
                out.push(' ');
                out.push_str(op.as_sql());
                out.push(' ');
                out.push_str(&render_column(right)?);
            }
            Self::Raw { sql, params: raw } => {
                out.push('(');
                out.push_str(sql);
                out.push(')');
                params.extend(raw.iter().cloned());
            }
            Self::And(parts) => render_joined(parts, " AND ", out, params)?,
            Self::Or(parts) => render_joined(parts, " OR ", out, params)?,
        }
        Ok(())
    }
}

fn render_joined(
    parts: &[Condition],
    separator: &str,
    out: &mut String,
    params: &mut Vec<Value>,
) -> BuildResult<()> {
    out.push('(');
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            out.push_str(separator);
        }
        part.render(out, params)?;
    }
    out.push(')');
    Ok(())
}

/// Renders `WHERE <cond>` when a condition is present
pub(crate) fn render_where(
    filter: Option<&Condition>,
    out: &mut String,
    params: &mut Vec<Value>,
) -> BuildResult<()> {
    if let Some(cond) = filter {
        out.push_str(" WHERE ");
        cond.render(out, params)?;
    }
    Ok(())
}

/// Renders ` RETURNING a, b` when columns were requested
pub(crate) fn render_returning(columns: &[String], out: &mut String) -> BuildResult<()> {
    if columns.is_empty() {
        return Ok(());
    }
    let rendered = columns
        .iter()
        .map(|c| render_column(c))
        .collect::<BuildResult<Vec<_>>>()?;
    out.push_str(" RETURNING ");
    out.push_str(&rendered.join(", "));
    Ok(())
}
