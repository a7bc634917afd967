// SPDX-License-Identifier: Apache-2.0

use guard_core::Value;

use crate::error::{BuildError, BuildResult};
use crate::expr::{render_column, render_name, render_returning};
use crate::{Build, BuiltQuery};

/// SQLite conflict resolution (`INSERT OR …`, `UPDATE OR …`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Abort,
    Fail,
    Ignore,
    Replace,
    Rollback,
}

impl OnConflict {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            Self::Abort => "OR ABORT",
            Self::Fail => "OR FAIL",
            Self::Ignore => "OR IGNORE",
            Self::Replace => "OR REPLACE",
            Self::Rollback => "OR ROLLBACK",
        }
    }
}

/// `INSERT` builder
#[derive(Debug, Clone)]
pub struct Insert {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    conflict: Option<OnConflict>,
    returning: Vec<String>,
}

impl Insert {
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            conflict: None,
            returning: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Appends one row of values
    pub fn values<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.conflict = Some(conflict);
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning.extend(columns.into_iter().map(Into::into));
        self
    }
}

impl Build for Insert {
    fn build(&self) -> BuildResult<BuiltQuery> {
        let first = self.rows.first().ok_or(BuildError::MissingValues)?;
        let width = if self.columns.is_empty() {
            first.len()
        } else {
            self.columns.len()
        };
        if width == 0 {
            return Err(BuildError::MissingValues);
        }
        for (row, values) in self.rows.iter().enumerate() {
            if values.len() != width {
                return Err(BuildError::ColumnCountMismatch {
                    row,
                    expected: width,
                    got: values.len(),
                });
            }
        }

        let mut sql = String::from("INSERT ");
        if let Some(conflict) = self.conflict {
            sql.push_str(conflict.as_sql());
            sql.push(' ');
        }
        sql.push_str("INTO ");
        sql.push_str(&render_name(&self.table)?);

        if !self.columns.is_empty() {
            let rendered = self
                .columns
                .iter()
                .map(|c| render_column(c))
                .collect::<BuildResult<Vec<_>>>()?;
            sql.push_str(" (");
            sql.push_str(&rendered.join(", "));
            sql.push(')');
        }

        let row_sql = format!("({})", vec!["?"; width].join(", "));
        sql.push_str(" VALUES ");
        sql.push_str(&vec![row_sql.as_str(); self.rows.len()].join(", "));

        render_returning(&self.returning, &mut sql)?;

        let params = self.rows.iter().flatten().cloned().collect();
        Ok(BuiltQuery { sql, params })
    }
}
