// SPDX-License-Identifier: Apache-2.0

use guard_core::Value;

use crate::error::{BuildError, BuildResult};
use crate::expr::{render_name, render_returning, render_where, Condition};
use crate::insert::OnConflict;
use crate::{Build, BuiltQuery};

/// `UPDATE` builder
///
/// Assignments take bare column names; SQLite does not accept a table
/// qualifier on the left of `SET`.
#[derive(Debug, Clone)]
pub struct Update {
    table: String,
    conflict: Option<OnConflict>,
    assignments: Vec<(String, Value)>,
    filter: Option<Condition>,
    returning: Vec<String>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conflict: None,
            assignments: Vec::new(),
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.conflict = Some(conflict);
        self
    }

    pub fn filter(mut self, cond: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
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

impl Build for Update {
    fn build(&self) -> BuildResult<BuiltQuery> {
        if self.assignments.is_empty() {
            return Err(BuildError::NoAssignments);
        }

        let mut sql = String::from("UPDATE ");
        let mut params = Vec::with_capacity(self.assignments.len());
        if let Some(conflict) = self.conflict {
            sql.push_str(conflict.as_sql());
            sql.push(' ');
        }
        sql.push_str(&render_name(&self.table)?);

        sql.push_str(" SET ");
        for (idx, (column, value)) in self.assignments.iter().enumerate() {
            if column.is_empty() {
                return Err(BuildError::EmptyIdentifier);
            }
            if idx > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&guard_core::quote_ident(column));
            sql.push_str(" = ?");
            params.push(value.clone());
        }

        render_where(self.filter.as_ref(), &mut sql, &mut params)?;
        render_returning(&self.returning, &mut sql)?;

        Ok(BuiltQuery { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::col;

    #[test]
    fn set_then_filter_keeps_param_order() {
        let q = Update::table("people")
            .set("age", 37)
            .set("name", "ada l.")
            .filter(col("id").eq(1))
            .build()
            .unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"people\" SET \"age\" = ?, \"name\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(
            q.params,
            vec![Value::Int(37), Value::from("ada l."), Value::Int(1)]
        );
    }

    #[test]
    fn needs_an_assignment() {
        assert_eq!(
            Update::table("people").build().unwrap_err(),
            BuildError::NoAssignments
        );
    }

    #[test]
    fn conflict_clause_precedes_the_table() {
        let q = Update::table("people")
            .on_conflict(OnConflict::Replace)
            .set("age", 1)
            .build()
            .unwrap();
        assert!(q.sql.starts_with("UPDATE OR REPLACE \"people\""));
    }
}
