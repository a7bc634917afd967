// SPDX-License-Identifier: Apache-2.0

use crate::error::BuildResult;
use crate::expr::{render_name, render_returning, render_where, Condition};
use crate::{Build, BuiltQuery};

/// `DELETE` builder
///
/// A delete without a filter builds fine; whether it may run is decided by
/// the policy of the database it is submitted to.
#[derive(Debug, Clone)]
pub struct Delete {
    table: String,
    filter: Option<Condition>,
    returning: Vec<String>,
}

impl Delete {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            returning: Vec::new(),
        }
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

impl Build for Delete {
    fn build(&self) -> BuildResult<BuiltQuery> {
        let mut sql = String::from("DELETE FROM ");
        let mut params = Vec::new();
        sql.push_str(&render_name(&self.table)?);
        render_where(self.filter.as_ref(), &mut sql, &mut params)?;
        render_returning(&self.returning, &mut sql)?;
        Ok(BuiltQuery { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::col;
    use guard_core::Value;

    #[test]
    fn filtered_delete() {
        let q = Delete::from("main.people")
            .filter(col("age").lt(18))
            .returning(["id"])
            .build()
            .unwrap();
        assert_eq!(
            q.sql,
            "DELETE FROM \"main\".\"people\" WHERE \"age\" < ? RETURNING \"id\""
        );
        assert_eq!(q.params, vec![Value::Int(18)]);
    }

    #[test]
    fn unfiltered_delete_still_builds() {
        let q = Delete::from("people").build().unwrap();
        assert_eq!(q.sql, "DELETE FROM \"people\"");
    }
}
