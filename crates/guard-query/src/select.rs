// SPDX-License-Identifier: Apache-2.0

use guard_core::Value;

use crate::error::{BuildError, BuildResult};
use crate::expr::{render_column, render_name, render_where, Condition};
use crate::{Build, BuiltQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum ResultColumn {
    Column(String),
    /// Raw expression such as `COUNT(*) AS n`
    Expr(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    FullOuter,
    Natural,
    Cross,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::FullOuter => "FULL OUTER JOIN",
            Self::Natural => "NATURAL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    /// `None` for a plain comma in the FROM list
    kind: Option<JoinKind>,
    table: String,
    on: Option<Condition>,
}

/// `SELECT` builder
///
/// Calling [`Select::filter`] more than once ANDs the conditions together.
#[derive(Debug, Clone)]
pub struct Select {
    table: String,
    distinct: bool,
    columns: Vec<ResultColumn>,
    joins: Vec<Join>,
    filter: Option<Condition>,
    group_by: Vec<String>,
    having: Option<Condition>,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            distinct: false,
            columns: Vec::new(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Columns to return. With none, every column is returned.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(columns.into_iter().map(|c| ResultColumn::Column(c.into())));
        self
    }

    /// A raw result expression, written verbatim
    pub fn expr(mut self, expr: impl Into<String>) -> Self {
        self.columns.push(ResultColumn::Expr(expr.into()));
        self
    }

    fn push_join(mut self, kind: Option<JoinKind>, table: impl Into<String>, on: Option<Condition>) -> Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            on,
        });
        self
    }

    /// `JOIN table ON cond`
    pub fn join(self, table: impl Into<String>, on: Condition) -> Self {
        self.push_join(Some(JoinKind::Inner), table, Some(on))
    }

    pub fn left_join(self, table: impl Into<String>, on: Condition) -> Self {
        self.push_join(Some(JoinKind::Left), table, Some(on))
    }

    pub fn right_join(self, table: impl Into<String>, on: Condition) -> Self {
        self.push_join(Some(JoinKind::Right), table, Some(on))
    }

    pub fn full_join(self, table: impl Into<String>, on: Condition) -> Self {
        self.push_join(Some(JoinKind::FullOuter), table, Some(on))
    }

    /// `NATURAL JOIN table`, matching on every shared column name
    pub fn natural_join(self, table: impl Into<String>) -> Self {
        self.push_join(Some(JoinKind::Natural), table, None)
    }

    pub fn cross_join(self, table: impl Into<String>) -> Self {
        self.push_join(Some(JoinKind::Cross), table, None)
    }

    /// Adds a table to the FROM list, separated by a comma
    pub fn also_from(self, table: impl Into<String>) -> Self {
        self.push_join(None, table, None)
    }

    pub fn filter(mut self, cond: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
        self
    }

    pub fn or_filter(mut self, cond: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.or(cond),
            None => cond,
        });
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, cond: Condition) -> Self {
        self.having = Some(cond);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl Build for Select {
    fn build(&self) -> BuildResult<BuiltQuery> {
        let mut sql = String::from("SELECT ");
        let mut params: Vec<Value> = Vec::new();

        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let rendered = self
                .columns
                .iter()
                .map(|c| match c {
                    ResultColumn::Column(name) => render_column(name),
                    ResultColumn::Expr(expr) => Ok(expr.clone()),
                })
                .collect::<BuildResult<Vec<_>>>()?;
            sql.push_str(&rendered.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&render_name(&self.table)?);
        for join in &self.joins {
            match join.kind {
                Some(kind) => {
                    sql.push(' ');
                    sql.push_str(kind.keyword());
                    sql.push(' ');
                }
                None => sql.push_str(", "),
            }
            sql.push_str(&render_name(&join.table)?);
            if let Some(on) = &join.on {
                sql.push_str(" ON ");
                on.render(&mut sql, &mut params)?;
            }
        }

        render_where(self.filter.as_ref(), &mut sql, &mut params)?;

        if !self.group_by.is_empty() {
            let rendered = self
                .group_by
                .iter()
                .map(|c| render_column(c))
                .collect::<BuildResult<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&rendered.join(", "));
        }
        if let Some(having) = &self.having {
            if self.group_by.is_empty() {
                return Err(BuildError::HavingWithoutGroupBy);
            }
            sql.push_str(" HAVING ");
            having.render(&mut sql, &mut params)?;
        }

        if !self.order_by.is_empty() {
            let rendered = self
                .order_by
                .iter()
                .map(|(c, order)| {
                    let dir = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    render_column(c).map(|c| format!("{c} {dir}"))
                })
                .collect::<BuildResult<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&rendered.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        Ok(BuiltQuery { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::col;

    #[test]
    fn plain_select_defaults_to_star() {
        let q = Select::from("people").build().unwrap();
        assert_eq!(q.sql, "SELECT * FROM \"people\"");
        assert!(q.params.is_empty());
    }

    #[test]
    fn filters_accumulate_with_and() {
        let q = Select::from("people")
            .columns(["name", "age"])
            .filter(col("age").gt(30))
            .filter(col("name").like("A%"))
            .order_by("age", Order::Desc)
            .limit(10)
            .build()
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"name\", \"age\" FROM \"people\" WHERE (\"age\" > ? AND \"name\" LIKE ?) ORDER BY \"age\" DESC LIMIT 10"
        );
        assert_eq!(q.params, vec![Value::Int(30), Value::from("A%")]);
    }

    #[test]
    fn grouping_and_having() {
        let q = Select::from("people")
            .columns(["city"])
            .expr("COUNT(*) AS n")
            .group_by(["city"])
            .having(Condition::raw_with("COUNT(*) > ?", [2]))
            .build()
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"city\", COUNT(*) AS n FROM \"people\" GROUP BY \"city\" HAVING (COUNT(*) > ?)"
        );
        assert_eq!(q.params, vec![Value::Int(2)]);
    }

    #[test]
    fn having_needs_group_by() {
        let err = Select::from("t")
            .having(Condition::raw("1"))
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::HavingWithoutGroupBy);
    }

    #[test]
    fn joins_render_in_order() {
        let q = Select::from("people")
            .columns(["people.name", "pets.name"])
            .join("pets", Condition::columns_eq("pets.owner_id", "people.id"))
            .distinct()
            .build()
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT DISTINCT \"people\".\"name\", \"pets\".\"name\" FROM \"people\" JOIN \"pets\" ON \"pets\".\"owner_id\" = \"people\".\"id\""
        );
    }

    #[test]
    fn outer_natural_and_cross_joins() {
        let q = Select::from("people")
            .left_join("pets", Condition::columns_eq("pets.owner_id", "people.id"))
            .full_join("cars", Condition::columns_eq("cars.owner_id", "people.id"))
            .natural_join("homes")
            .cross_join("colours")
            .also_from("sizes")
            .build()
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT * FROM \"people\" LEFT JOIN \"pets\" ON \"pets\".\"owner_id\" = \"people\".\"id\" \
             FULL OUTER JOIN \"cars\" ON \"cars\".\"owner_id\" = \"people\".\"id\" \
             NATURAL JOIN \"homes\" CROSS JOIN \"colours\", \"sizes\""
        );

        let q = Select::from("a")
            .right_join("b", Condition::raw_with("b.x > ?", [1]))
            .build()
            .unwrap();
        assert_eq!(q.sql, "SELECT * FROM \"a\" RIGHT JOIN \"b\" ON (b.x > ?)");
        assert_eq!(q.params, vec![Value::Int(1)]);
    }
}
