// SPDX-License-Identifier: Apache-2.0

//! Table and column reflection
//!
//! A snapshot of the user tables in the main database. It is only refreshed
//! on request, so schema changes made after the last refresh are not visible.

use std::collections::BTreeMap;

use guard_core::{quote_ident, GuardError, GuardResult};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;

/// SQLite type affinity derived from a declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

impl Affinity {
    /// Applies SQLite's affinity rules, in their documented order
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Numeric
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub affinity: Affinity,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    /// The `CREATE TABLE` statement recorded in `sqlite_master`
    pub sql: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Name to descriptor map of the tables in a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    tables: BTreeMap<String, TableDescriptor>,
}

impl Catalog {
    /// Reads every user table and its columns
    pub async fn reflect(conn: &mut SqliteConnection) -> GuardResult<Self> {
        let table_rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| GuardError::execution(e.to_string()))?;

        let mut tables = BTreeMap::new();
        for (name, sql) in table_rows {
            let pragma_query = format!("PRAGMA table_info({})", quote_ident(&name));
            let column_rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
                sqlx::query_as(&pragma_query)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| GuardError::execution_in(e.to_string(), pragma_query.as_str()))?;

            let columns = column_rows
                .into_iter()
                .map(|(_cid, name, declared_type, notnull, dflt_value, pk)| ColumnDescriptor {
                    affinity: Affinity::from_declared(&declared_type),
                    name,
                    declared_type,
                    nullable: notnull == 0,
                    default_value: dflt_value,
                    is_primary_key: pk > 0,
                })
                .collect();

            tables.insert(name.clone(), TableDescriptor { name, sql, columns });
        }

        Ok(Self { tables })
    }

    /// Looks a table up by name. Exact matches win; otherwise the lookup is
    /// case-insensitive, as SQLite identifiers are.
    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name).or_else(|| {
            self.tables
                .values()
                .find(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Column as reported by `pragma_table_xinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredColumn {
    pub name: String,
    pub declared_type: String,
    pub pk: i64,
    /// 0 for ordinary columns, 2 or 3 for generated ones
    pub hidden: i64,
}

impl StoredColumn {
    pub fn is_generated(&self) -> bool {
        self.hidden != 0
    }
}

/// Where a table lives and how it was declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSource {
    pub schema: String,
    pub sql: Option<String>,
    pub columns: Vec<StoredColumn>,
}

impl TableSource {
    /// Resolves `name` the way SQLite does: the given schema, or else temp,
    /// main and attached databases in that order
    pub async fn locate(
        conn: &mut SqliteConnection,
        schema: Option<&str>,
        name: &str,
    ) -> GuardResult<Option<Self>> {
        let schemas = match schema {
            Some(schema) => vec![schema.to_string()],
            None => {
                let rows: Vec<(String,)> = sqlx::query_as(
                    "SELECT name FROM pragma_database_list \
                     ORDER BY CASE name WHEN 'temp' THEN 0 WHEN 'main' THEN 1 ELSE 2 END, seq",
                )
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| GuardError::execution(e.to_string()))?;
                rows.into_iter().map(|(name,)| name).collect()
            }
        };

        for schema in schemas {
            let master = format!(
                "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                quote_ident(&schema)
            );
            let found: Option<(Option<String>,)> = sqlx::query_as(&master)
                .bind(name)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| GuardError::execution_in(e.to_string(), master.as_str()))?;
            let Some((sql,)) = found else {
                continue;
            };

            let pragma = "SELECT name, type, pk, hidden FROM pragma_table_xinfo(?1, ?2)";
            let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(pragma)
                .bind(name)
                .bind(&schema)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| GuardError::execution_in(e.to_string(), pragma))?;
            let columns = rows
                .into_iter()
                .map(|(name, declared_type, pk, hidden)| StoredColumn {
                    name,
                    declared_type,
                    pk,
                    hidden,
                })
                .collect();

            return Ok(Some(Self {
                schema,
                sql,
                columns,
            }));
        }
        Ok(None)
    }

    /// True when an `INTEGER PRIMARY KEY` column stands in for the rowid
    pub fn has_rowid_alias(&self) -> bool {
        let mut keys = self.columns.iter().filter(|c| c.pk > 0);
        match (keys.next(), keys.next()) {
            (Some(key), None) => key.declared_type.eq_ignore_ascii_case("INTEGER"),
            _ => false,
        }
    }

    /// Columns that can be written with INSERT
    pub fn stored_columns(&self) -> impl Iterator<Item = &StoredColumn> {
        self.columns.iter().filter(|c| !c.is_generated())
    }
}
