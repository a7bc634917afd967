// SPDX-License-Identifier: Apache-2.0

//! guardsql - guarded SQL execution for SQLite
//!
//! Every statement sent through a [`Database`] handle is classified,
//! checked against the handle's [`Policy`] and only then forwarded to
//! SQLite. Denied statements never run, not even partially:
//!
//! - DROP and `ALTER ... DROP` need explicit permission
//! - a DELETE that would empty a non-empty table is refused
//! - statement kinds and raw syntax fragments can be banned
//! - one call runs one statement unless [`Database::multi_query`] is used
//!
//! ```no_run
//! # async fn demo() -> guardsql::GuardResult<()> {
//! use guardsql::{Database, OpenOptions, Params};
//!
//! let mut db = Database::open_with("shop.db", OpenOptions::new().create_if_missing(true)).await?;
//! db.query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)", ()).await?;
//! db.query("INSERT INTO items (name) VALUES (?)", Params::positional(["pen"])).await?;
//!
//! let err = db.query("DELETE FROM items", ()).await.unwrap_err();
//! assert!(err.is_security());
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod config;
pub mod database;
pub mod engine;
pub mod interceptor;
pub mod observability;

pub use config::{ConfigSource, GuardConfig};
pub use database::Database;
pub use engine::{Catalog, ColumnDescriptor, OpenOptions, TableDescriptor};
pub use interceptor::Policy;

pub use guard_core::{
    ClassificationError, DenyReason, ErrorMode, GuardError, GuardResult, Outcome, Params,
    ResultSet, Row, RowFactory, StatementKind, Value, Verdict,
};
pub use guard_query as query;
pub use guard_sql::{classify, split_statements, Statement};
