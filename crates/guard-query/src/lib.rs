// SPDX-License-Identifier: Apache-2.0

//! Fluent SQLite query builder
//!
//! Builders accumulate clauses and render a statement plus its bound values
//! in one [`Build::build`] call. Identifiers are always quoted and values
//! are always bound as `?` placeholders, never spliced into the text.
//!
//! ```
//! use guard_query::{col, Build, Select};
//!
//! let query = Select::from("people")
//!     .columns(["name"])
//!     .filter(col("age").gt(30))
//!     .build()
//!     .unwrap();
//! assert_eq!(query.sql, "SELECT \"name\" FROM \"people\" WHERE \"age\" > ?");
//! ```

pub mod delete;
pub mod error;
pub mod expr;
pub mod insert;
pub mod select;
pub mod update;

use guard_core::{Params, Value};

pub use delete::Delete;
pub use error::{BuildError, BuildResult};
pub use expr::{col, Column, CompareOp, Condition};
pub use insert::{Insert, OnConflict};
pub use select::{JoinKind, Order, Select};
pub use update::Update;

/// A rendered statement and the values for its placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl BuiltQuery {
    pub fn into_params(self) -> (String, Params) {
        let params = if self.params.is_empty() {
            Params::None
        } else {
            Params::Positional(self.params)
        };
        (self.sql, params)
    }
}

/// Anything that renders to a single statement
pub trait Build {
    fn build(&self) -> BuildResult<BuiltQuery>;
}
