// SPDX-License-Identifier: Apache-2.0

//! Statement classifier for guarded SQL execution
//!
//! Lexes SQLite statement text, splits batches on top-level semicolons,
//! determines each statement's kind, target table and shape, and prepares
//! bound parameters for positional execution.

pub mod cache;
pub mod ddl;
pub mod lexer;
pub mod params;
pub mod rewrite;
pub mod statement;

pub use cache::ClassifierCache;
pub use ddl::{scratch_table_definition, ScratchDefinition};
pub use params::{params_for_fragment, placeholder_count, resolve_params, BoundSql};
pub use rewrite::rewrite_delete_target;
pub use statement::{classify, split_statements, Shape, Statement, TableRef};
