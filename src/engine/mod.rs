// SPDX-License-Identifier: Apache-2.0

//! Engine adapter
//!
//! Everything that talks to SQLite directly: connection setup, statement
//! execution, row conversion and catalog reflection.

pub mod catalog;
pub mod sqlite;

pub use catalog::{Affinity, Catalog, ColumnDescriptor, StoredColumn, TableDescriptor, TableSource};
pub use sqlite::{is_memory_path, OpenOptions, MEMORY_PATH};
