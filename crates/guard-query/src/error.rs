// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// A builder chain that cannot produce a statement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Identifier must not be empty")]
    EmptyIdentifier,

    #[error("INSERT needs at least one row of values")]
    MissingValues,

    #[error("Row {row} has {got} values but {expected} columns were given")]
    ColumnCountMismatch {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("UPDATE needs at least one SET assignment")]
    NoAssignments,

    #[error("IN list for column {column} is empty")]
    EmptyInList { column: String },

    #[error("HAVING requires GROUP BY")]
    HavingWithoutGroupBy,
}

pub type BuildResult<T> = Result<T, BuildError>;
