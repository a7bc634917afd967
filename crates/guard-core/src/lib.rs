// SPDX-License-Identifier: Apache-2.0

//! Core types for guardsql: statement kinds, verdicts, values, results and
//! the error taxonomy shared by every crate in the workspace.

pub mod error;
pub mod ident;
pub mod types;

pub use error::{ClassificationError, GuardError, GuardResult};
pub use ident::{quote_ident, quote_qualified};
pub use types::*;
