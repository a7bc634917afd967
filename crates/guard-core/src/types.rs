// SPDX-License-Identifier: Apache-2.0

//! Shared types for guarded statement execution
//!
//! Statement kinds, policy verdicts, bound values and result sets. These are
//! the vocabulary every other crate in the workspace speaks.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// Coarse category of a SQL statement, taken from its leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Create,
    Other,
}

impl StatementKind {
    pub const ALL: [StatementKind; 7] = [
        Self::Select,
        Self::Insert,
        Self::Update,
        Self::Delete,
        Self::Drop,
        Self::Create,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Drop => "DROP",
            Self::Create => "CREATE",
            Self::Other => "OTHER",
        }
    }

    /// Returns true if this kind of statement modifies data or schema
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Select)
    }

    /// Returns true if this kind of statement can remove data or structure
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Drop | Self::Delete)
    }
}

impl Default for StatementKind {
    fn default() -> Self {
        Self::Other
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| GuardError::config(format!("Unknown statement kind: '{}'", s)))
    }
}

/// Why a statement was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DroppingDisabled,
    BannedStatementKind,
    BannedSyntax,
    UnboundedDelete,
    MultipleStatementsNotAllowed,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::DroppingDisabled => "Dropping is disabled on this database",
            Self::BannedStatementKind => "Statement kind is banned on this database",
            Self::BannedSyntax => "Statement contains banned syntax",
            Self::UnboundedDelete => "DELETE would remove every row of the table",
            Self::MultipleStatementsNotAllowed => {
                "Multiple statements not allowed in query(), use multi_query()"
            }
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of evaluating one statement against a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(*reason),
        }
    }
}

/// How a handle surfaces security and execution failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Return every failure to the caller untouched
    Propagate,
    /// Log the failure, then return it
    LogAndPropagate,
    /// Log the failure and report "no data"
    SuppressAndLog,
    /// Report "no data" without logging
    SuppressSilent,
}

impl ErrorMode {
    /// Maps the `error_catching` / `error_logging` configuration pair
    pub fn from_flags(catching: bool, logging: bool) -> Self {
        match (catching, logging) {
            (false, false) => Self::Propagate,
            (false, true) => Self::LogAndPropagate,
            (true, true) => Self::SuppressAndLog,
            (true, false) => Self::SuppressSilent,
        }
    }

    pub fn catches(&self) -> bool {
        matches!(self, Self::SuppressAndLog | Self::SuppressSilent)
    }

    pub fn logs(&self) -> bool {
        matches!(self, Self::LogAndPropagate | Self::SuppressAndLog)
    }
}

impl Default for ErrorMode {
    fn default() -> Self {
        Self::Propagate
    }
}

/// Whether result rows carry their column names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFactory {
    /// Rows are plain value tuples
    Tuple,
    /// Rows can be read by column name
    Named,
}

impl Default for RowFactory {
    fn default() -> Self {
        Self::Tuple
    }
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Parameters bound to a statement
///
/// Positional values fill `?` / `?NNN` placeholders; named values fill
/// `:name`, `@name` and `$name` placeholders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Positional(values) => values.is_empty(),
            Self::Named(values) => values.is_empty(),
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A single row of data (indexed by column order)
///
/// Rows produced under [`RowFactory::Named`] also carry the column names and
/// can be read with [`Row::get_named`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    #[serde(skip)]
    names: Option<Arc<[String]>>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            names: None,
        }
    }

    pub fn with_names(values: Vec<Value>, names: Arc<[String]>) -> Self {
        Self {
            values,
            names: Some(names),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Looks a value up by column name (case-insensitive). Always `None` for
    /// tuple rows.
    pub fn get_named(&self, column: &str) -> Option<&Value> {
        let names = self.names.as_ref()?;
        names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn is_named(&self) -> bool {
        self.names.is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of executing one statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column information
    pub columns: Vec<ColumnInfo>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Number of affected rows (for INSERT/UPDATE/DELETE)
    pub affected_rows: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
            execution_time_ms: 0.0,
        }
    }

    pub fn with_affected_rows(affected: u64, time_ms: f64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: Some(affected),
            execution_time_ms: time_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as plain value vectors, in column order
    pub fn values(&self) -> Vec<Vec<Value>> {
        self.rows.iter().map(|row| row.values.clone()).collect()
    }

    /// Rows keyed by column name, or `None` when the rows were produced as
    /// plain tuples
    pub fn named_rows(&self) -> Option<Vec<BTreeMap<&str, &Value>>> {
        if self.rows.iter().any(|row| !row.is_named()) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| {
                    self.columns
                        .iter()
                        .map(|c| c.name.as_str())
                        .zip(row.values.iter())
                        .collect()
                })
                .collect(),
        )
    }
}

/// What a guarded call hands back to its caller
#[derive(Debug)]
pub enum Outcome {
    /// The statement ran and its result set was kept
    Rows(ResultSet),
    /// The statement ran; nothing was kept
    Done { affected_rows: Option<u64> },
    /// The statement failed and the handle's error mode swallowed the failure
    Suppressed(GuardError),
}

impl Outcome {
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<ResultSet> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed(_))
    }

    pub fn suppressed_error(&self) -> Option<&GuardError> {
        match self {
            Self::Suppressed(err) => Some(err),
            _ => None,
        }
    }
}
