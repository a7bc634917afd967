// SPDX-License-Identifier: Apache-2.0

//! SQLite Engine Adapter
//!
//! Thin layer over a single SQLx `SqliteConnection`: opening, binding,
//! running one statement and converting rows into the shared result types.
//!
//! ## SQLite Specifics
//!
//! - The handle path is a file path, or `:memory:` for an in-memory database
//! - Rollback journal (not WAL) so that a plain file copy is a valid backup
//! - SQLite has dynamic typing, so values are decoded by probing types

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use guard_core::{ColumnInfo, GuardError, GuardResult, ResultSet, Row, RowFactory, Value};
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow,
};
use sqlx::{Column, ConnectOptions, Row as _, TypeInfo};

pub const MEMORY_PATH: &str = ":memory:";

/// Options applied when a handle opens its connection
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Handle name used in logs; defaults to the file stem
    pub name: Option<String>,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
    pub row_factory: RowFactory,
    /// Log every forwarded statement at INFO on `guardsql::query`
    pub query_logger: bool,
    /// Capacity of the per-handle classification cache
    pub classifier_cache_size: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            name: None,
            create_if_missing: false,
            busy_timeout: Duration::from_secs(30),
            foreign_keys: true,
            row_factory: RowFactory::Tuple,
            query_logger: false,
            classifier_cache_size: 256,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn row_factory(mut self, factory: RowFactory) -> Self {
        self.row_factory = factory;
        self
    }

    pub fn query_logger(mut self, enabled: bool) -> Self {
        self.query_logger = enabled;
        self
    }

    pub fn classifier_cache_size(mut self, capacity: usize) -> Self {
        self.classifier_cache_size = capacity;
        self
    }
}

pub fn is_memory_path(path: &str) -> bool {
    let path = path.trim();
    path == MEMORY_PATH || path == "sqlite::memory:"
}

/// Validates the database path before connecting
pub fn validate_path(path: &str, options: &OpenOptions) -> GuardResult<()> {
    if is_memory_path(path) {
        return Ok(());
    }

    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(GuardError::connection_failed(
            "SQLite path cannot be empty.",
        ));
    }
    if trimmed.contains("://") {
        return Err(GuardError::connection_failed(format!(
            "Invalid SQLite path format: {}",
            trimmed
        )));
    }

    let file = Path::new(trimmed);
    if file.is_dir() {
        return Err(GuardError::connection_failed(format!(
            "Path is a directory, not a database file: {}",
            trimmed
        )));
    }
    if !options.create_if_missing && !file.is_file() {
        return Err(GuardError::connection_failed(format!(
            "Database does not exist on path: {}",
            trimmed
        )));
    }

    Ok(())
}

fn build_connect_options(path: &str, options: &OpenOptions) -> SqliteConnectOptions {
    let conn_str = if is_memory_path(path) {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{}", path)
    };

    SqliteConnectOptions::from_str(&conn_str)
        .unwrap_or_else(|_| SqliteConnectOptions::new().filename(path))
        .create_if_missing(options.create_if_missing)
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(options.busy_timeout)
        .foreign_keys(options.foreign_keys)
        .disable_statement_logging()
}

/// Opens the single connection a handle owns
pub async fn connect(path: &str, options: &OpenOptions) -> GuardResult<SqliteConnection> {
    validate_path(path, options)?;
    build_connect_options(path, options)
        .connect()
        .await
        .map_err(|e| GuardError::connection_failed(e.to_string()))
}

/// Binds a value to a SQLite query
fn bind_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Int(i) => query.bind(i),
        Value::Float(f) => query.bind(f),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
    }
}

fn execution_error(err: sqlx::Error, sql: &str) -> GuardError {
    match err {
        sqlx::Error::Database(db) => GuardError::execution_in(db.message(), sql),
        other => GuardError::execution_in(other.to_string(), sql),
    }
}

/// Runs one statement with positional values
///
/// `returns_rows` picks between fetching rows and reporting the affected
/// row count.
pub async fn run_statement(
    conn: &mut SqliteConnection,
    sql: &str,
    values: &[Value],
    returns_rows: bool,
    row_factory: RowFactory,
) -> GuardResult<ResultSet> {
    let start = Instant::now();
    let mut query = sqlx::query(sql);
    for value in values {
        query = bind_param(query, value);
    }

    if !returns_rows {
        let result = query
            .execute(&mut *conn)
            .await
            .map_err(|e| execution_error(e, sql))?;
        let execution_time_ms = start.elapsed().as_micros() as f64 / 1000.0;
        return Ok(ResultSet::with_affected_rows(
            result.rows_affected(),
            execution_time_ms,
        ));
    }

    let sqlite_rows: Vec<SqliteRow> = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| execution_error(e, sql))?;
    let execution_time_ms = start.elapsed().as_micros() as f64 / 1000.0;

    let Some(first) = sqlite_rows.first() else {
        return Ok(ResultSet {
            execution_time_ms,
            ..ResultSet::empty()
        });
    };

    let columns = get_column_info(first);
    let rows = match row_factory {
        RowFactory::Tuple => sqlite_rows.iter().map(convert_row).collect(),
        RowFactory::Named => {
            let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
            sqlite_rows
                .iter()
                .map(|r| Row::with_names(convert_row(r).values, Arc::clone(&names)))
                .collect()
        }
    };

    Ok(ResultSet {
        columns,
        rows,
        affected_rows: None,
        execution_time_ms,
    })
}

/// Runs a statement that binds nothing and returns nothing
pub async fn execute_plain(conn: &mut SqliteConnection, sql: &str) -> GuardResult<u64> {
    sqlx::query(sql)
        .execute(&mut *conn)
        .await
        .map(|r| r.rows_affected())
        .map_err(|e| execution_error(e, sql))
}

/// `SELECT COUNT(*)` over an already quoted table reference
pub async fn count_rows(conn: &mut SqliteConnection, quoted_table: &str) -> GuardResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quoted_table);
    let (count,): (i64,) = sqlx::query_as(&sql)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| execution_error(e, &sql))?;
    Ok(count.max(0) as u64)
}

/// Converts a SQLx row to the shared Row type
fn convert_row(sqlite_row: &SqliteRow) -> Row {
    let values: Vec<Value> = sqlite_row
        .columns()
        .iter()
        .map(|col| extract_value(sqlite_row, col.ordinal()))
        .collect();

    Row::new(values)
}

/// Extracts a value from a SqliteRow at the given index
///
/// SQLite has dynamic typing, so we try multiple types in order of likelihood
fn extract_value(row: &SqliteRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }

    Value::Null
}

/// Gets column info from a SqliteRow
fn get_column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            data_type: col.type_info().name().to_string(),
            nullable: true, // SQLite doesn't expose nullability from row metadata
        })
        .collect()
}
