// SPDX-License-Identifier: Apache-2.0

//! Database handle
//!
//! A [`Database`] owns one SQLite connection, one [`Policy`] and one
//! table catalog. Every method takes `&mut self`, so a handle never has two
//! statements in flight.

use std::path::{Path, PathBuf};

use guard_core::{
    ErrorMode, GuardError, GuardResult, Outcome, Params, ResultSet, RowFactory, StatementKind,
    Verdict,
};
use guard_query::Build;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tracing::{debug, info, instrument};

use crate::backup::{self, DEFAULT_EXTENSION};
use crate::config::{ConfigSource, GuardConfig};
use crate::engine::catalog::{Catalog, TableDescriptor};
use crate::engine::sqlite::{self, is_memory_path, OpenOptions};
use crate::interceptor::{settle, Gate, Policy};

pub struct Database {
    name: String,
    path: String,
    conn: SqliteConnection,
    policy: Policy,
    gate: Gate,
    catalog: Catalog,
    recent_result: Option<ResultSet>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("tables", &self.catalog.len())
            .finish()
    }
}

fn handle_name(path: &str, options: &OpenOptions) -> String {
    if let Some(name) = &options.name {
        return name.clone();
    }
    if is_memory_path(path) {
        return sqlite::MEMORY_PATH.to_string();
    }
    Path::new(path.trim())
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("database")
        .to_string()
}

impl Database {
    /// Opens an existing database file (or `:memory:`) with the default
    /// policy
    pub async fn open(path: &str) -> GuardResult<Self> {
        Self::open_with(path, OpenOptions::default()).await
    }

    #[instrument(skip(options), fields(create_if_missing = options.create_if_missing))]
    pub async fn open_with(path: &str, options: OpenOptions) -> GuardResult<Self> {
        let mut conn = sqlite::connect(path, &options).await?;
        let catalog = Catalog::reflect(&mut conn).await?;
        let name = handle_name(path, &options);

        info!(handle = %name, tables = catalog.len(), "Database opened");
        Ok(Self {
            gate: Gate::new(name.clone(), &options),
            name,
            path: path.trim().to_string(),
            conn,
            policy: Policy::default(),
            catalog,
            recent_result: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_memory(&self) -> bool {
        is_memory_path(&self.path)
    }

    // ==================== Execution ====================

    /// Runs exactly one statement and keeps its result
    pub async fn query(&mut self, sql: &str, params: impl Into<Params>) -> GuardResult<Outcome> {
        self.query_with(sql, params, true).await
    }

    /// Runs exactly one statement
    ///
    /// With `save_result` the result set is returned and kept as
    /// [`Database::recent_result`]; otherwise only the affected row count is
    /// reported.
    #[instrument(skip(self, params), fields(handle = %self.name))]
    pub async fn query_with(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        save_result: bool,
    ) -> GuardResult<Outcome> {
        let params = params.into();
        let result = self
            .gate
            .execute(&mut self.conn, &self.policy, sql, &params)
            .await;
        let outcome = settle(result, self.policy.error_mode(), &self.name, sql, save_result)?;
        self.remember(&outcome);
        Ok(outcome)
    }

    /// Runs every statement in `sql`, in order, each through the same checks
    /// as [`Database::query`]
    ///
    /// Positional parameters are handed out to the statements in order.
    #[instrument(skip(self, params), fields(handle = %self.name))]
    pub async fn multi_query(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        save_result: bool,
    ) -> GuardResult<Outcome> {
        let params = params.into();
        let outcome = self
            .gate
            .execute_batch(&mut self.conn, &self.policy, sql, &params, save_result)
            .await?;
        self.remember(&outcome);
        Ok(outcome)
    }

    /// Builds and runs a query from the fluent builder
    pub async fn run(&mut self, query: &impl Build) -> GuardResult<Outcome> {
        let built = query
            .build()
            .map_err(|e| GuardError::execution(format!("Failed to build query: {}", e)))?;
        let (sql, params) = built.into_params();
        self.query(&sql, params).await
    }

    /// The verdict the current policy gives a statement, without running it
    pub async fn check(&mut self, sql: &str, params: impl Into<Params>) -> GuardResult<Verdict> {
        let params = params.into();
        self.gate
            .check(&mut self.conn, &self.policy, sql, &params)
            .await
    }

    /// The last result set kept by a saving query
    pub fn recent_result(&self) -> Option<&ResultSet> {
        self.recent_result.as_ref()
    }

    fn remember(&mut self, outcome: &Outcome) {
        if let Outcome::Rows(rows) = outcome {
            self.recent_result = Some(rows.clone());
        }
    }

    // ==================== Policy ====================

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn allow_drop(&mut self, allow: bool) {
        self.policy.set_allow_dropping(allow);
    }

    pub fn enable_delete_checking(&mut self, enabled: bool) {
        self.policy.set_check_delete_statements(enabled);
    }

    /// Chooses what happens to security and execution failures
    ///
    /// `enable` swallows them into [`Outcome::Suppressed`]; `logging` logs
    /// them first.
    pub fn error_catch(&mut self, enable: bool, logging: bool) {
        self.policy
            .set_error_mode(ErrorMode::from_flags(enable, logging));
    }

    pub fn add_banned_statement(&mut self, kind: StatementKind) {
        self.policy.add_banned_kind(kind);
    }

    pub fn add_banned_statements(&mut self, kinds: impl IntoIterator<Item = StatementKind>) {
        self.policy.add_banned_kinds(kinds);
    }

    pub fn remove_banned_statement(&mut self, kind: StatementKind) {
        self.policy.remove_banned_kind(kind);
    }

    pub fn remove_banned_statements(&mut self, kinds: impl IntoIterator<Item = StatementKind>) {
        self.policy.remove_banned_kinds(kinds);
    }

    pub fn add_banned_syntax(&mut self, fragment: impl Into<String>) {
        self.policy.add_banned_syntax(fragment);
    }

    pub fn add_banned_syntaxes<I, S>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.add_banned_syntaxes(fragments);
    }

    pub fn remove_banned_syntax(&mut self, fragment: &str) {
        self.policy.remove_banned_syntax(fragment);
    }

    pub fn remove_banned_syntaxes<I, S>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.policy.remove_banned_syntaxes(fragments);
    }

    pub fn query_logging(&mut self, enabled: bool) {
        self.gate.set_query_logger(enabled);
    }

    pub fn set_row_factory(&mut self, factory: RowFactory) {
        self.gate.set_row_factory(factory);
    }

    /// Replaces the policy, row factory and query logger with a loaded
    /// configuration
    pub async fn import_configuration(&mut self, source: ConfigSource<'_>) -> GuardResult<()> {
        let config = source.load().await?;
        self.apply_configuration(&config);
        Ok(())
    }

    pub fn apply_configuration(&mut self, config: &GuardConfig) {
        self.policy = Policy::from_config(config);
        self.gate.set_row_factory(config.row_factory());
        self.gate.set_query_logger(config.default_query_logger);
        debug!(handle = %self.name, policy = ?self.policy, "Configuration applied");
    }

    // ==================== Catalog ====================

    /// Re-reads the table list; needed after schema changes
    pub async fn reload_tables(&mut self) -> GuardResult<()> {
        self.catalog = Catalog::reflect(&mut self.conn).await?;
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.catalog.get(name)
    }

    pub fn tables(&self) -> &Catalog {
        &self.catalog
    }

    // ==================== Lifecycle ====================

    /// Copies the database file into `dir` and returns the new path
    pub async fn backup(&self, dir: impl AsRef<Path>) -> GuardResult<PathBuf> {
        self.backup_with_extension(dir, DEFAULT_EXTENSION).await
    }

    #[instrument(skip(self, dir), fields(handle = %self.name))]
    pub async fn backup_with_extension(
        &self,
        dir: impl AsRef<Path>,
        extension: &str,
    ) -> GuardResult<PathBuf> {
        if self.is_memory() {
            return Err(GuardError::not_supported(
                "In-memory databases cannot be backed up",
            ));
        }
        backup::copy_database(Path::new(&self.path), dir.as_ref(), extension).await
    }

    /// Closes the connection; anything uncommitted is rolled back
    pub async fn close(self) -> GuardResult<()> {
        let name = self.name;
        self.conn
            .close()
            .await
            .map_err(|e| GuardError::execution(format!("Failed to close {}: {}", name, e)))?;
        info!(handle = %name, "Database closed");
        Ok(())
    }
}
