// SPDX-License-Identifier: Apache-2.0

//! Execution Gate
//!
//! The single path every statement takes to reach SQLite:
//!
//! classify -> bind -> begin -> evaluate -> run -> commit
//!
//! A denial or any failure before the commit drops the transaction, which
//! rolls back the real statement and the scratch table alike. Failures are
//! then filtered through the handle's [`ErrorMode`].

use std::sync::Arc;

use guard_core::{
    ErrorMode, GuardError, GuardResult, Outcome, Params, ResultSet, RowFactory, Verdict,
};
use guard_sql::lexer::{tokenize, TokenKind};
use guard_sql::{params_for_fragment, resolve_params, split_statements, ClassifierCache, Statement};
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tracing::{debug, error, info};

use super::evaluator::evaluate;
use super::policy::Policy;
use super::probe::ScratchProbe;
use crate::engine::sqlite::{run_statement, OpenOptions};
use crate::observability::Sensitive;

/// Statements that manage transactions themselves
const TRANSACTION_CONTROL: &[&str] = &["BEGIN", "COMMIT", "END", "ROLLBACK", "SAVEPOINT", "RELEASE"];

/// Statements SQLite refuses to run inside a transaction
const OUTSIDE_TRANSACTION: &[&str] = &["VACUUM", "ATTACH", "DETACH"];

fn leading_keyword(statement: &Statement) -> Option<String> {
    let tokens = tokenize(statement.text()).ok()?;
    tokens
        .iter()
        .find(|t| t.kind == TokenKind::Word)
        .map(|t| t.text.to_ascii_uppercase())
}

/// Per-handle execution state: the classification cache and how results are
/// shaped and logged
pub struct Gate {
    handle: String,
    cache: ClassifierCache,
    row_factory: RowFactory,
    query_logger: bool,
}

impl Gate {
    pub fn new(handle: impl Into<String>, options: &OpenOptions) -> Self {
        Self {
            handle: handle.into(),
            cache: ClassifierCache::new(options.classifier_cache_size),
            row_factory: options.row_factory,
            query_logger: options.query_logger,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn row_factory(&self) -> RowFactory {
        self.row_factory
    }

    pub fn set_row_factory(&mut self, factory: RowFactory) {
        self.row_factory = factory;
    }

    pub fn query_logger(&self) -> bool {
        self.query_logger
    }

    pub fn set_query_logger(&mut self, enabled: bool) {
        self.query_logger = enabled;
    }

    /// Classification cache (hits, misses)
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Classifies, evaluates and runs one statement
    ///
    /// Returns the raw result; error-mode filtering is left to [`settle`].
    pub async fn execute(
        &mut self,
        conn: &mut SqliteConnection,
        policy: &Policy,
        sql: &str,
        params: &Params,
    ) -> GuardResult<ResultSet> {
        let statement: Arc<Statement> = self.cache.classify(sql)?;
        let bound = resolve_params(statement.text(), params)?;
        let returns_rows = statement.shape().returns_rows;

        let keyword = leading_keyword(&statement).unwrap_or_default();
        if TRANSACTION_CONTROL.contains(&keyword.as_str()) {
            return Err(GuardError::not_supported(format!(
                "{} is managed by the handle; every statement runs in its own transaction",
                keyword
            )));
        }

        if OUTSIDE_TRANSACTION.contains(&keyword.as_str()) {
            let verdict = evaluate(&statement, &bound, policy, &mut ScratchProbe::new(&mut *conn)).await?;
            if let Verdict::Deny(reason) = verdict {
                return Err(GuardError::security(reason, sql));
            }
            self.log_forwarded(sql, params);
            return run_statement(conn, &bound.sql, &bound.values, returns_rows, self.row_factory)
                .await;
        }

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| GuardError::execution_in(e.to_string(), sql))?;

        let verdict = {
            let mut probe = ScratchProbe::new(&mut *tx);
            evaluate(&statement, &bound, policy, &mut probe).await?
        };

        if let Verdict::Deny(reason) = verdict {
            debug!(handle = %self.handle, reason = ?reason, "Statement denied");
            // dropping `tx` rolls back
            return Err(GuardError::security(reason, sql));
        }

        self.log_forwarded(sql, params);
        let result = run_statement(
            &mut *tx,
            &bound.sql,
            &bound.values,
            returns_rows,
            self.row_factory,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| GuardError::execution_in(e.to_string(), sql))?;

        Ok(result)
    }

    /// Renders the verdict for a statement without running it
    ///
    /// The DELETE simulation still runs, inside a transaction that is always
    /// rolled back.
    pub async fn check(
        &mut self,
        conn: &mut SqliteConnection,
        policy: &Policy,
        sql: &str,
        params: &Params,
    ) -> GuardResult<Verdict> {
        let statement = self.cache.classify(sql)?;
        let bound = resolve_params(statement.text(), params)?;

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| GuardError::execution_in(e.to_string(), sql))?;
        let verdict = {
            let mut probe = ScratchProbe::new(&mut *tx);
            evaluate(&statement, &bound, policy, &mut probe).await?
        };
        tx.rollback()
            .await
            .map_err(|e| GuardError::execution_in(e.to_string(), sql))?;

        Ok(verdict)
    }

    /// Runs each statement of a batch through [`Gate::execute`] in order
    ///
    /// Propagating modes stop at the first failure. Suppressing modes record
    /// the failure and move on to the next statement.
    pub async fn execute_batch(
        &mut self,
        conn: &mut SqliteConnection,
        policy: &Policy,
        sql: &str,
        params: &Params,
        save_result: bool,
    ) -> GuardResult<Outcome> {
        let fragments = split_statements(sql)?;
        let mode = policy.error_mode();
        let mut cursor = 0;
        let mut saved: Option<ResultSet> = None;
        let mut last_affected = None;
        let mut suppressed: Option<GuardError> = None;

        for fragment in fragments {
            let result = match params_for_fragment(fragment, params, &mut cursor) {
                Ok(fragment_params) => self.execute(conn, policy, fragment, &fragment_params).await,
                Err(e) => Err(e),
            };

            match settle(result, mode, &self.handle, fragment, save_result)? {
                Outcome::Rows(rows) => saved = Some(rows),
                Outcome::Done { affected_rows } => last_affected = affected_rows,
                Outcome::Suppressed(err) => suppressed = Some(err),
            }
        }

        Ok(match (saved, suppressed) {
            (Some(rows), _) => Outcome::Rows(rows),
            (None, Some(err)) => Outcome::Suppressed(err),
            (None, None) => Outcome::Done {
                affected_rows: last_affected,
            },
        })
    }

    fn log_forwarded(&self, sql: &str, params: &Params) {
        if self.query_logger {
            info!(
                target: "guardsql::query",
                handle = %self.handle,
                params = ?Sensitive::new(params),
                "{}",
                sql
            );
        }
    }
}

/// Applies the handle's error mode to one statement's result
///
/// Classification failures always propagate: a statement that could not be
/// understood is never reported as "no data".
pub fn settle(
    result: GuardResult<ResultSet>,
    mode: ErrorMode,
    handle: &str,
    sql: &str,
    save_result: bool,
) -> GuardResult<Outcome> {
    let err = match result {
        Ok(rows) if save_result => return Ok(Outcome::Rows(rows)),
        Ok(rows) => {
            return Ok(Outcome::Done {
                affected_rows: rows.affected_rows,
            })
        }
        Err(err) => err,
    };

    if err.is_classification() {
        return Err(err);
    }

    if mode.logs() {
        error!(handle, statement = sql, error = %err, "Statement failed");
    }

    if mode.catches() {
        Ok(Outcome::Suppressed(err))
    } else {
        Err(err)
    }
}
