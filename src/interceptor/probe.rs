// SPDX-License-Identifier: Apache-2.0

//! Scratch-table row probe
//!
//! Answers the evaluator's questions against the live connection. A DELETE
//! is simulated by copying the target into a uniquely named TEMP table that
//! shares its definition, replaying the DELETE against the copy and counting
//! what is left.

use async_trait::async_trait;
use guard_core::{quote_ident, GuardError, GuardResult, RowFactory};
use guard_sql::{rewrite_delete_target, scratch_table_definition, BoundSql, TableRef};
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use super::evaluator::{DeleteSimulation, RowProbe};
use crate::engine::catalog::TableSource;
use crate::engine::sqlite::{count_rows, execute_plain, run_statement};

const SCRATCH_PREFIX: &str = "guard_scratch_";

/// Row probe bound to a connection, normally the gate's open transaction
pub struct ScratchProbe<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ScratchProbe<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Creates `scratch` with the target's own definition and fills it with
    /// the target's rows, rowids included
    async fn create_scratch(
        &mut self,
        table: &TableRef,
        scratch: &str,
        scratch_ref: &str,
    ) -> GuardResult<()> {
        let source = TableSource::locate(&mut *self.conn, table.schema.as_deref(), &table.name).await?;
        let definition = source
            .as_ref()
            .and_then(|s| s.sql.as_deref())
            .and_then(|sql| scratch_table_definition(sql, scratch));

        let (Some(source), Some(definition)) = (source, definition) else {
            warn!(table = %table, "No table definition to copy, using a plain row copy");
            execute_plain(
                &mut *self.conn,
                &format!(
                    "CREATE TEMP TABLE {} AS SELECT * FROM {}",
                    quote_ident(scratch),
                    table.quoted()
                ),
            )
            .await?;
            return Ok(());
        };

        execute_plain(&mut *self.conn, &definition.sql).await?;

        let mut columns: Vec<String> = source
            .stored_columns()
            .map(|c| quote_ident(&c.name))
            .collect();
        if !definition.without_rowid && !source.has_rowid_alias() {
            columns.insert(0, "rowid".to_string());
        }
        let columns = columns.join(", ");
        execute_plain(
            &mut *self.conn,
            &format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}.{}",
                scratch_ref,
                columns,
                columns,
                quote_ident(&source.schema),
                quote_ident(&table.name)
            ),
        )
        .await?;
        Ok(())
    }

    async fn replay(
        &mut self,
        scratch_ref: &str,
        rewritten: &str,
        delete: &BoundSql,
    ) -> GuardResult<DeleteSimulation> {
        let rows_before = count_rows(&mut *self.conn, scratch_ref).await?;
        run_statement(&mut *self.conn, rewritten, &delete.values, false, RowFactory::Tuple).await?;
        let rows_after = count_rows(&mut *self.conn, scratch_ref).await?;
        Ok(DeleteSimulation {
            rows_before,
            rows_after,
        })
    }
}

/// A fresh scratch table name; unique without relying on the clock or on
/// what else exists in the temp schema
pub fn scratch_name() -> String {
    format!("{}{}", SCRATCH_PREFIX, Uuid::new_v4().simple())
}

#[async_trait]
impl RowProbe for ScratchProbe<'_> {
    async fn row_count(&mut self, table: &TableRef) -> GuardResult<u64> {
        count_rows(&mut *self.conn, &table.quoted()).await
    }

    async fn simulate_delete(
        &mut self,
        table: &TableRef,
        delete: &BoundSql,
    ) -> GuardResult<DeleteSimulation> {
        let scratch = scratch_name();
        let scratch_ref = format!("temp.{}", quote_ident(&scratch));
        let rewritten = rewrite_delete_target(&delete.sql, table, &scratch).ok_or_else(|| {
            GuardError::execution_in(
                format!("Could not locate DELETE target {} for simulation", table),
                delete.sql.as_str(),
            )
        })?;

        let created = self.create_scratch(table, &scratch, &scratch_ref).await;
        let outcome = match created {
            Ok(()) => {
                debug!(table = %table, scratch = %scratch, "Scratch copy created");
                self.replay(&scratch_ref, &rewritten, delete).await
            }
            Err(e) => Err(e),
        };

        let dropped = execute_plain(&mut *self.conn, &format!("DROP TABLE IF EXISTS {}", scratch_ref)).await;
        if let Err(ref e) = dropped {
            // the enclosing transaction rolls back and takes the table with it
            warn!(scratch = %scratch, error = %e, "Failed to drop scratch table");
        }

        let simulation = outcome?;
        dropped?;
        Ok(simulation)
    }
}
