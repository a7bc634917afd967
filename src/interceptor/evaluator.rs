// SPDX-License-Identifier: Apache-2.0

//! Danger Evaluator
//!
//! Applies a [`Policy`] to a classified statement. Checks run in a fixed
//! order and stop at the first denial:
//!
//! 1. structural drops (and DELETE/DROP with no recognisable target) while
//!    dropping is disabled
//! 2. banned statement kinds
//! 3. banned syntax fragments
//! 4. for DELETE, the unbounded-delete simulation
//!
//! Multiple statements never reach the evaluator: the classifier refuses
//! them before a [`Statement`] exists.

use async_trait::async_trait;
use guard_core::{DenyReason, GuardResult, StatementKind, Verdict};
use guard_sql::{BoundSql, Statement, TableRef};
use tracing::debug;

use super::policy::Policy;

/// Row counts of the scratch copy around a simulated DELETE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteSimulation {
    pub rows_before: u64,
    pub rows_after: u64,
}

impl DeleteSimulation {
    /// The DELETE emptied a table that had rows
    pub fn removes_every_row(&self) -> bool {
        self.rows_before > 0 && self.rows_after == 0
    }
}

/// Read access to live table contents for the DELETE check
#[async_trait]
pub trait RowProbe: Send {
    async fn row_count(&mut self, table: &TableRef) -> GuardResult<u64>;

    /// Runs `delete` against a throwaway copy of `table`, leaving the real
    /// table untouched
    async fn simulate_delete(
        &mut self,
        table: &TableRef,
        delete: &BoundSql,
    ) -> GuardResult<DeleteSimulation>;
}

/// Renders the verdict for one statement
///
/// `bound` is the statement text and values exactly as they will be
/// executed; the DELETE simulation replays them against the scratch copy.
pub async fn evaluate<P>(
    statement: &Statement,
    bound: &BoundSql,
    policy: &Policy,
    probe: &mut P,
) -> GuardResult<Verdict>
where
    P: RowProbe + ?Sized,
{
    let kind = statement.kind();

    if !policy.allow_dropping() {
        if statement.shape().drops_structure {
            return Ok(Verdict::Deny(DenyReason::DroppingDisabled));
        }
        if kind.is_destructive() && statement.target().is_none() {
            debug!(kind = %kind, "No target found, treating statement as a drop");
            return Ok(Verdict::Deny(DenyReason::DroppingDisabled));
        }
    }

    if policy.is_kind_banned(kind) {
        return Ok(Verdict::Deny(DenyReason::BannedStatementKind));
    }

    if let Some(fragment) = policy.banned_fragment_in(statement.text()) {
        debug!(fragment, "Banned syntax matched");
        return Ok(Verdict::Deny(DenyReason::BannedSyntax));
    }

    if kind == StatementKind::Delete
        && !policy.allow_dropping()
        && policy.check_delete_statements()
    {
        if let Some(target) = statement.target() {
            return check_delete(target, bound, probe).await;
        }
    }

    Ok(Verdict::Allow)
}

async fn check_delete<P>(target: &TableRef, bound: &BoundSql, probe: &mut P) -> GuardResult<Verdict>
where
    P: RowProbe + ?Sized,
{
    let rows = probe.row_count(target).await?;
    if rows == 0 {
        debug!(table = %target, "Target is empty, nothing to protect");
        return Ok(Verdict::Allow);
    }

    let simulation = probe.simulate_delete(target, bound).await?;
    debug!(
        table = %target,
        rows_before = simulation.rows_before,
        rows_after = simulation.rows_after,
        "Delete simulated"
    );

    if simulation.removes_every_row() {
        Ok(Verdict::Deny(DenyReason::UnboundedDelete))
    } else {
        Ok(Verdict::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::GuardError;
    use guard_sql::classify;

    /// Pretends every table holds `rows` rows and that a simulated DELETE
    /// leaves `remaining` of them.
    struct FakeProbe {
        rows: u64,
        remaining: u64,
        fail_simulation: bool,
        counted: usize,
        simulated: usize,
    }

    impl FakeProbe {
        fn new(rows: u64, remaining: u64) -> Self {
            Self {
                rows,
                remaining,
                fail_simulation: false,
                counted: 0,
                simulated: 0,
            }
        }
    }

    #[async_trait]
    impl RowProbe for FakeProbe {
        async fn row_count(&mut self, _table: &TableRef) -> GuardResult<u64> {
            self.counted += 1;
            Ok(self.rows)
        }

        async fn simulate_delete(
            &mut self,
            _table: &TableRef,
            _delete: &BoundSql,
        ) -> GuardResult<DeleteSimulation> {
            self.simulated += 1;
            if self.fail_simulation {
                return Err(GuardError::execution("simulation failed"));
            }
            Ok(DeleteSimulation {
                rows_before: self.rows,
                rows_after: self.remaining,
            })
        }
    }

    async fn verdict(sql: &str, policy: &Policy, probe: &mut FakeProbe) -> GuardResult<Verdict> {
        let statement = classify(sql).unwrap();
        let bound = BoundSql {
            sql: sql.to_string(),
            values: Vec::new(),
        };
        evaluate(&statement, &bound, policy, probe).await
    }

    #[tokio::test]
    async fn test_drop_denied_by_default() {
        let mut probe = FakeProbe::new(2, 2);
        let policy = Policy::default();
        for sql in ["DROP TABLE t", "ALTER TABLE t DROP COLUMN c", "DELETE"] {
            assert_eq!(
                verdict(sql, &policy, &mut probe).await.unwrap(),
                Verdict::Deny(DenyReason::DroppingDisabled),
                "{sql}"
            );
        }
    }

    #[tokio::test]
    async fn test_unbounded_delete_denied() {
        let mut probe = FakeProbe::new(2, 0);
        let policy = Policy::default();
        assert_eq!(
            verdict("DELETE FROM t WHERE 1=1", &policy, &mut probe)
                .await
                .unwrap(),
            Verdict::Deny(DenyReason::UnboundedDelete)
        );
        assert_eq!(probe.simulated, 1);
    }

    #[tokio::test]
    async fn test_partial_delete_allowed() {
        let mut probe = FakeProbe::new(2, 1);
        let verdict = verdict("DELETE FROM t WHERE id = 1", &Policy::default(), &mut probe)
            .await
            .unwrap();
        assert!(verdict.is_allowed());
    }

    #[tokio::test]
    async fn test_empty_table_skips_simulation() {
        let mut probe = FakeProbe::new(0, 0);
        let verdict = verdict("DELETE FROM t", &Policy::default(), &mut probe)
            .await
            .unwrap();
        assert!(verdict.is_allowed());
        assert_eq!(probe.counted, 1);
        assert_eq!(probe.simulated, 0);
    }

    #[tokio::test]
    async fn test_allow_dropping_bypasses_probe() {
        let mut probe = FakeProbe::new(5, 0);
        let mut policy = Policy::default();
        policy.set_allow_dropping(true);
        for sql in ["DELETE FROM t", "DROP TABLE t"] {
            assert!(verdict(sql, &policy, &mut probe).await.unwrap().is_allowed());
        }
        assert_eq!(probe.counted, 0);
    }

    #[tokio::test]
    async fn test_delete_checking_disabled() {
        let mut probe = FakeProbe::new(5, 0);
        let mut policy = Policy::default();
        policy.set_check_delete_statements(false);
        assert!(verdict("DELETE FROM t", &policy, &mut probe)
            .await
            .unwrap()
            .is_allowed());
        assert_eq!(probe.counted, 0);
    }

    #[tokio::test]
    async fn test_check_order() {
        let mut probe = FakeProbe::new(5, 0);
        let mut policy = Policy::default();
        policy.add_banned_kind(StatementKind::Drop);
        // dropping is checked before banned kinds
        assert_eq!(
            verdict("DROP TABLE t", &policy, &mut probe).await.unwrap(),
            Verdict::Deny(DenyReason::DroppingDisabled)
        );

        policy.add_banned_kind(StatementKind::Delete);
        policy.add_banned_syntax("FROM t");
        assert_eq!(
            verdict("DELETE FROM t", &policy, &mut probe).await.unwrap(),
            Verdict::Deny(DenyReason::BannedStatementKind)
        );

        policy.remove_banned_kind(StatementKind::Delete);
        assert_eq!(
            verdict("DELETE FROM t", &policy, &mut probe).await.unwrap(),
            Verdict::Deny(DenyReason::BannedSyntax)
        );
        assert_eq!(probe.counted, 0);
    }

    #[tokio::test]
    async fn test_simulation_errors_propagate() {
        let mut probe = FakeProbe::new(3, 0);
        probe.fail_simulation = true;
        let err = verdict("DELETE FROM t WHERE x", &Policy::default(), &mut probe)
            .await
            .unwrap_err();
        assert!(err.is_execution());
    }
}
