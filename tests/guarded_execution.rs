// SPDX-License-Identifier: Apache-2.0

//! End-to-end behaviour of a guarded handle over real SQLite databases.

use guardsql::query::{col, Delete, Insert, Order, Select};
use guardsql::{
    ConfigSource, Database, DenyReason, ErrorMode, GuardError, OpenOptions, Outcome, Params,
    RowFactory, StatementKind, Value, Verdict,
};

/// In-memory handle holding `t(id, value)` with rows `(1,2), (2,3)`
async fn seeded() -> Database {
    let mut db = Database::open(":memory:").await.unwrap();
    db.query("CREATE TABLE t (id INTEGER, value INTEGER)", ())
        .await
        .unwrap();
    db.query("INSERT INTO t VALUES (1, 2), (2, 3)", ())
        .await
        .unwrap();
    db
}

async fn rows_of(db: &mut Database, table: &str) -> Vec<Vec<Value>> {
    let sql = format!("SELECT * FROM {} ORDER BY 1", table);
    db.query(&sql, ())
        .await
        .unwrap()
        .into_rows()
        .map(|rs| rs.values())
        .unwrap_or_default()
}

fn pair(a: i64, b: i64) -> Vec<Value> {
    vec![Value::Int(a), Value::Int(b)]
}

fn assert_denied(result: Result<Outcome, GuardError>, reason: DenyReason) {
    match result {
        Err(err) => {
            assert!(err.is_security(), "expected a security error, got {err:?}");
            assert_eq!(err.deny_reason(), Some(reason));
        }
        Ok(outcome) => panic!("expected {reason:?}, got {outcome:?}"),
    }
}

// ==================== Unbounded deletes ====================

#[tokio::test]
async fn test_unbounded_delete_is_denied_and_table_untouched() {
    let mut db = seeded().await;
    for sql in [
        "DELETE FROM t",
        "delete from t where 1=1",
        "DELETE FROM t WHERE true",
        "DELETE FROM \"t\" WHERE id > 0",
        "DELETE FROM main.t WHERE t.id IN (1, 2)",
    ] {
        assert_denied(db.query(sql, ()).await, DenyReason::UnboundedDelete);
        assert_eq!(rows_of(&mut db, "t").await, vec![pair(1, 2), pair(2, 3)], "{sql}");
    }
}

#[tokio::test]
async fn test_partial_delete_removes_exactly_the_matching_rows() {
    let mut db = seeded().await;
    let outcome = db.query("DELETE FROM t WHERE id=1", ()).await.unwrap();
    assert_eq!(outcome.rows().and_then(|rs| rs.affected_rows), Some(1));
    assert_eq!(rows_of(&mut db, "t").await, vec![pair(2, 3)]);
}

#[tokio::test]
async fn test_partial_delete_with_parameters() {
    let mut db = seeded().await;
    db.query(
        "DELETE FROM t WHERE value = :value",
        Params::named([("value", 3)]),
    )
    .await
    .unwrap();
    assert_eq!(rows_of(&mut db, "t").await, vec![pair(1, 2)]);

    // the last row would go, so the same parameterised delete is refused
    assert_denied(
        db.query("DELETE FROM t WHERE id = ?", Params::positional([1]))
            .await,
        DenyReason::UnboundedDelete,
    );
    assert_eq!(rows_of(&mut db, "t").await, vec![pair(1, 2)]);
}

#[tokio::test]
async fn test_delete_on_empty_table_is_allowed() {
    let mut db = Database::open(":memory:").await.unwrap();
    db.query("CREATE TABLE t (id INTEGER, value INTEGER)", ())
        .await
        .unwrap();
    db.query("DELETE FROM t", ()).await.unwrap();
    assert!(rows_of(&mut db, "t").await.is_empty());
}

#[tokio::test]
async fn test_no_scratch_tables_are_left_behind() {
    let mut db = seeded().await;
    let _ = db.query("DELETE FROM t", ()).await;
    db.query("DELETE FROM t WHERE id = 2", ()).await.unwrap();
    let _ = db.query("DELETE FROM t WHERE missing = 1", ()).await;

    let outcome = db
        .query("SELECT COUNT(*) FROM sqlite_temp_master", ())
        .await
        .unwrap();
    assert_eq!(
        outcome.rows().unwrap().rows[0].get(0),
        Some(&Value::Int(0))
    );
}

#[tokio::test]
async fn test_rowid_predicates_on_keyed_tables_are_denied() {
    let mut db = Database::open(":memory:").await.unwrap();
    db.query("CREATE TABLE k (id INTEGER PRIMARY KEY, v TEXT)", ())
        .await
        .unwrap();
    db.query("INSERT INTO k VALUES (10, 'a'), (11, 'b'), (500, 'c')", ())
        .await
        .unwrap();

    for sql in [
        "DELETE FROM k WHERE rowid >= 10",
        "DELETE FROM k WHERE _rowid_ IN (10, 11, 500)",
        "DELETE FROM k WHERE id > 9",
    ] {
        assert_denied(db.query(sql, ()).await, DenyReason::UnboundedDelete);
    }

    db.query("DELETE FROM k WHERE rowid = 500", ()).await.unwrap();
    let ids: Vec<Value> = rows_of(&mut db, "k")
        .await
        .into_iter()
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(ids, vec![Value::Int(10), Value::Int(11)]);
}

#[tokio::test]
async fn test_collated_predicates_are_denied() {
    let mut db = Database::open(":memory:").await.unwrap();
    db.query("CREATE TABLE u (name TEXT COLLATE NOCASE)", ())
        .await
        .unwrap();
    db.query("INSERT INTO u VALUES ('Alice'), ('ALICE')", ())
        .await
        .unwrap();

    assert_denied(
        db.query("DELETE FROM u WHERE name = 'alice'", ()).await,
        DenyReason::UnboundedDelete,
    );
    assert_denied(
        db.query("DELETE FROM u WHERE name IN (?)", Params::positional(["aLiCe"]))
            .await,
        DenyReason::UnboundedDelete,
    );
    assert_eq!(rows_of(&mut db, "u").await.len(), 2);
}

#[tokio::test]
async fn test_tables_with_gaps_in_rowids_are_denied() {
    let mut db = Database::open(":memory:").await.unwrap();
    db.query("CREATE TABLE g (v INTEGER)", ()).await.unwrap();
    db.query("INSERT INTO g (rowid, v) VALUES (3, 1), (90, 2), (7000, 3)", ())
        .await
        .unwrap();

    assert_denied(
        db.query("DELETE FROM g WHERE rowid > 2", ()).await,
        DenyReason::UnboundedDelete,
    );
    assert_eq!(rows_of(&mut db, "g").await.len(), 3);
}

#[tokio::test]
async fn test_delete_checking_can_be_disabled() {
    let mut db = seeded().await;
    db.enable_delete_checking(false);
    db.query("DELETE FROM t", ()).await.unwrap();
    assert!(rows_of(&mut db, "t").await.is_empty());
}

// ==================== Dropping ====================

#[tokio::test]
async fn test_drop_requires_permission() {
    let mut db = seeded().await;
    assert_denied(db.query("DROP TABLE t", ()).await, DenyReason::DroppingDisabled);
    assert_denied(
        db.query("ALTER TABLE t DROP COLUMN value", ()).await,
        DenyReason::DroppingDisabled,
    );
    assert_eq!(rows_of(&mut db, "t").await.len(), 2);
}

#[tokio::test]
async fn test_allow_dropping_bypasses_every_check() {
    let mut db = seeded().await;
    db.allow_drop(true);
    db.query("DELETE FROM t", ()).await.unwrap();
    assert!(rows_of(&mut db, "t").await.is_empty());

    db.query("DROP TABLE t", ()).await.unwrap();
    db.reload_tables().await.unwrap();
    assert!(db.table("t").is_none());
}

// ==================== Banned kinds and syntax ====================

#[tokio::test]
async fn test_banned_kinds_deny_until_removed() {
    let mut db = seeded().await;
    let before = db.policy().clone();

    db.add_banned_statement(StatementKind::Update);
    assert_denied(
        db.query("UPDATE t SET value = 9 WHERE id = 1", ()).await,
        DenyReason::BannedStatementKind,
    );
    assert_eq!(rows_of(&mut db, "t").await, vec![pair(1, 2), pair(2, 3)]);

    db.remove_banned_statement(StatementKind::Update);
    assert_eq!(db.policy(), &before);
    db.query("UPDATE t SET value = 9 WHERE id = 1", ())
        .await
        .unwrap();
    assert_eq!(rows_of(&mut db, "t").await[0], pair(1, 9));
}

#[tokio::test]
async fn test_ban_round_trip_for_every_kind() {
    let mut db = Database::open(":memory:").await.unwrap();
    db.add_banned_statement(StatementKind::Create);
    for kind in StatementKind::ALL {
        let before = db.policy().banned_kinds().clone();
        let was_banned = before.contains(&kind);
        db.add_banned_statement(kind);
        if !was_banned {
            db.remove_banned_statement(kind);
        }
        assert_eq!(db.policy().banned_kinds(), &before, "{kind}");
    }
}

#[tokio::test]
async fn test_banned_syntax() {
    let mut db = seeded().await;
    db.add_banned_syntaxes(["sqlite_master", "randomblob("]);
    assert_denied(
        db.query("SELECT name FROM sqlite_master", ()).await,
        DenyReason::BannedSyntax,
    );
    // fragments are case-sensitive
    db.query("SELECT name FROM SQLITE_MASTER", ()).await.unwrap();

    db.remove_banned_syntax("sqlite_master");
    db.query("SELECT name FROM sqlite_master", ()).await.unwrap();
}

// ==================== Single vs multiple statements ====================

#[tokio::test]
async fn test_query_refuses_multiple_statements() {
    let mut db = seeded().await;
    let err = db
        .query("INSERT INTO t VALUES (3, 4); INSERT INTO t VALUES (4, 5)", ())
        .await
        .unwrap_err();
    assert!(err.is_classification());
    assert_eq!(err.deny_reason(), Some(DenyReason::MultipleStatementsNotAllowed));
    assert_eq!(rows_of(&mut db, "t").await.len(), 2);

    // a trailing semicolon is still one statement
    db.query("SELECT * FROM t;", ()).await.unwrap();
}

#[tokio::test]
async fn test_multi_query_runs_in_order() {
    let mut db = seeded().await;
    let outcome = db
        .multi_query(
            "CREATE TABLE log (n INTEGER);
             INSERT INTO log VALUES (?);
             UPDATE log SET n = n * 10 WHERE n = ?;
             INSERT INTO log VALUES (?);
             SELECT n FROM log ORDER BY rowid",
            Params::positional([1, 1, 2]),
            true,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.rows().unwrap().values(),
        vec![vec![Value::Int(10)], vec![Value::Int(2)]]
    );
    assert_eq!(db.recent_result(), outcome.rows());
}

#[tokio::test]
async fn test_multi_query_checks_every_statement() {
    let mut db = seeded().await;
    assert_denied(
        db.multi_query("INSERT INTO t VALUES (3, 4); DELETE FROM t", (), true)
            .await,
        DenyReason::UnboundedDelete,
    );
    // statements before the denied one already ran
    assert_eq!(rows_of(&mut db, "t").await.len(), 3);
}

// ==================== Error modes ====================

#[tokio::test]
async fn test_suppressing_modes_report_no_data() {
    let mut db = seeded().await;
    db.error_catch(true, true);
    assert_eq!(db.policy().error_mode(), ErrorMode::SuppressAndLog);

    let outcome = db.query("DELETE FROM t", ()).await.unwrap();
    assert_eq!(
        outcome.suppressed_error().and_then(|e| e.deny_reason()),
        Some(DenyReason::UnboundedDelete)
    );

    let outcome = db.query("SELECT * FROM nowhere", ()).await.unwrap();
    assert!(outcome.suppressed_error().unwrap().is_execution());

    // classification failures are never swallowed
    assert!(db.query("SELECT 1; SELECT 2", ()).await.is_err());
    assert!(db.query("SELECT 'open", ()).await.is_err());
}

#[tokio::test]
async fn test_suppressing_multi_query_keeps_going() {
    let mut db = seeded().await;
    db.error_catch(true, false);
    let outcome = db
        .multi_query(
            "DELETE FROM t; INSERT INTO t VALUES (3, 4); SELECT COUNT(*) FROM t",
            (),
            true,
        )
        .await
        .unwrap();
    assert_eq!(outcome.rows().unwrap().rows[0].get(0), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_execution_errors_carry_the_statement() {
    let mut db = seeded().await;
    let err = db
        .query("INSERT INTO t (nope) VALUES (1)", ())
        .await
        .unwrap_err();
    match err {
        GuardError::Execution { statement, .. } => {
            assert_eq!(statement.as_deref(), Some("INSERT INTO t (nope) VALUES (1)"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ==================== Results, builder and dry runs ====================

#[tokio::test]
async fn test_named_rows_and_saved_results() {
    let mut db = seeded().await;
    db.set_row_factory(RowFactory::Named);

    let outcome = db
        .query_with("SELECT id, value FROM t WHERE id = ?", Params::positional([2]), true)
        .await
        .unwrap();
    let rows = outcome.rows().unwrap();
    assert_eq!(rows.rows[0].get_named("VALUE"), Some(&Value::Int(3)));
    let named = rows.named_rows().unwrap();
    assert_eq!(named[0]["id"], &Value::Int(2));

    let outcome = db
        .query_with("UPDATE t SET value = 0 WHERE id = 2", (), false)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Done { affected_rows: Some(1) }));
    // only saving calls replace the recent result
    assert_eq!(db.recent_result().unwrap().len(), 1);
}

#[tokio::test]
async fn test_builder_queries_go_through_the_gate() {
    let mut db = seeded().await;
    db.run(&Insert::into("t").columns(["id", "value"]).values([3, 4]))
        .await
        .unwrap();

    let outcome = db
        .run(
            &Select::from("t")
                .columns(["id"])
                .filter(col("value").ge(3))
                .order_by("id", Order::Desc),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome.rows().unwrap().values(),
        vec![vec![Value::Int(3)], vec![Value::Int(2)]]
    );

    assert_denied(db.run(&Delete::from("t")).await, DenyReason::UnboundedDelete);
    db.run(&Delete::from("t").filter(col("id").eq(3)))
        .await
        .unwrap();
    assert_eq!(rows_of(&mut db, "t").await.len(), 2);
}

#[tokio::test]
async fn test_check_is_a_dry_run() {
    let mut db = seeded().await;
    assert_eq!(
        db.check("DELETE FROM t", ()).await.unwrap(),
        Verdict::Deny(DenyReason::UnboundedDelete)
    );
    assert_eq!(
        db.check("DELETE FROM t WHERE id = 1", ()).await.unwrap(),
        Verdict::Allow
    );
    assert_eq!(rows_of(&mut db, "t").await.len(), 2);
}

#[tokio::test]
async fn test_handles_do_not_share_policy() {
    let mut a = seeded().await;
    let mut b = seeded().await;
    a.allow_drop(true);
    a.query("DELETE FROM t", ()).await.unwrap();
    assert_denied(b.query("DELETE FROM t", ()).await, DenyReason::UnboundedDelete);
}

// ==================== Files: open, config, backup, catalog ====================

#[tokio::test]
async fn test_missing_file_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.db");
    let err = Database::open(path.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, GuardError::ConnectionFailed { .. }));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_file_database_backup_and_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    let path_str = path.to_str().unwrap();

    let mut db = Database::open_with(path_str, OpenOptions::new().create_if_missing(true))
        .await
        .unwrap();
    assert_eq!(db.name(), "shop");
    db.query(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        (),
    )
    .await
    .unwrap();
    db.query("INSERT INTO items (name) VALUES ('pen')", ())
        .await
        .unwrap();

    assert!(db.table("items").is_none());
    db.reload_tables().await.unwrap();
    let items = db.table("items").unwrap();
    assert_eq!(items.column_names(), vec!["id", "name"]);
    assert_eq!(items.primary_key(), vec!["id"]);

    let backup = db.backup(dir.path().join("backups")).await.unwrap();
    db.close().await.unwrap();

    let mut copy = Database::open(backup.to_str().unwrap()).await.unwrap();
    assert_eq!(copy.tables().names().collect::<Vec<_>>(), vec!["items"]);
    assert_eq!(rows_of(&mut copy, "items").await.len(), 1);
}

#[tokio::test]
async fn test_memory_databases_cannot_be_backed_up() {
    let db = Database::open(":memory:").await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        db.backup(dir.path()).await,
        Err(GuardError::NotSupported { .. })
    ));
}

#[tokio::test]
async fn test_import_configuration() {
    let mut db = seeded().await;
    db.import_configuration(ConfigSource::Json(
        r#"{
            "allow_dropping": false,
            "check_delete_statements": true,
            "error_catching": false,
            "error_logging": true,
            "banned_statements": ["insert"],
            "banned_syntax": ["--"],
            "default_query_logger": true,
            "default_row_factory": true
        }"#,
    ))
    .await
    .unwrap();

    assert_eq!(db.policy().error_mode(), ErrorMode::LogAndPropagate);
    assert_denied(
        db.query("INSERT INTO t VALUES (5, 6)", ()).await,
        DenyReason::BannedStatementKind,
    );
    assert_denied(
        db.query("SELECT * FROM t -- comment", ()).await,
        DenyReason::BannedSyntax,
    );
    let outcome = db.query("SELECT * FROM t", ()).await.unwrap();
    assert!(outcome.rows().unwrap().rows[0].is_named());

    let err = db
        .import_configuration(ConfigSource::Json(r#"{"allow_dropping": true}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Config { .. }));
    // a failed import leaves the policy alone
    assert!(db.policy().is_kind_banned(StatementKind::Insert));
}
