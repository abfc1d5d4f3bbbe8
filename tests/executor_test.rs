//! Integration tests for the SQL executor.
//!
//! Tests verify that:
//! - Placeholder/argument mismatches fail before touching the database
//! - Row limits stop reading early
//! - Non-autocommit writes roll back when the statement fails
//! - Explicit transactions commit, roll back, and roll back on drop

use std::time::Duration;
use tempfile::TempDir;
use tinyorm::{DbError, Pool, PoolConfig, QueryExecutor, Value};
use tokio_test::{assert_err, assert_ok};

async fn setup(dir: &TempDir, autocommit: bool, maxsize: u32) -> QueryExecutor {
    let path = dir.path().join("exec.db");
    let config = PoolConfig::sqlite(path.to_str().unwrap())
        .with_size(1, maxsize)
        .with_autocommit(autocommit);
    let pool = Pool::connect(config).await.unwrap();
    let executor = QueryExecutor::new(pool);
    executor
        .execute_with(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL, qty BIGINT)",
            &[],
            true,
        )
        .await
        .unwrap();
    executor
}

async fn insert(executor: &QueryExecutor, id: i64, label: &str) -> Result<u64, DbError> {
    executor
        .execute(
            "INSERT INTO `items` (`id`,`label`,`qty`) VALUES (?,?,?)",
            &[Value::Int(id), Value::from(label), Value::Int(id * 10)],
        )
        .await
}

async fn count(executor: &QueryExecutor) -> i64 {
    let rows = executor
        .select("SELECT count(*) AS n FROM `items`", &[], None)
        .await
        .unwrap();
    rows[0]["n"].as_i64().unwrap()
}

#[tokio::test]
async fn test_arity_mismatch_is_binding_error() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2).await;

    let err = assert_err!(
        executor
            .select("SELECT * FROM `items` WHERE `id`=?", &[], None)
            .await
    );
    assert!(matches!(err, DbError::Binding { .. }));

    let err = assert_err!(
        executor
            .execute("DELETE FROM `items`", &[Value::Int(1)])
            .await
    );
    assert!(matches!(err, DbError::Binding { .. }));

    // Question marks inside literals are not placeholders
    assert_ok!(
        executor
            .execute(
                "INSERT INTO `items` (`id`,`label`) VALUES (?, 'what?')",
                &[Value::Int(1)]
            )
            .await
    );
}

#[tokio::test]
async fn test_select_decodes_values() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2).await;
    insert(&executor, 7, "seven").await.unwrap();

    let rows = executor
        .select("SELECT `id`,`label`,`qty` FROM `items` WHERE `id`=?", &[Value::Int(7)], None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Value::Int(7));
    assert_eq!(rows[0]["label"], Value::from("seven"));
    assert_eq!(rows[0]["qty"], Value::Int(70));
}

#[tokio::test]
async fn test_row_limit() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2).await;
    for id in 0..10 {
        insert(&executor, id, "item").await.unwrap();
    }

    let rows = executor
        .select("SELECT `id` FROM `items` ORDER BY `id`", &[], Some(3))
        .await
        .unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, [0, 1, 2]);

    let rows = executor
        .select("SELECT `id` FROM `items`", &[], None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 10);
}

#[tokio::test]
async fn test_affected_rows() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2).await;
    for id in 0..5 {
        insert(&executor, id, if id < 3 { "low" } else { "high" }).await.unwrap();
    }

    let affected = executor
        .execute(
            "UPDATE `items` SET `qty`=0 WHERE `label`=?",
            &[Value::from("low")],
        )
        .await
        .unwrap();
    assert_eq!(affected, 3);

    let affected = executor
        .execute("DELETE FROM `items` WHERE `id`=?", &[Value::Int(99)])
        .await
        .unwrap();
    assert_eq!(affected, 0);
}

#[tokio::test]
async fn test_failed_write_without_autocommit_leaves_state_unchanged() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, false, 2).await;
    assert!(!executor.pool().autocommit().await.unwrap());

    assert_eq!(insert(&executor, 1, "first").await.unwrap(), 1);
    assert_eq!(count(&executor).await, 1);

    // Second row collides with the first, so the whole statement fails
    let err = assert_err!(
        executor
            .execute(
                "INSERT INTO `items` (`id`,`label`) VALUES (?,?),(?,?)",
                &[
                    Value::Int(2),
                    Value::from("second"),
                    Value::Int(1),
                    Value::from("dup"),
                ],
            )
            .await
    );
    assert!(err.is_statement_error());
    assert!(matches!(err, DbError::Constraint { .. }), "{:?}", err);
    assert_eq!(count(&executor).await, 1);

    // NOT NULL violation also surfaces as a constraint error
    let err = assert_err!(
        executor
            .execute(
                "INSERT INTO `items` (`id`,`label`) VALUES (?,?)",
                &[Value::Int(3), Value::Null],
            )
            .await
    );
    assert!(matches!(err, DbError::Constraint { .. }), "{:?}", err);
    assert_eq!(count(&executor).await, 1);
}

#[tokio::test]
async fn test_sql_error_is_distinct() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2).await;

    let err = assert_err!(executor.select("SELECT * FROM `missing`", &[], None).await);
    assert!(matches!(err, DbError::Database { .. }), "{:?}", err);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2).await;

    let mut tx = executor.begin().await.unwrap();
    tx.execute(
        "INSERT INTO `items` (`id`,`label`) VALUES (?,?)",
        &[Value::Int(1), Value::from("kept")],
    )
    .await
    .unwrap();
    tx.execute(
        "INSERT INTO `items` (`id`,`label`) VALUES (?,?)",
        &[Value::Int(2), Value::from("kept")],
    )
    .await
    .unwrap();
    let seen = tx
        .select("SELECT `id` FROM `items`", &[], None)
        .await
        .unwrap();
    assert_eq!(seen.len(), 2);
    tx.commit().await.unwrap();
    assert_eq!(count(&executor).await, 2);

    let mut tx = executor.begin().await.unwrap();
    tx.execute("DELETE FROM `items`", &[]).await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(count(&executor).await, 2);
}

#[tokio::test]
async fn test_dropped_transaction_rolls_back() {
    let dir = TempDir::new().unwrap();
    // One connection, so the next statement reuses the rolled-back one
    let executor = setup(&dir, true, 1).await;

    {
        let mut tx = executor.begin().await.unwrap();
        tx.execute(
            "INSERT INTO `items` (`id`,`label`) VALUES (?,?)",
            &[Value::Int(1), Value::from("lost")],
        )
        .await
        .unwrap();
        // Early exit without commit
    }

    assert_eq!(count(&executor).await, 0);
}

#[tokio::test]
async fn test_transaction_checks_arity() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2).await;

    let mut tx = executor.begin().await.unwrap();
    let err = assert_err!(tx.execute("DELETE FROM `items` WHERE `id`=?", &[]).await);
    assert!(matches!(err, DbError::Binding { .. }));
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_query_timeout() {
    let dir = TempDir::new().unwrap();
    let executor = setup(&dir, true, 2)
        .await
        .with_query_timeout(Duration::from_millis(50));
    assert_eq!(executor.query_timeout(), Some(Duration::from_millis(50)));

    let slow = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 50000000) \
                SELECT count(*) FROM c";
    let err = assert_err!(executor.select(slow, &[], None).await);
    assert!(matches!(err, DbError::Timeout { .. }), "{:?}", err);
}
