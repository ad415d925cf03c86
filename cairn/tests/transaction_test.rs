use cairn::{Database, ExecutionError};
use tempfile::tempdir;

mod common;

#[test]
fn test_rollback_restores_previous_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("txn.db");

    let mut db = Database::open(&path).unwrap();
    for id in 1..=3 {
        common::insert(&mut db, id, "u", "u@e");
    }

    db.begin_transaction().unwrap();
    common::insert(&mut db, 4, "x", "x@e");
    assert_eq!(common::select_ids(&mut db, None), vec![1, 2, 3, 4]);

    db.rollback().unwrap();
    assert_eq!(common::select_ids(&mut db, None), vec![1, 2, 3]);
    db.close().unwrap();

    let mut db = Database::open(&path).unwrap();
    assert_eq!(common::select_ids(&mut db, None), vec![1, 2, 3]);
}

#[test]
fn test_commit_is_durable_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("durable.db");

    let mut db = Database::open(&path).unwrap();
    common::insert(&mut db, 1, "a", "a@e");

    db.begin_transaction().unwrap();
    common::insert(&mut db, 2, "b", "b@e");
    db.commit().unwrap();
    drop(db);

    // No close: the commit alone must have made the rows durable.
    let mut db = Database::open(&path).unwrap();
    assert_eq!(common::select_ids(&mut db, None), vec![1, 2]);
}

#[test]
fn test_reads_in_transaction_see_own_writes() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(dir.path().join("rw.db")).unwrap();

    common::insert(&mut db, 1, "before", "b@e");
    db.begin_transaction().unwrap();

    let updated = db
        .execute_status(&cairn::Statement::Update {
            username: Some("after".to_string()),
            email: None,
            filter: Some(cairn::WhereExpr::basic(cairn::BasicCondition::id(
                cairn::CompareOp::Equal,
                1,
            ))),
        })
        .unwrap();
    assert_eq!(updated, cairn::ExecuteResult::Success);

    let rows = common::select(&mut db, None);
    assert_eq!(rows[0].username, "after");

    db.rollback().unwrap();
    let rows = common::select(&mut db, None);
    assert_eq!(rows[0].username, "before");
}

#[test]
fn test_transaction_state_errors() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(dir.path().join("states.db")).unwrap();

    assert!(matches!(
        db.commit(),
        Err(ExecutionError::NoActiveTransaction)
    ));
    assert!(matches!(
        db.rollback(),
        Err(ExecutionError::NoActiveTransaction)
    ));

    db.begin_transaction().unwrap();
    assert!(matches!(
        db.begin_transaction(),
        Err(ExecutionError::TransactionInProgress)
    ));
    db.commit().unwrap();

    // Committed state allows a fresh begin.
    db.begin_transaction().unwrap();
    db.rollback().unwrap();
}

#[test]
fn test_close_commits_active_transaction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("close.db");

    let mut db = Database::open(&path).unwrap();
    db.begin_transaction().unwrap();
    common::insert(&mut db, 7, "kept", "kept@e");
    db.close().unwrap();

    let mut db = Database::open(&path).unwrap();
    assert_eq!(common::select_ids(&mut db, None), vec![7]);
}

#[test]
fn test_rollback_spanning_a_split_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("split.db");

    let mut db = Database::open(&path).unwrap();
    for id in 1..=13 {
        common::insert(&mut db, id, "u", "u@e");
    }
    db.close().unwrap();

    let mut db = Database::open(&path).unwrap();
    db.begin_transaction().unwrap();
    for id in 14..=20 {
        common::insert(&mut db, id, "u", "u@e");
    }
    assert_eq!(common::select_ids(&mut db, None), (1..=20).collect::<Vec<_>>());
    db.rollback().unwrap();
    assert_eq!(common::select_ids(&mut db, None), (1..=13).collect::<Vec<_>>());
    db.close().unwrap();

    let mut db = Database::open(&path).unwrap();
    assert_eq!(common::select_ids(&mut db, None), (1..=13).collect::<Vec<_>>());
    let tree = db.print_tree().unwrap();
    assert!(tree.starts_with("- leaf (size 13)\n"), "tree was:\n{tree}");
}
