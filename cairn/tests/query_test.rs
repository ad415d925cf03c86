use cairn::planner::PlanKind;
use cairn::{
    BasicCondition, CompareOp, Database, ExecuteResult, Execution, Statement, WhereExpr,
};
use tempfile::tempdir;

mod common;

fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::open(dir.path().join("query.db")).unwrap()
}

#[test]
fn test_duplicate_key_is_rejected() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    assert_eq!(common::insert(&mut db, 42, "a", "a@e"), ExecuteResult::Success);
    assert_eq!(
        common::insert(&mut db, 42, "b", "b@e"),
        ExecuteResult::DuplicateKey
    );

    let rows = common::select(&mut db, None);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].username, "a");
    assert_eq!(rows[0].email, "a@e");
}

#[test]
fn test_where_precedence_or_under_and() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    common::insert(&mut db, 1, "a", "a@e");
    common::insert(&mut db, 2, "a", "b@e");
    common::insert(&mut db, 3, "b", "c@e");

    let filter = WhereExpr::and(
        WhereExpr::or(
            WhereExpr::basic(BasicCondition::id(CompareOp::Less, 2)),
            WhereExpr::basic(BasicCondition::id(CompareOp::Greater, 2)),
        ),
        WhereExpr::basic(BasicCondition::username(CompareOp::Equal, "a")),
    );
    let rows = common::select(&mut db, Some(filter));
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].id, rows[0].username.as_str()), (1, "a"));
}

#[test]
fn test_partial_update_keeps_unmarked_fields() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    common::insert(&mut db, 5, "x", "x@e");
    let status = db
        .execute_status(&Statement::Update {
            username: None,
            email: Some("new@e".to_string()),
            filter: Some(WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 5))),
        })
        .unwrap();
    assert_eq!(status, ExecuteResult::Success);

    let rows = common::select(
        &mut db,
        Some(WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 5))),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(
        (rows[0].id, rows[0].username.as_str(), rows[0].email.as_str()),
        (5, "x", "new@e")
    );
}

#[test]
fn test_update_by_missing_id_is_key_not_found() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    common::insert(&mut db, 1, "a", "a@e");
    let status = db
        .execute_status(&Statement::Update {
            username: Some("z".to_string()),
            email: None,
            filter: Some(WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 99))),
        })
        .unwrap();
    assert_eq!(status, ExecuteResult::KeyNotFound);
}

#[test]
fn test_update_with_scan_filter_touches_every_match() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    common::insert(&mut db, 1, "a", "1@e");
    common::insert(&mut db, 2, "b", "2@e");
    common::insert(&mut db, 3, "a", "3@e");

    let status = db
        .execute_status(&Statement::Update {
            username: None,
            email: Some("same@e".to_string()),
            filter: Some(WhereExpr::basic(BasicCondition::username(
                CompareOp::Equal,
                "a",
            ))),
        })
        .unwrap();
    assert_eq!(status, ExecuteResult::Success);

    let rows = common::select(&mut db, None);
    assert_eq!(rows[0].email, "same@e");
    assert_eq!(rows[1].email, "2@e");
    assert_eq!(rows[2].email, "same@e");
}

#[test]
fn test_delete_by_id_and_by_filter() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    for id in 1..=10 {
        let name = if id % 2 == 0 { "even" } else { "odd" };
        common::insert(&mut db, id, name, "u@e");
    }

    let status = common::delete(
        &mut db,
        Some(WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 5))),
    );
    assert_eq!(status, ExecuteResult::Success);
    assert_eq!(common::select_ids(&mut db, None), vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);

    let status = common::delete(
        &mut db,
        Some(WhereExpr::basic(BasicCondition::username(
            CompareOp::Equal,
            "even",
        ))),
    );
    assert_eq!(status, ExecuteResult::Success);
    assert_eq!(common::select_ids(&mut db, None), vec![1, 3, 7, 9]);

    let status = common::delete(
        &mut db,
        Some(WhereExpr::basic(BasicCondition::username(
            CompareOp::Equal,
            "nobody",
        ))),
    );
    assert_eq!(status, ExecuteResult::KeyNotFound);
}

#[test]
fn test_insert_then_delete_then_select_is_empty() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    common::insert(&mut db, 8, "gone", "gone@e");
    let by_id = Some(WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 8)));
    assert_eq!(common::delete(&mut db, by_id.clone()), ExecuteResult::Success);
    assert!(common::select(&mut db, by_id).is_empty());
}

#[test]
fn test_select_plans_match_the_filter_shape() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    for id in 1..=20 {
        common::insert(&mut db, id, "u", "u@e");
    }

    let filter = Some(WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 7)));
    match db.execute(&Statement::Select { filter }).unwrap() {
        Execution::Rows(rows) => assert_eq!(rows.plan().kind, PlanKind::IndexLookup),
        Execution::Done(_) => panic!("select did not produce rows"),
    }

    let filter = Some(WhereExpr::basic(BasicCondition::id(CompareOp::Greater, 15)));
    match db.execute(&Statement::Select { filter }).unwrap() {
        Execution::Rows(mut rows) => {
            assert_eq!(rows.plan().kind, PlanKind::RangeScan);
            assert_eq!(rows.plan().start_key, 16);
            let ids: Vec<u32> = rows.by_ref().map(|row| row.unwrap().id).collect();
            assert_eq!(ids, vec![16, 17, 18, 19, 20]);
        }
        Execution::Done(_) => panic!("select did not produce rows"),
    }

    let filter = Some(WhereExpr::basic(BasicCondition::username(
        CompareOp::Equal,
        "u",
    )));
    match db.execute(&Statement::Select { filter }).unwrap() {
        Execution::Rows(rows) => assert_eq!(rows.plan().kind, PlanKind::FullScan),
        Execution::Done(_) => panic!("select did not produce rows"),
    }
}

#[test]
fn test_range_filters_bound_both_sides() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    for id in 1..=30 {
        common::insert(&mut db, id, "u", "u@e");
    }

    let filter = Some(WhereExpr::basic(BasicCondition::id(CompareOp::LessEqual, 4)));
    assert_eq!(common::select_ids(&mut db, filter), vec![1, 2, 3, 4]);

    let filter = Some(WhereExpr::and(
        WhereExpr::basic(BasicCondition::id(CompareOp::GreaterEqual, 10)),
        WhereExpr::basic(BasicCondition::id(CompareOp::Less, 13)),
    ));
    assert_eq!(common::select_ids(&mut db, filter), vec![10, 11, 12]);
}

#[test]
fn test_validation_rejects_bad_statements() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    let result = db.execute_status(&Statement::Insert(cairn::Row::new(0, "a", "a@e")));
    assert!(matches!(
        result,
        Err(cairn::ExecutionError::Statement(
            cairn::StatementError::InvalidId
        ))
    ));

    let result = db.execute_status(&Statement::Insert(cairn::Row::new(
        1,
        &"x".repeat(40),
        "a@e",
    )));
    assert!(matches!(
        result,
        Err(cairn::ExecutionError::Statement(
            cairn::StatementError::UsernameTooLong(40)
        ))
    ));

    assert!(common::select(&mut db, None).is_empty());
}

#[test]
fn test_analyze_then_stats_rendering() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    assert!(db.print_stats().contains("Run ANALYZE"));
    common::insert(&mut db, 1, "a", "a@e");
    common::insert(&mut db, 2, "b", "b@e");
    db.analyze().unwrap();

    let rendered = db.print_stats();
    assert!(rendered.contains("Total rows: 2"), "was: {rendered}");
    assert!(rendered.contains("ID range: 1 - 2"), "was: {rendered}");
}
