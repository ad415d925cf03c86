use cairn::{Database, ExecuteResult};
use strata::PAGE_SIZE;
use tempfile::tempdir;

mod common;

#[test]
fn test_rows_survive_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db1");

    let mut db = Database::open(&path).unwrap();
    assert_eq!(common::insert(&mut db, 1, "u1", "u1@e"), ExecuteResult::Success);
    assert_eq!(common::insert(&mut db, 2, "u2", "u2@e"), ExecuteResult::Success);
    db.close().unwrap();

    let mut db = Database::open(&path).unwrap();
    let rows = common::select(&mut db, None);
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].id, rows[0].username.as_str(), rows[0].email.as_str()), (1, "u1", "u1@e"));
    assert_eq!((rows[1].id, rows[1].username.as_str(), rows[1].email.as_str()), (2, "u2", "u2@e"));
}

#[test]
fn test_file_length_is_page_aligned() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("aligned.db");

    let mut db = Database::open(&path).unwrap();
    for id in 1..=40 {
        assert_eq!(
            common::insert(&mut db, id, "user", "user@e"),
            ExecuteResult::Success
        );
    }
    db.close().unwrap();

    let len = std::fs::metadata(&path).unwrap().len();
    assert!(len > 0);
    assert_eq!(len % PAGE_SIZE as u64, 0);
}

#[test]
fn test_statistics_recollect_on_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stats.db");

    let mut db = Database::open(&path).unwrap();
    assert!(!db.statistics().is_valid);
    for id in [3, 9, 27] {
        common::insert(&mut db, id, "u", "u@e");
    }
    db.close().unwrap();

    let db = Database::open(&path).unwrap();
    let stats = db.statistics();
    assert!(stats.is_valid);
    assert_eq!(stats.total_rows, 3);
    assert_eq!(stats.id_min, 3);
    assert_eq!(stats.id_max, 27);
}
