#![allow(dead_code)]

use cairn::{Database, ExecuteResult, Execution, Row, Statement, WhereExpr};

pub fn insert(db: &mut Database, id: u32, username: &str, email: &str) -> ExecuteResult {
    db.execute_status(&Statement::Insert(Row::new(id, username, email)))
        .unwrap()
}

pub fn select(db: &mut Database, filter: Option<WhereExpr>) -> Vec<Row> {
    match db.execute(&Statement::Select { filter }).unwrap() {
        Execution::Rows(rows) => rows.map(|row| row.unwrap()).collect(),
        Execution::Done(_) => panic!("select did not produce rows"),
    }
}

pub fn select_ids(db: &mut Database, filter: Option<WhereExpr>) -> Vec<u32> {
    select(db, filter).into_iter().map(|row| row.id).collect()
}

pub fn delete(db: &mut Database, filter: Option<WhereExpr>) -> ExecuteResult {
    db.execute_status(&Statement::Delete { filter }).unwrap()
}
