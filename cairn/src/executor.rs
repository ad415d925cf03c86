//! Statement dispatch.
//!
//! Writes run to completion and return a status; selects hand back a lazy
//! scan that pulls rows on demand. The scan borrows the table mutably, so
//! it must be drained (or dropped) before the next statement runs.

use crate::errors::ExecutionError;
use crate::eval::evaluate_where;
use crate::planner::{self, PlanKind, QueryPlan};
use crate::statement::{CompareOp, ConditionValue, Field, Statement, WhereExpr};
use crate::statistics::TableStatistics;
use strata::{Cursor, Row, StorageError, Table};

/// Hard cap on rows removed by one compound-WHERE delete; anything past
/// it is silently left in place.
const DELETE_BATCH_LIMIT: usize = 1000;

/// Statement outcome statuses. Semantic conditions are statuses, not
/// errors; only storage and validation failures surface as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteResult {
    Success,
    DuplicateKey,
    TableFull,
    KeyNotFound,
}

/// What a statement produced: a status, or a row scan to drain.
pub enum Execution<'a> {
    Done(ExecuteResult),
    Rows(RowScan<'a>),
}

pub(crate) fn execute<'a>(
    table: &'a mut Table,
    statistics: &'a mut TableStatistics,
    statement: &Statement,
) -> Result<Execution<'a>, ExecutionError> {
    match statement {
        Statement::Insert(row) => execute_insert(table, statistics, row).map(Execution::Done),
        Statement::Select { filter } => {
            execute_select(table, statistics, filter.as_ref()).map(Execution::Rows)
        }
        Statement::Update {
            username,
            email,
            filter,
        } => execute_update(
            table,
            username.as_deref(),
            email.as_deref(),
            filter.as_ref(),
        )
        .map(Execution::Done),
        Statement::Delete { filter } => {
            execute_delete(table, statistics, filter.as_ref()).map(Execution::Done)
        }
    }
}

fn execute_insert(
    table: &mut Table,
    statistics: &mut TableStatistics,
    row: &Row,
) -> Result<ExecuteResult, ExecutionError> {
    let key = row.id;
    let cursor = table.find(key)?;
    if table.key_at(&cursor)? == Some(key) {
        return Ok(ExecuteResult::DuplicateKey);
    }
    match table.leaf_insert(&cursor, key, row) {
        Ok(()) => {
            statistics.note_insert(row);
            Ok(ExecuteResult::Success)
        }
        Err(StorageError::TableFull) => Ok(ExecuteResult::TableFull),
        Err(err) => Err(err.into()),
    }
}

fn execute_select<'a>(
    table: &'a mut Table,
    statistics: &TableStatistics,
    filter: Option<&WhereExpr>,
) -> Result<RowScan<'a>, ExecutionError> {
    let plan = planner::plan_query(filter, statistics);
    RowScan::new(table, plan, filter.cloned())
}

fn execute_update(
    table: &mut Table,
    username: Option<&str>,
    email: Option<&str>,
    filter: Option<&WhereExpr>,
) -> Result<ExecuteResult, ExecutionError> {
    // A plain `id = k` filter turns into a point update.
    if let Some(key) = filter.and_then(trivial_id_equality) {
        let cursor = table.find(key)?;
        if table.key_at(&cursor)? != Some(key) {
            return Ok(ExecuteResult::KeyNotFound);
        }
        let mut row = table.row_at(&cursor)?;
        apply_update(&mut row, username, email);
        table.write_row_at(&cursor, &row)?;
        return Ok(ExecuteResult::Success);
    }

    let mut cursor = table.start()?;
    let mut found = false;
    while !cursor.end_of_table {
        let row = table.row_at(&cursor)?;
        if filter_matches(filter, &row) {
            found = true;
            let mut updated = row;
            apply_update(&mut updated, username, email);
            table.write_row_at(&cursor, &updated)?;
        }
        table.advance(&mut cursor)?;
    }
    Ok(if found {
        ExecuteResult::Success
    } else {
        ExecuteResult::KeyNotFound
    })
}

fn execute_delete(
    table: &mut Table,
    statistics: &mut TableStatistics,
    filter: Option<&WhereExpr>,
) -> Result<ExecuteResult, ExecutionError> {
    if let Some(key) = filter.and_then(trivial_id_equality) {
        let cursor = table.find(key)?;
        if table.key_at(&cursor)? != Some(key) {
            return Ok(ExecuteResult::KeyNotFound);
        }
        table.leaf_delete(&cursor)?;
        statistics.note_delete();
        return Ok(ExecuteResult::Success);
    }

    // Collect matching ids first, then delete from the highest key down,
    // so earlier deletions cannot shift what later cursors resolve to.
    let mut to_delete = Vec::new();
    let mut cursor = table.start()?;
    while !cursor.end_of_table && to_delete.len() < DELETE_BATCH_LIMIT {
        let row = table.row_at(&cursor)?;
        if filter_matches(filter, &row) {
            to_delete.push(row.id);
        }
        table.advance(&mut cursor)?;
    }
    if to_delete.is_empty() {
        return Ok(ExecuteResult::KeyNotFound);
    }

    for key in to_delete.into_iter().rev() {
        let cursor = table.find(key)?;
        if table.key_at(&cursor)? == Some(key) {
            table.leaf_delete(&cursor)?;
            statistics.note_delete();
        }
    }
    Ok(ExecuteResult::Success)
}

fn apply_update(row: &mut Row, username: Option<&str>, email: Option<&str>) {
    if let Some(username) = username {
        row.username = username.to_string();
    }
    if let Some(email) = email {
        row.email = email.to_string();
    }
}

fn filter_matches(filter: Option<&WhereExpr>, row: &Row) -> bool {
    match filter {
        Some(expr) => evaluate_where(row, expr),
        None => true,
    }
}

/// Some(key) when the filter is exactly `id = key`, with nothing else
/// attached.
fn trivial_id_equality(filter: &WhereExpr) -> Option<u32> {
    if let WhereExpr::Basic(condition) = filter {
        if condition.field == Field::Id && condition.op == CompareOp::Equal {
            if let ConditionValue::Id(value) = condition.value {
                return Some(value);
            }
        }
    }
    None
}

enum ScanState {
    Finished,
    /// An index lookup that matched; emits its one row, then finishes.
    Point(Cursor),
    /// A cursor walk along the leaf chain.
    Walk(Cursor),
}

/// Lazy row sequence produced by a SELECT. Pull rows with the `Iterator`
/// impl; each yielded row has already passed the WHERE filter.
pub struct RowScan<'a> {
    table: &'a mut Table,
    filter: Option<WhereExpr>,
    plan: QueryPlan,
    state: ScanState,
}

impl<'a> RowScan<'a> {
    fn new(
        table: &'a mut Table,
        plan: QueryPlan,
        filter: Option<WhereExpr>,
    ) -> Result<Self, ExecutionError> {
        let state = match plan.kind {
            PlanKind::IndexLookup => {
                let cursor = table.find(plan.start_key)?;
                if table.key_at(&cursor)? == Some(plan.start_key) {
                    ScanState::Point(cursor)
                } else {
                    ScanState::Finished
                }
            }
            PlanKind::RangeScan => {
                let cursor = if plan.has_start_key && plan.start_key > 0 {
                    table.find(plan.start_key)?
                } else {
                    table.start()?
                };
                ScanState::Walk(cursor)
            }
            PlanKind::FullScan => ScanState::Walk(table.start()?),
        };
        Ok(RowScan {
            table,
            filter,
            plan,
            state,
        })
    }

    /// The plan this scan is executing; useful for inspection.
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecutionError> {
        loop {
            match &mut self.state {
                ScanState::Finished => return Ok(None),
                ScanState::Point(cursor) => {
                    let row = self.table.row_at(cursor)?;
                    self.state = ScanState::Finished;
                    if filter_matches(self.filter.as_ref(), &row) {
                        return Ok(Some(row));
                    }
                }
                ScanState::Walk(cursor) => {
                    if cursor.end_of_table {
                        self.state = ScanState::Finished;
                        return Ok(None);
                    }
                    let row = self.table.row_at(cursor)?;
                    self.table.advance(cursor)?;
                    if filter_matches(self.filter.as_ref(), &row) {
                        return Ok(Some(row));
                    }
                }
            }
        }
    }
}

impl<'a> Iterator for RowScan<'a> {
    type Item = Result<Row, ExecutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
