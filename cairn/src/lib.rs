//! # Cairn
//! A single-table relational engine over the strata storage crate: parsed
//! statements in, result statuses and lazy row scans out.
//!
//! The surface grammar, REPL, and output formatting live elsewhere; this
//! crate owns everything from the parsed statement down to the pages.

use std::path::Path;

use strata::page::{
    COMMON_NODE_HEADER_SIZE, INTERNAL_NODE_CELL_SIZE, INTERNAL_NODE_HEADER_SIZE,
    INTERNAL_NODE_MAX_CELLS, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_MAX_CELLS,
    LEAF_NODE_SPACE_FOR_CELLS,
};
use strata::row::ROW_SIZE;

pub mod errors;
pub mod eval;
pub mod executor;
pub mod planner;
pub mod statement;
pub mod statistics;

pub use errors::{ExecutionError, StatementError};
pub use executor::{ExecuteResult, Execution, RowScan};
pub use statement::{
    BasicCondition, CompareOp, ConditionValue, Field, Statement, WhereExpr,
};
pub use statistics::TableStatistics;
pub use strata::Row;

pub fn debug_logs_enabled() -> bool {
    std::env::var_os("CAIRN_DEBUG_LOG").is_some()
}

#[macro_export]
macro_rules! cairn_debug_log {
    ($($arg:tt)*) => {
        if $crate::debug_logs_enabled() {
            println!($($arg)*);
        }
    };
}

/// The database handle: one table, its transaction, and its statistics.
pub struct Database {
    table: strata::Table,
    statistics: TableStatistics,
}

impl Database {
    /// Opens or creates the database file and collects statistics from
    /// whatever rows it already holds. Statistics live for the process
    /// only; there is no on-disk statistics format.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExecutionError> {
        let mut table = strata::Table::open(path)?;
        let mut statistics = TableStatistics::new();
        statistics.collect(&mut table)?;
        Ok(Database { table, statistics })
    }

    /// Flushes everything and closes the file. An active transaction is
    /// committed first.
    pub fn close(self) -> Result<(), ExecutionError> {
        self.table.close()?;
        Ok(())
    }

    /// Validates and runs one statement. Selects return a `RowScan` that
    /// must be drained before the next call; everything else returns a
    /// status.
    pub fn execute(&mut self, statement: &Statement) -> Result<Execution<'_>, ExecutionError> {
        statement.validate()?;
        crate::cairn_debug_log!("[Database::execute] {:?}", statement);
        executor::execute(&mut self.table, &mut self.statistics, statement)
    }

    /// Runs a statement that produces no rows and returns its status.
    /// Selects are fine too; their rows are simply discarded.
    pub fn execute_status(&mut self, statement: &Statement) -> Result<ExecuteResult, ExecutionError> {
        match self.execute(statement)? {
            Execution::Done(result) => Ok(result),
            Execution::Rows(rows) => {
                for row in rows {
                    row?;
                }
                Ok(ExecuteResult::Success)
            }
        }
    }

    pub fn begin_transaction(&mut self) -> Result<(), ExecutionError> {
        if self.table.begin_transaction() {
            Ok(())
        } else {
            Err(ExecutionError::TransactionInProgress)
        }
    }

    pub fn commit(&mut self) -> Result<(), ExecutionError> {
        if self.table.commit_transaction()? {
            Ok(())
        } else {
            Err(ExecutionError::NoActiveTransaction)
        }
    }

    pub fn rollback(&mut self) -> Result<(), ExecutionError> {
        if self.table.rollback_transaction() {
            Ok(())
        } else {
            Err(ExecutionError::NoActiveTransaction)
        }
    }

    pub fn is_in_transaction(&self) -> bool {
        self.table.is_in_transaction()
    }

    /// Rebuilds the statistics with a full scan.
    pub fn analyze(&mut self) -> Result<(), ExecutionError> {
        self.statistics.rebuild(&mut self.table)?;
        Ok(())
    }

    pub fn statistics(&self) -> &TableStatistics {
        &self.statistics
    }

    /// The `.stats` rendering: a summary or a hint to run ANALYZE.
    pub fn print_stats(&self) -> String {
        self.statistics.to_string()
    }

    /// The `.btree` rendering of the current tree shape.
    pub fn print_tree(&mut self) -> Result<String, ExecutionError> {
        Ok(self.table.print_tree()?)
    }

    /// The `.constants` rendering of the node layout.
    pub fn print_constants() -> String {
        format!(
            "ROW_SIZE: {}\n\
             COMMON_NODE_HEADER_SIZE: {}\n\
             LEAF_NODE_HEADER_SIZE: {}\n\
             LEAF_NODE_CELL_SIZE: {}\n\
             LEAF_NODE_SPACE_FOR_CELLS: {}\n\
             LEAF_NODE_MAX_CELLS: {}\n\
             INTERNAL_NODE_HEADER_SIZE: {}\n\
             INTERNAL_NODE_CELL_SIZE: {}\n\
             INTERNAL_NODE_MAX_CELLS: {}\n",
            ROW_SIZE,
            COMMON_NODE_HEADER_SIZE,
            LEAF_NODE_HEADER_SIZE,
            LEAF_NODE_CELL_SIZE,
            LEAF_NODE_SPACE_FOR_CELLS,
            LEAF_NODE_MAX_CELLS,
            INTERNAL_NODE_HEADER_SIZE,
            INTERNAL_NODE_CELL_SIZE,
            INTERNAL_NODE_MAX_CELLS,
        )
    }
}
