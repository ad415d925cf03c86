//! Table statistics: row count, id range, and hash-approximated column
//! cardinalities. Advisory input to the planner; staleness only costs
//! plan quality, never correctness.

use std::fmt;

use strata::{Row, StorageError, Table};

/// Slots in each cardinality bitmap. Distinct values hash into these, so
/// the counts saturate and undercount once a column's cardinality nears
/// the slot count.
const CARDINALITY_SLOTS: usize = 1024;

#[derive(Debug, Clone)]
pub struct TableStatistics {
    pub total_rows: u32,
    pub id_min: u32,
    pub id_max: u32,
    pub id_cardinality: u32,
    pub username_cardinality: u32,
    pub email_cardinality: u32,
    pub is_valid: bool,
}

impl TableStatistics {
    pub fn new() -> Self {
        TableStatistics {
            total_rows: 0,
            id_min: u32::MAX,
            id_max: 0,
            id_cardinality: 0,
            username_cardinality: 0,
            email_cardinality: 0,
            is_valid: false,
        }
    }

    pub fn reset(&mut self) {
        *self = TableStatistics::new();
    }

    /// Open-time collection: a full scan that leaves the statistics valid
    /// only when the table actually held rows.
    pub fn collect(&mut self, table: &mut Table) -> Result<(), StorageError> {
        self.scan(table)?;
        self.is_valid = self.total_rows > 0;
        Ok(())
    }

    /// ANALYZE: full rebuild, valid afterwards even for an empty table.
    pub fn rebuild(&mut self, table: &mut Table) -> Result<(), StorageError> {
        self.scan(table)?;
        self.is_valid = true;
        Ok(())
    }

    fn scan(&mut self, table: &mut Table) -> Result<(), StorageError> {
        self.reset();

        let mut id_seen = vec![false; CARDINALITY_SLOTS];
        let mut username_seen = vec![false; CARDINALITY_SLOTS];
        let mut email_seen = vec![false; CARDINALITY_SLOTS];

        let mut cursor = table.start()?;
        while !cursor.end_of_table {
            let row = table.row_at(&cursor)?;
            self.total_rows += 1;

            if row.id < self.id_min {
                self.id_min = row.id;
            }
            if row.id > self.id_max {
                self.id_max = row.id;
            }

            if mark_seen(&mut id_seen, (row.id as usize) % CARDINALITY_SLOTS) {
                self.id_cardinality += 1;
            }
            if mark_seen(&mut username_seen, string_slot(&row.username)) {
                self.username_cardinality += 1;
            }
            if mark_seen(&mut email_seen, string_slot(&row.email)) {
                self.email_cardinality += 1;
            }

            table.advance(&mut cursor)?;
        }

        if self.total_rows == 0 {
            self.id_min = u32::MAX;
            self.id_max = 0;
        }
        crate::cairn_debug_log!(
            "[TableStatistics::scan] rows: {}, id range {}..{}",
            self.total_rows,
            self.id_min,
            self.id_max
        );
        Ok(())
    }

    /// Cheap incremental maintenance after a successful insert. Ids are
    /// unique, so the row count is a serviceable cardinality floor.
    pub fn note_insert(&mut self, row: &Row) {
        self.total_rows += 1;
        if row.id < self.id_min {
            self.id_min = row.id;
        }
        if row.id > self.id_max {
            self.id_max = row.id;
        }
        if self.id_cardinality < self.total_rows {
            self.id_cardinality = self.total_rows;
        }
        self.is_valid = true;
    }

    /// Incremental maintenance after a delete. The id range is left
    /// stale until the next ANALYZE.
    pub fn note_delete(&mut self) {
        if self.total_rows == 0 {
            return;
        }
        self.total_rows -= 1;
        if self.total_rows == 0 {
            self.reset();
            return;
        }
        if self.id_cardinality > self.total_rows {
            self.id_cardinality = self.total_rows;
        }
    }
}

impl Default for TableStatistics {
    fn default() -> Self {
        TableStatistics::new()
    }
}

impl fmt::Display for TableStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid {
            return write!(
                f,
                "Statistics not available. Run ANALYZE to collect statistics."
            );
        }
        writeln!(f, "Table Statistics:")?;
        writeln!(f, "  Total rows: {}", self.total_rows)?;
        writeln!(f, "  ID range: {} - {}", self.id_min, self.id_max)?;
        writeln!(f, "  ID cardinality: {}", self.id_cardinality)?;
        writeln!(f, "  Username cardinality: {}", self.username_cardinality)?;
        write!(f, "  Email cardinality: {}", self.email_cardinality)
    }
}

fn mark_seen(seen: &mut [bool], slot: usize) -> bool {
    if seen[slot] {
        false
    } else {
        seen[slot] = true;
        true
    }
}

/// Rolling ×31 hash, reduced every step so the arithmetic mirrors the
/// on-line form.
fn string_slot(value: &str) -> usize {
    let mut hash: u32 = 0;
    for &byte in value.as_bytes() {
        hash = (hash.wrapping_mul(31).wrapping_add(byte as u32)) % CARDINALITY_SLOTS as u32;
    }
    hash as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata::Table;
    use tempfile::tempdir;

    fn table_with_rows(dir: &tempfile::TempDir, rows: &[(u32, &str, &str)]) -> Table {
        let mut table = Table::open(dir.path().join("stats.db")).unwrap();
        for &(id, username, email) in rows {
            let row = Row::new(id, username, email);
            let cursor = table.find(id).unwrap();
            table.leaf_insert(&cursor, id, &row).unwrap();
        }
        table
    }

    #[test]
    fn test_collect_on_empty_table_stays_invalid() {
        let dir = tempdir().unwrap();
        let mut table = table_with_rows(&dir, &[]);
        let mut stats = TableStatistics::new();
        stats.collect(&mut table).unwrap();
        assert!(!stats.is_valid);
        assert_eq!(stats.total_rows, 0);
    }

    #[test]
    fn test_rebuild_on_empty_table_is_valid() {
        let dir = tempdir().unwrap();
        let mut table = table_with_rows(&dir, &[]);
        let mut stats = TableStatistics::new();
        stats.rebuild(&mut table).unwrap();
        assert!(stats.is_valid);
        assert_eq!(stats.total_rows, 0);
    }

    #[test]
    fn test_scan_counts_distinct_values() {
        let dir = tempdir().unwrap();
        let mut table = table_with_rows(
            &dir,
            &[
                (1, "a", "a@x"),
                (2, "b", "b@x"),
                (3, "a", "c@x"),
                (4, "c", "a@x"),
            ],
        );
        let mut stats = TableStatistics::new();
        stats.rebuild(&mut table).unwrap();

        assert_eq!(stats.total_rows, 4);
        assert_eq!(stats.id_min, 1);
        assert_eq!(stats.id_max, 4);
        assert_eq!(stats.id_cardinality, 4);
        assert_eq!(stats.username_cardinality, 3);
        assert_eq!(stats.email_cardinality, 3);
    }

    #[test]
    fn test_note_insert_and_delete_track_counts() {
        let mut stats = TableStatistics::new();
        stats.note_insert(&Row::new(10, "a", "a@x"));
        stats.note_insert(&Row::new(3, "b", "b@x"));
        assert!(stats.is_valid);
        assert_eq!(stats.total_rows, 2);
        assert_eq!(stats.id_min, 3);
        assert_eq!(stats.id_max, 10);
        assert_eq!(stats.id_cardinality, 2);

        stats.note_delete();
        assert_eq!(stats.total_rows, 1);
        assert_eq!(stats.id_cardinality, 1);

        stats.note_delete();
        assert!(!stats.is_valid);
        assert_eq!(stats.id_min, u32::MAX);
    }

    #[test]
    fn test_display_when_invalid_points_at_analyze() {
        let stats = TableStatistics::new();
        assert!(stats.to_string().contains("Run ANALYZE"));
    }
}
