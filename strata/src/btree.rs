//! The B+tree.
//!
//! The tree is a graph of nodes referring to each other by page number;
//! the pager's cache is the arena that owns the buffers. `Table` bundles
//! the pager with the transaction overlay and the tree algorithms, and
//! hands out value-type cursors for iteration and insertion.

use std::path::Path;

use crate::error::StorageError;
use crate::page::{
    INTERNAL_NODE_MAX_CELLS, LEAF_NODE_CELL_SIZE, LEAF_NODE_KEY_SIZE, LEAF_NODE_LEFT_SPLIT_COUNT,
    LEAF_NODE_MAX_CELLS, LEAF_NODE_RIGHT_SPLIT_COUNT, NodeType, Page,
};
use crate::pager::Pager;
use crate::row::Row;
use crate::transaction::{Transaction, TransactionState};
use crate::{INVALID_PAGE_NUM, PageId};

/// A position in the tree: a leaf page, a cell within it, and whether the
/// position is past the last row of the table.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub page_num: PageId,
    pub cell_num: u32,
    pub end_of_table: bool,
}

/// The single table: pager, root page, and the table's one transaction.
pub struct Table {
    pager: Pager,
    root_page_num: PageId,
    transaction: Transaction,
}

impl Table {
    /// Opens or creates the database file. A brand-new file gets a root
    /// leaf at page 0.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut pager = Pager::open(path)?;
        if pager.num_pages == 0 {
            let root = pager.get_mut(0)?;
            root.initialize_leaf();
            root.set_root(true);
        }
        Ok(Table {
            pager,
            root_page_num: 0,
            transaction: Transaction::new(),
        })
    }

    /// Flushes every cached page and consumes the table. A still-active
    /// transaction is committed first, with a diagnostic.
    pub fn close(mut self) -> Result<(), StorageError> {
        if self.transaction.is_active() {
            println!("Warning: active transaction will be committed.");
            self.commit_transaction()?;
        }
        self.pager.close()
    }

    pub fn num_pages(&self) -> u32 {
        self.pager.num_pages
    }

    pub fn root_page_num(&self) -> PageId {
        self.root_page_num
    }

    // ------------------------------------------------------------------
    // Transaction-aware page access
    // ------------------------------------------------------------------

    pub fn is_in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction.state()
    }

    /// Returns false if a transaction is already active.
    pub fn begin_transaction(&mut self) -> bool {
        if self.transaction.is_active() {
            return false;
        }
        crate::strata_debug_log!("[Table::begin_transaction] starting transaction");
        self.transaction.begin();
        true
    }

    /// Copies every shadow back into the cache and flushes it, in page
    /// order. Durability means this returned `Ok(true)`. Returns
    /// `Ok(false)` when no transaction is active.
    pub fn commit_transaction(&mut self) -> Result<bool, StorageError> {
        if !self.transaction.is_active() {
            return Ok(false);
        }
        let modified = self.transaction.modified_pages();
        crate::strata_debug_log!(
            "[Table::commit_transaction] committing {} modified pages",
            modified.len()
        );
        for page_num in modified {
            if let Some(shadow) = self.transaction.take_shadow(page_num) {
                let page = self.pager.get_mut(page_num)?;
                *page = *shadow;
                self.pager.flush(page_num)?;
            }
        }
        self.transaction.finish(TransactionState::Committed);
        Ok(true)
    }

    /// Drops every shadow without copying. Returns false when no
    /// transaction is active.
    pub fn rollback_transaction(&mut self) -> bool {
        if !self.transaction.is_active() {
            return false;
        }
        crate::strata_debug_log!("[Table::rollback_transaction] discarding shadows");
        self.transaction.finish(TransactionState::Aborted);
        true
    }

    /// Shadow first when a transaction is active, pager otherwise.
    fn page_for_read(&mut self, page_num: PageId) -> Result<&Page, StorageError> {
        if self.transaction.is_active() {
            if let Some(page) = self.transaction.shadow(page_num) {
                return Ok(page);
            }
        }
        self.pager.get(page_num)
    }

    /// Outside a transaction, writes land directly in the cache. Inside
    /// one, the first touch of a page materializes a shadow copy and all
    /// writes go there until commit or rollback.
    fn page_for_write(&mut self, page_num: PageId) -> Result<&mut Page, StorageError> {
        if !self.transaction.is_active() {
            return self.pager.get_mut(page_num);
        }
        let source = self.pager.get(page_num)?;
        Ok(self.transaction.ensure_shadow(page_num, source))
    }

    // ------------------------------------------------------------------
    // Cursors
    // ------------------------------------------------------------------

    /// Descends from the root to the leaf position for `key`: either the
    /// cell holding it or the slot where it would be inserted.
    pub fn find(&mut self, key: u32) -> Result<Cursor, StorageError> {
        let root_page_num = self.root_page_num;
        let node_type = self.page_for_read(root_page_num)?.node_type();
        match node_type {
            NodeType::Leaf => self.leaf_find(root_page_num, key),
            NodeType::Internal => self.internal_find(root_page_num, key),
        }
    }

    /// Cursor on the leftmost leaf's first cell.
    pub fn start(&mut self) -> Result<Cursor, StorageError> {
        let mut cursor = self.find(0)?;
        let num_cells = self.page_for_read(cursor.page_num)?.leaf_num_cells();
        cursor.end_of_table = num_cells == 0;
        Ok(cursor)
    }

    fn leaf_find(&mut self, page_num: PageId, key: u32) -> Result<Cursor, StorageError> {
        let page = self.page_for_read(page_num)?;
        let num_cells = page.leaf_num_cells();

        let mut min_index = 0u32;
        let mut one_past_max_index = num_cells;
        while one_past_max_index != min_index {
            let index = (min_index + one_past_max_index) / 2;
            let key_at_index = page.leaf_key(index as usize);
            if key == key_at_index {
                return Ok(Cursor {
                    page_num,
                    cell_num: index,
                    end_of_table: false,
                });
            }
            if key < key_at_index {
                one_past_max_index = index;
            } else {
                min_index = index + 1;
            }
        }

        Ok(Cursor {
            page_num,
            cell_num: min_index,
            end_of_table: min_index >= num_cells,
        })
    }

    fn internal_find(&mut self, page_num: PageId, key: u32) -> Result<Cursor, StorageError> {
        let child_page_num = {
            let page = self.page_for_read(page_num)?;
            let child_index = internal_find_child(page, key);
            page.internal_child(child_index)?
        };
        let child_type = self.page_for_read(child_page_num)?.node_type();
        match child_type {
            NodeType::Leaf => self.leaf_find(child_page_num, key),
            NodeType::Internal => self.internal_find(child_page_num, key),
        }
    }

    /// Steps to the next cell, following the leaf chain across pages.
    pub fn advance(&mut self, cursor: &mut Cursor) -> Result<(), StorageError> {
        let page = self.page_for_read(cursor.page_num)?;
        cursor.cell_num += 1;
        if cursor.cell_num >= page.leaf_num_cells() {
            let next_page_num = page.leaf_next_leaf();
            if next_page_num == 0 {
                cursor.end_of_table = true;
            } else {
                cursor.page_num = next_page_num;
                cursor.cell_num = 0;
            }
        }
        Ok(())
    }

    /// Deserializes the row under the cursor.
    pub fn row_at(&mut self, cursor: &Cursor) -> Result<Row, StorageError> {
        let page = self.page_for_read(cursor.page_num)?;
        Ok(Row::deserialize(page.leaf_value(cursor.cell_num as usize)))
    }

    /// Overwrites the row under the cursor in place. The key is untouched,
    /// so the tree shape cannot change.
    pub fn write_row_at(&mut self, cursor: &Cursor, row: &Row) -> Result<(), StorageError> {
        let page = self.page_for_write(cursor.page_num)?;
        row.serialize(page.leaf_value_mut(cursor.cell_num as usize));
        Ok(())
    }

    /// The key under the cursor, or None when the cursor sits past the
    /// leaf's last cell (an insert position).
    pub fn key_at(&mut self, cursor: &Cursor) -> Result<Option<u32>, StorageError> {
        let page = self.page_for_read(cursor.page_num)?;
        if cursor.cell_num < page.leaf_num_cells() {
            Ok(Some(page.leaf_key(cursor.cell_num as usize)))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Inserts a cell at the cursor position, splitting the leaf when it
    /// is already full. Duplicate detection is the caller's job.
    pub fn leaf_insert(&mut self, cursor: &Cursor, key: u32, row: &Row) -> Result<(), StorageError> {
        let num_cells = self.page_for_read(cursor.page_num)?.leaf_num_cells();
        if num_cells as usize >= LEAF_NODE_MAX_CELLS {
            return self.leaf_split_and_insert(cursor, key, row);
        }

        let page = self.page_for_write(cursor.page_num)?;
        if cursor.cell_num < num_cells {
            for i in (cursor.cell_num + 1..=num_cells).rev() {
                let cell = page.leaf_cell(i as usize - 1);
                page.set_leaf_cell(i as usize, &cell);
            }
        }
        page.set_leaf_num_cells(num_cells + 1);
        page.set_leaf_key(cursor.cell_num as usize, key);
        row.serialize(page.leaf_value_mut(cursor.cell_num as usize));
        Ok(())
    }

    /// Splits a full leaf and inserts the new cell at its ordered
    /// position. Walks the virtual sequence of MAX_CELLS+1 cells from the
    /// top down, routing each to the old or new node so that the left node
    /// ends with LEAF_NODE_LEFT_SPLIT_COUNT cells and the right with
    /// LEAF_NODE_RIGHT_SPLIT_COUNT.
    fn leaf_split_and_insert(
        &mut self,
        cursor: &Cursor,
        key: u32,
        row: &Row,
    ) -> Result<(), StorageError> {
        let old_page_num = cursor.page_num;
        let old_max = self.node_max_key(old_page_num)?;
        let new_page_num = self.pager.allocate();
        crate::strata_debug_log!(
            "[Table::leaf_split] page {old_page_num} full, splitting into page {new_page_num}"
        );

        let (old_parent, old_next_leaf) = {
            let old_node = self.page_for_read(old_page_num)?;
            (old_node.parent(), old_node.leaf_next_leaf())
        };
        {
            let new_node = self.page_for_write(new_page_num)?;
            new_node.initialize_leaf();
            new_node.set_parent(old_parent);
            new_node.set_leaf_next_leaf(old_next_leaf);
        }
        self.page_for_write(old_page_num)?
            .set_leaf_next_leaf(new_page_num);

        let mut new_cell = [0u8; LEAF_NODE_CELL_SIZE];
        new_cell[..LEAF_NODE_KEY_SIZE].copy_from_slice(&key.to_le_bytes());
        row.serialize(&mut new_cell[LEAF_NODE_KEY_SIZE..]);

        let insert_at = cursor.cell_num as usize;
        for i in (0..=LEAF_NODE_MAX_CELLS).rev() {
            let destination_page_num = if i >= LEAF_NODE_LEFT_SPLIT_COUNT {
                new_page_num
            } else {
                old_page_num
            };
            let index_within_node = i % LEAF_NODE_LEFT_SPLIT_COUNT;

            let cell = if i == insert_at {
                new_cell
            } else if i > insert_at {
                self.page_for_read(old_page_num)?.leaf_cell(i - 1)
            } else {
                self.page_for_read(old_page_num)?.leaf_cell(i)
            };
            self.page_for_write(destination_page_num)?
                .set_leaf_cell(index_within_node, &cell);
        }

        self.page_for_write(old_page_num)?
            .set_leaf_num_cells(LEAF_NODE_LEFT_SPLIT_COUNT as u32);
        self.page_for_write(new_page_num)?
            .set_leaf_num_cells(LEAF_NODE_RIGHT_SPLIT_COUNT as u32);

        if self.page_for_read(old_page_num)?.is_root() {
            self.create_new_root(new_page_num)
        } else {
            let parent_page_num = self.page_for_read(old_page_num)?.parent();
            let new_max = self.node_max_key(old_page_num)?;
            {
                let parent = self.page_for_write(parent_page_num)?;
                update_internal_key(parent, old_max, new_max);
            }
            self.internal_insert(parent_page_num, new_page_num)
        }
    }

    /// Turns the root page into an internal node over two children: a
    /// fresh page holding the old root's contents on the left, and
    /// `right_child_page_num` on the right. The root never moves off
    /// page 0.
    fn create_new_root(&mut self, right_child_page_num: PageId) -> Result<(), StorageError> {
        let root_page_num = self.root_page_num;
        let root_is_internal =
            self.page_for_read(root_page_num)?.node_type() == NodeType::Internal;

        if root_is_internal {
            self.page_for_write(right_child_page_num)?
                .initialize_internal();
        }
        let left_child_page_num = self.pager.allocate();
        crate::strata_debug_log!(
            "[Table::create_new_root] old root moves to page {left_child_page_num}, right child is {right_child_page_num}"
        );
        if root_is_internal {
            self.page_for_write(left_child_page_num)?
                .initialize_internal();
        }

        let root_copy = self.page_for_read(root_page_num)?.clone();
        {
            let left_child = self.page_for_write(left_child_page_num)?;
            *left_child = root_copy;
            left_child.set_root(false);
        }

        // The copied node's children still point at page 0 as parent.
        if root_is_internal {
            let (num_keys, right_child) = {
                let left_child = self.page_for_read(left_child_page_num)?;
                (
                    left_child.internal_num_keys() as usize,
                    left_child.internal_right_child(),
                )
            };
            for i in 0..num_keys {
                let child_page_num = self.page_for_read(left_child_page_num)?.internal_child(i)?;
                self.page_for_write(child_page_num)?
                    .set_parent(left_child_page_num);
            }
            if right_child == INVALID_PAGE_NUM {
                return Err(StorageError::Corrupt(format!(
                    "root copy at page {} has no right child",
                    left_child_page_num
                )));
            }
            self.page_for_write(right_child)?
                .set_parent(left_child_page_num);
        }

        let left_child_max_key = self.node_max_key(left_child_page_num)?;
        {
            let root = self.page_for_write(root_page_num)?;
            root.initialize_internal();
            root.set_root(true);
            root.set_internal_num_keys(1);
            root.set_internal_cell_child(0, left_child_page_num);
            root.set_internal_key(0, left_child_max_key);
            root.set_internal_right_child(right_child_page_num);
        }
        self.page_for_write(left_child_page_num)?
            .set_parent(root_page_num);
        self.page_for_write(right_child_page_num)?
            .set_parent(root_page_num);
        Ok(())
    }

    /// Adds `child_page_num` to an internal node, keyed by the child's
    /// maximum key. Splits the parent when it is already at capacity.
    fn internal_insert(
        &mut self,
        parent_page_num: PageId,
        child_page_num: PageId,
    ) -> Result<(), StorageError> {
        let child_max_key = self.node_max_key(child_page_num)?;
        let (index, original_num_keys, right_child_page_num) = {
            let parent = self.page_for_read(parent_page_num)?;
            (
                internal_find_child(parent, child_max_key),
                parent.internal_num_keys(),
                parent.internal_right_child(),
            )
        };

        if original_num_keys as usize >= INTERNAL_NODE_MAX_CELLS {
            return self.internal_split_and_insert(parent_page_num, child_page_num);
        }

        // An empty internal node adopts its first child as right child.
        if right_child_page_num == INVALID_PAGE_NUM {
            self.page_for_write(parent_page_num)?
                .set_internal_right_child(child_page_num);
            return Ok(());
        }

        let right_child_max_key = self.node_max_key(right_child_page_num)?;
        let parent = self.page_for_write(parent_page_num)?;
        parent.set_internal_num_keys(original_num_keys + 1);

        if child_max_key > right_child_max_key {
            // The new child supersedes the right child, which moves into
            // the cell array.
            parent.set_internal_cell_child(original_num_keys as usize, right_child_page_num);
            parent.set_internal_key(original_num_keys as usize, right_child_max_key);
            parent.set_internal_right_child(child_page_num);
        } else {
            for i in ((index + 1)..=(original_num_keys as usize)).rev() {
                let cell = parent.internal_cell(i - 1);
                parent.set_internal_cell(i, &cell);
            }
            parent.set_internal_cell_child(index, child_page_num);
            parent.set_internal_key(index, child_max_key);
        }
        Ok(())
    }

    /// Splits an overfull internal node. When the node is the root, the
    /// new-root dance runs first and the split continues on the relocated
    /// copy.
    fn internal_split_and_insert(
        &mut self,
        parent_page_num: PageId,
        child_page_num: PageId,
    ) -> Result<(), StorageError> {
        let mut old_page_num = parent_page_num;
        let old_max = self.node_max_key(old_page_num)?;
        let child_max = self.node_max_key(child_page_num)?;
        let new_page_num = self.pager.allocate();
        let splitting_root = self.page_for_read(old_page_num)?.is_root();
        crate::strata_debug_log!(
            "[Table::internal_split] page {old_page_num} full (root: {splitting_root}), sibling is page {new_page_num}"
        );

        let parent_of_split;
        if splitting_root {
            self.create_new_root(new_page_num)?;
            parent_of_split = self.root_page_num;
            let root_page_num = self.root_page_num;
            old_page_num = self.page_for_read(root_page_num)?.internal_child(0)?;
        } else {
            parent_of_split = self.page_for_read(old_page_num)?.parent();
            self.page_for_write(new_page_num)?.initialize_internal();
        }

        // The old node's right child seeds the new sibling.
        let moved_right_child = self.page_for_read(old_page_num)?.internal_right_child();
        if moved_right_child == INVALID_PAGE_NUM {
            return Err(StorageError::Corrupt(format!(
                "splitting internal page {} with no right child",
                old_page_num
            )));
        }
        self.internal_insert(new_page_num, moved_right_child)?;
        self.page_for_write(moved_right_child)?
            .set_parent(new_page_num);
        self.page_for_write(old_page_num)?
            .set_internal_right_child(INVALID_PAGE_NUM);

        // Migrate the cells above the midpoint.
        for i in ((INTERNAL_NODE_MAX_CELLS / 2 + 1)..INTERNAL_NODE_MAX_CELLS).rev() {
            let moved_child = self.page_for_read(old_page_num)?.internal_cell_child(i);
            self.internal_insert(new_page_num, moved_child)?;
            self.page_for_write(moved_child)?.set_parent(new_page_num);
            let old_node = self.page_for_write(old_page_num)?;
            let num_keys = old_node.internal_num_keys();
            old_node.set_internal_num_keys(num_keys - 1);
        }

        // The highest surviving cell child becomes the old node's right
        // child.
        {
            let old_node = self.page_for_write(old_page_num)?;
            let num_keys = old_node.internal_num_keys();
            let tail_child = old_node.internal_cell_child(num_keys as usize - 1);
            old_node.set_internal_right_child(tail_child);
            old_node.set_internal_num_keys(num_keys - 1);
        }

        let max_after_split = self.node_max_key(old_page_num)?;
        let destination_page_num = if child_max < max_after_split {
            old_page_num
        } else {
            new_page_num
        };
        self.internal_insert(destination_page_num, child_page_num)?;
        self.page_for_write(child_page_num)?
            .set_parent(destination_page_num);

        let old_max_after_split = self.node_max_key(old_page_num)?;
        {
            let parent = self.page_for_write(parent_of_split)?;
            update_internal_key(parent, old_max, old_max_after_split);
        }

        if !splitting_root {
            self.internal_insert(parent_of_split, new_page_num)?;
            self.page_for_write(new_page_num)?.set_parent(parent_of_split);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Removes the cell under the cursor. A leaf left empty merges into
    /// its left sibling, and only its left sibling, when that sibling has
    /// room; otherwise the empty leaf stays. No redistribution.
    pub fn leaf_delete(&mut self, cursor: &Cursor) -> Result<(), StorageError> {
        {
            let page = self.page_for_write(cursor.page_num)?;
            let num_cells = page.leaf_num_cells();
            if cursor.cell_num >= num_cells {
                return Ok(());
            }
            for i in cursor.cell_num..num_cells - 1 {
                let cell = page.leaf_cell(i as usize + 1);
                page.set_leaf_cell(i as usize, &cell);
            }
            page.set_leaf_num_cells(num_cells - 1);
        }

        let (now_empty, is_root) = {
            let page = self.page_for_read(cursor.page_num)?;
            (page.leaf_num_cells() == 0, page.is_root())
        };
        if !now_empty || is_root {
            return Ok(());
        }

        let parent_page_num = self.page_for_read(cursor.page_num)?.parent();
        let child_index = {
            let parent = self.page_for_read(parent_page_num)?;
            let num_keys = parent.internal_num_keys();
            let mut child_index = 0;
            for i in 0..num_keys {
                if parent.internal_cell_child(i as usize) == cursor.page_num {
                    child_index = i;
                    break;
                }
            }
            child_index
        };
        // The rightmost child has no left sibling in the cell array; it is
        // left empty in place.
        if child_index == 0 {
            return Ok(());
        }

        let left_sibling_page_num = self
            .page_for_read(parent_page_num)?
            .internal_cell_child(child_index as usize - 1);
        let left_cells = self.page_for_read(left_sibling_page_num)?.leaf_num_cells();
        if (left_cells as usize) < LEAF_NODE_MAX_CELLS {
            self.leaf_merge(left_sibling_page_num, cursor.page_num)?;
        }
        Ok(())
    }

    /// Folds the right leaf into the left one: cells append, the leaf
    /// chain relinks, and the right node's entry disappears from the
    /// parent. The right page's buffer is dropped and its number leaked.
    pub fn leaf_merge(
        &mut self,
        left_page_num: PageId,
        right_page_num: PageId,
    ) -> Result<(), StorageError> {
        crate::strata_debug_log!(
            "[Table::leaf_merge] merging page {right_page_num} into page {left_page_num}"
        );
        let (right_cells, right_next_leaf, parent_page_num) = {
            let right_node = self.page_for_read(right_page_num)?;
            (
                right_node.leaf_num_cells(),
                right_node.leaf_next_leaf(),
                right_node.parent(),
            )
        };
        let left_cells = self.page_for_read(left_page_num)?.leaf_num_cells();

        for i in 0..right_cells {
            let cell = self.page_for_read(right_page_num)?.leaf_cell(i as usize);
            self.page_for_write(left_page_num)?
                .set_leaf_cell((left_cells + i) as usize, &cell);
        }
        {
            let left_node = self.page_for_write(left_page_num)?;
            left_node.set_leaf_num_cells(left_cells + right_cells);
            left_node.set_leaf_next_leaf(right_next_leaf);
        }

        let parent = self.page_for_write(parent_page_num)?;
        let num_keys = parent.internal_num_keys();
        let mut child_index = 0;
        for i in 0..num_keys {
            if parent.internal_cell_child(i as usize) == right_page_num {
                child_index = i;
                break;
            }
        }
        for i in child_index..num_keys - 1 {
            let cell = parent.internal_cell(i as usize + 1);
            parent.set_internal_cell(i as usize, &cell);
        }
        parent.set_internal_num_keys(num_keys - 1);

        self.transaction.drop_shadow(right_page_num);
        self.pager.drop_slot(right_page_num);
        Ok(())
    }

    /// Folds the right internal node into the left one: the separator key
    /// between them comes down from the parent, the left node's right
    /// child becomes an inner cell under that separator, the right node's
    /// cells and right child append, and the right entry disappears from
    /// the parent. Moved children are re-parented. Not triggered by
    /// delete; kept as a rebalancing primitive.
    pub fn internal_merge(
        &mut self,
        parent_page_num: PageId,
        left_page_num: PageId,
        right_page_num: PageId,
    ) -> Result<(), StorageError> {
        let (separator_key, right_entry_index, parent_num_keys) = {
            let parent = self.page_for_read(parent_page_num)?;
            let num_keys = parent.internal_num_keys();
            let mut separator_key = 0;
            let mut right_entry_index = 0;
            for i in 0..num_keys {
                if parent.internal_cell_child(i as usize) == left_page_num {
                    separator_key = parent.internal_key(i as usize);
                }
                if parent.internal_cell_child(i as usize) == right_page_num {
                    right_entry_index = i;
                }
            }
            (separator_key, right_entry_index, num_keys)
        };

        let left_keys = self.page_for_read(left_page_num)?.internal_num_keys();
        let (right_keys, right_right_child) = {
            let right_node = self.page_for_read(right_page_num)?;
            (
                right_node.internal_num_keys(),
                right_node.internal_right_child(),
            )
        };

        // Pull the separator down; the left node's right child becomes the
        // cell under it.
        let left_right_child = self.page_for_read(left_page_num)?.internal_right_child();
        {
            let left_node = self.page_for_write(left_page_num)?;
            left_node.set_internal_cell_child(left_keys as usize, left_right_child);
            left_node.set_internal_key(left_keys as usize, separator_key);
        }

        for i in 0..right_keys {
            let cell = self.page_for_read(right_page_num)?.internal_cell(i as usize);
            self.page_for_write(left_page_num)?
                .set_internal_cell((left_keys + 1 + i) as usize, &cell);
        }
        {
            let left_node = self.page_for_write(left_page_num)?;
            left_node.set_internal_right_child(right_right_child);
            left_node.set_internal_num_keys(left_keys + right_keys + 1);
        }

        // Everything that moved now answers to the left node.
        let moved_keys = left_keys + right_keys + 1;
        for i in left_keys..moved_keys {
            let child_page_num = self.page_for_read(left_page_num)?.internal_cell_child(i as usize);
            self.page_for_write(child_page_num)?.set_parent(left_page_num);
        }
        if right_right_child != INVALID_PAGE_NUM {
            self.page_for_write(right_right_child)?
                .set_parent(left_page_num);
        }

        {
            let parent = self.page_for_write(parent_page_num)?;
            if parent.internal_right_child() == right_page_num {
                // The right node was the parent's right child, so the left
                // node's own cell (the last one) takes over that slot.
                parent.set_internal_right_child(left_page_num);
            } else {
                for i in right_entry_index..parent_num_keys - 1 {
                    let cell = parent.internal_cell(i as usize + 1);
                    parent.set_internal_cell(i as usize, &cell);
                }
            }
            parent.set_internal_num_keys(parent_num_keys - 1);
        }

        self.transaction.drop_shadow(right_page_num);
        self.pager.drop_slot(right_page_num);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// The largest key reachable from `page_num`: last leaf cell, or a
    /// walk down right children.
    fn node_max_key(&mut self, page_num: PageId) -> Result<u32, StorageError> {
        let mut current = page_num;
        loop {
            let page = self.page_for_read(current)?;
            match page.node_type() {
                NodeType::Leaf => {
                    let num_cells = page.leaf_num_cells() as usize;
                    if num_cells == 0 {
                        return Err(StorageError::Corrupt(format!(
                            "max key requested on empty leaf page {}",
                            current
                        )));
                    }
                    return Ok(page.leaf_key(num_cells - 1));
                }
                NodeType::Internal => {
                    let right_child = page.internal_right_child();
                    if right_child == INVALID_PAGE_NUM {
                        return Err(StorageError::Corrupt(format!(
                            "internal page {} has no right child",
                            current
                        )));
                    }
                    current = right_child;
                }
            }
        }
    }

    /// Renders the tree for inspection, one node per stanza.
    pub fn print_tree(&mut self) -> Result<String, StorageError> {
        let mut out = String::new();
        let root_page_num = self.root_page_num;
        self.print_node(&mut out, root_page_num, 0)?;
        Ok(out)
    }

    fn print_node(
        &mut self,
        out: &mut String,
        page_num: PageId,
        indentation_level: usize,
    ) -> Result<(), StorageError> {
        let node_type = self.page_for_read(page_num)?.node_type();
        match node_type {
            NodeType::Leaf => {
                let keys: Vec<u32> = {
                    let page = self.page_for_read(page_num)?;
                    (0..page.leaf_num_cells() as usize)
                        .map(|i| page.leaf_key(i))
                        .collect()
                };
                indent(out, indentation_level);
                out.push_str(&format!("- leaf (size {})\n", keys.len()));
                for key in keys {
                    indent(out, indentation_level + 1);
                    out.push_str(&format!("- {}\n", key));
                }
            }
            NodeType::Internal => {
                let (num_keys, children, keys, right_child) = {
                    let page = self.page_for_read(page_num)?;
                    let num_keys = page.internal_num_keys() as usize;
                    let children: Vec<PageId> =
                        (0..num_keys).map(|i| page.internal_cell_child(i)).collect();
                    let keys: Vec<u32> = (0..num_keys).map(|i| page.internal_key(i)).collect();
                    (num_keys, children, keys, page.internal_right_child())
                };
                indent(out, indentation_level);
                out.push_str(&format!("- internal (size {})\n", num_keys));
                if num_keys > 0 {
                    for i in 0..num_keys {
                        self.print_node(out, children[i], indentation_level + 1)?;
                        indent(out, indentation_level + 1);
                        out.push_str(&format!("- key {}\n", keys[i]));
                    }
                    self.print_node(out, right_child, indentation_level + 1)?;
                }
            }
        }
        Ok(())
    }
}

/// Binary search for the index of the child that should contain `key`:
/// the smallest index whose key is >= `key`, or `num_keys` for the right
/// child.
fn internal_find_child(page: &Page, key: u32) -> usize {
    let num_keys = page.internal_num_keys() as usize;
    let mut min_index = 0;
    let mut max_index = num_keys;
    while max_index != min_index {
        let index = (min_index + max_index) / 2;
        if page.internal_key(index) >= key {
            max_index = index;
        } else {
            min_index = index + 1;
        }
    }
    min_index
}

/// Rewrites the separator that currently reads `old_key`.
fn update_internal_key(page: &mut Page, old_key: u32, new_key: u32) {
    let old_child_index = internal_find_child(page, old_key);
    page.set_internal_key(old_child_index, new_key);
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}
