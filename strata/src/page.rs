//! Page layout and node codec.
//!
//! A page is a raw 4096-byte buffer holding exactly one B+tree node. Every
//! field lives at a fixed offset and is decoded through a typed accessor;
//! multi-byte fields are little-endian on disk.

use crate::error::StorageError;
use crate::row::ROW_SIZE;
use crate::{INVALID_PAGE_NUM, PAGE_SIZE, PageId};

/*
 * Common node header, shared by both node kinds:
 *   node_type (1) | is_root (1) | parent page number (4)
 */
const NODE_TYPE_OFFSET: usize = 0;
const IS_ROOT_OFFSET: usize = 1;
const PARENT_POINTER_OFFSET: usize = 2;
pub const COMMON_NODE_HEADER_SIZE: usize = 6;

/*
 * Leaf node header: num_cells (4) | next_leaf (4). A next_leaf of 0 means
 * this is the rightmost leaf.
 */
const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + 4;
pub const LEAF_NODE_HEADER_SIZE: usize = COMMON_NODE_HEADER_SIZE + 8;

/// Leaf cell: key (4) | serialized row.
pub const LEAF_NODE_KEY_SIZE: usize = 4;
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + ROW_SIZE;
pub const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;
pub const LEAF_NODE_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;

/// How a full leaf's cells (plus the incoming one) divide on split.
pub const LEAF_NODE_RIGHT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 1) / 2;
pub const LEAF_NODE_LEFT_SPLIT_COUNT: usize =
    LEAF_NODE_MAX_CELLS + 1 - LEAF_NODE_RIGHT_SPLIT_COUNT;

/*
 * Internal node header: num_keys (4) | right_child (4). The right child is
 * the subtree for keys greater than every stored key.
 */
const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize = INTERNAL_NODE_NUM_KEYS_OFFSET + 4;
pub const INTERNAL_NODE_HEADER_SIZE: usize = COMMON_NODE_HEADER_SIZE + 8;

/// Internal cell: child page number (4) | key (4).
const INTERNAL_NODE_CHILD_SIZE: usize = 4;
pub const INTERNAL_NODE_CELL_SIZE: usize = 8;

/// Kept tiny so split logic exercises even on small tables.
pub const INTERNAL_NODE_MAX_CELLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

/// One page-sized buffer. The pager owns these; the tree borrows them.
#[derive(Clone)]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new() -> Self {
        Page {
            data: [0; PAGE_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn node_type(&self) -> NodeType {
        match self.data[NODE_TYPE_OFFSET] {
            1 => NodeType::Leaf,
            _ => NodeType::Internal,
        }
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.data[NODE_TYPE_OFFSET] = node_type as u8;
    }

    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] != 0
    }

    pub fn set_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    pub fn parent(&self) -> PageId {
        self.read_u32(PARENT_POINTER_OFFSET)
    }

    pub fn set_parent(&mut self, parent: PageId) {
        self.write_u32(PARENT_POINTER_OFFSET, parent);
    }

    pub fn initialize_leaf(&mut self) {
        self.set_node_type(NodeType::Leaf);
        self.set_root(false);
        self.set_leaf_num_cells(0);
        self.set_leaf_next_leaf(0);
    }

    pub fn initialize_internal(&mut self) {
        self.set_node_type(NodeType::Internal);
        self.set_root(false);
        self.set_internal_num_keys(0);
        // The root lives at page 0, so a zeroed right_child would silently
        // alias it; the sentinel keeps "unset" distinguishable.
        self.set_internal_right_child(INVALID_PAGE_NUM);
    }

    // Leaf accessors.

    pub fn leaf_num_cells(&self) -> u32 {
        self.read_u32(LEAF_NODE_NUM_CELLS_OFFSET)
    }

    pub fn set_leaf_num_cells(&mut self, num_cells: u32) {
        self.write_u32(LEAF_NODE_NUM_CELLS_OFFSET, num_cells);
    }

    pub fn leaf_next_leaf(&self) -> PageId {
        self.read_u32(LEAF_NODE_NEXT_LEAF_OFFSET)
    }

    pub fn set_leaf_next_leaf(&mut self, next_leaf: PageId) {
        self.write_u32(LEAF_NODE_NEXT_LEAF_OFFSET, next_leaf);
    }

    fn leaf_cell_offset(cell_num: usize) -> usize {
        LEAF_NODE_HEADER_SIZE + cell_num * LEAF_NODE_CELL_SIZE
    }

    pub fn leaf_key(&self, cell_num: usize) -> u32 {
        self.read_u32(Self::leaf_cell_offset(cell_num))
    }

    pub fn set_leaf_key(&mut self, cell_num: usize, key: u32) {
        self.write_u32(Self::leaf_cell_offset(cell_num), key);
    }

    pub fn leaf_value(&self, cell_num: usize) -> &[u8] {
        let offset = Self::leaf_cell_offset(cell_num) + LEAF_NODE_KEY_SIZE;
        &self.data[offset..offset + ROW_SIZE]
    }

    pub fn leaf_value_mut(&mut self, cell_num: usize) -> &mut [u8] {
        let offset = Self::leaf_cell_offset(cell_num) + LEAF_NODE_KEY_SIZE;
        &mut self.data[offset..offset + ROW_SIZE]
    }

    /// Copies a whole cell out; splits and shifts move cells between pages.
    pub fn leaf_cell(&self, cell_num: usize) -> [u8; LEAF_NODE_CELL_SIZE] {
        let offset = Self::leaf_cell_offset(cell_num);
        let mut cell = [0u8; LEAF_NODE_CELL_SIZE];
        cell.copy_from_slice(&self.data[offset..offset + LEAF_NODE_CELL_SIZE]);
        cell
    }

    pub fn set_leaf_cell(&mut self, cell_num: usize, cell: &[u8; LEAF_NODE_CELL_SIZE]) {
        let offset = Self::leaf_cell_offset(cell_num);
        self.data[offset..offset + LEAF_NODE_CELL_SIZE].copy_from_slice(cell);
    }

    // Internal accessors.

    pub fn internal_num_keys(&self) -> u32 {
        self.read_u32(INTERNAL_NODE_NUM_KEYS_OFFSET)
    }

    pub fn set_internal_num_keys(&mut self, num_keys: u32) {
        self.write_u32(INTERNAL_NODE_NUM_KEYS_OFFSET, num_keys);
    }

    pub fn internal_right_child(&self) -> PageId {
        self.read_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    pub fn set_internal_right_child(&mut self, child: PageId) {
        self.write_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET, child);
    }

    fn internal_cell_offset(cell_num: usize) -> usize {
        INTERNAL_NODE_HEADER_SIZE + cell_num * INTERNAL_NODE_CELL_SIZE
    }

    /// Raw child pointer of cell `cell_num`, with no bounds or sentinel
    /// checks; rebalancing writes cells before the key count catches up.
    pub fn internal_cell_child(&self, cell_num: usize) -> PageId {
        self.read_u32(Self::internal_cell_offset(cell_num))
    }

    pub fn set_internal_cell_child(&mut self, cell_num: usize, child: PageId) {
        self.write_u32(Self::internal_cell_offset(cell_num), child);
    }

    pub fn internal_key(&self, key_num: usize) -> u32 {
        self.read_u32(Self::internal_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE)
    }

    pub fn set_internal_key(&mut self, key_num: usize, key: u32) {
        self.write_u32(
            Self::internal_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE,
            key,
        );
    }

    pub fn internal_cell(&self, cell_num: usize) -> [u8; INTERNAL_NODE_CELL_SIZE] {
        let offset = Self::internal_cell_offset(cell_num);
        let mut cell = [0u8; INTERNAL_NODE_CELL_SIZE];
        cell.copy_from_slice(&self.data[offset..offset + INTERNAL_NODE_CELL_SIZE]);
        cell
    }

    pub fn set_internal_cell(&mut self, cell_num: usize, cell: &[u8; INTERNAL_NODE_CELL_SIZE]) {
        let offset = Self::internal_cell_offset(cell_num);
        self.data[offset..offset + INTERNAL_NODE_CELL_SIZE].copy_from_slice(cell);
    }

    /// Checked child lookup: `child_num == num_keys` resolves to the right
    /// child. Hitting the sentinel means the tree graph is inconsistent.
    pub fn internal_child(&self, child_num: usize) -> Result<PageId, StorageError> {
        let num_keys = self.internal_num_keys() as usize;
        if child_num > num_keys {
            return Err(StorageError::Corrupt(format!(
                "child index {} out of range for internal node with {} keys",
                child_num, num_keys
            )));
        }
        let child = if child_num == num_keys {
            self.internal_right_child()
        } else {
            self.internal_cell_child(child_num)
        };
        if child == INVALID_PAGE_NUM {
            return Err(StorageError::Corrupt(format!(
                "internal node child {} is an invalid page",
                child_num
            )));
        }
        Ok(child)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}
