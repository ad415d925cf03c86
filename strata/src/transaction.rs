//! Shadow-paging transactions.
//!
//! A transaction defers writes by keeping a private copy of each page it
//! touches. Reads inside the transaction consult the shadow first; commit
//! copies the shadows back into the cache and flushes them, rollback just
//! drops them.

use crate::page::Page;
use crate::{PageId, TABLE_MAX_PAGES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    None,
    Active,
    Committed,
    Aborted,
}

pub struct Transaction {
    state: TransactionState,
    shadows: Vec<Option<Box<Page>>>,
    modified: Vec<bool>,
    num_modified: u32,
}

impl Transaction {
    pub fn new() -> Self {
        let mut shadows = Vec::with_capacity(TABLE_MAX_PAGES);
        shadows.resize_with(TABLE_MAX_PAGES, || None);
        Transaction {
            state: TransactionState::None,
            shadows,
            modified: vec![false; TABLE_MAX_PAGES],
            num_modified: 0,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Starts a fresh transaction, discarding any shadows left over from a
    /// previous life of this object.
    pub fn begin(&mut self) {
        self.clear();
        self.state = TransactionState::Active;
    }

    pub fn has_shadow(&self, page_num: PageId) -> bool {
        (page_num as usize) < TABLE_MAX_PAGES && self.shadows[page_num as usize].is_some()
    }

    pub fn shadow(&self, page_num: PageId) -> Option<&Page> {
        self.shadows
            .get(page_num as usize)
            .and_then(|slot| slot.as_deref())
    }

    /// Returns the shadow for `page_num`, copying `source` into a new one
    /// on first touch and marking the page modified.
    pub fn ensure_shadow(&mut self, page_num: PageId, source: &Page) -> &mut Page {
        let slot = page_num as usize;
        if self.shadows[slot].is_none() && !self.modified[slot] {
            self.modified[slot] = true;
            self.num_modified += 1;
        }
        self.shadows[slot].get_or_insert_with(|| Box::new(source.clone()))
    }

    /// Modified page numbers in ascending order; commit walks these.
    pub fn modified_pages(&self) -> Vec<PageId> {
        (0..TABLE_MAX_PAGES as u32)
            .filter(|&page_num| self.modified[page_num as usize])
            .collect()
    }

    pub fn take_shadow(&mut self, page_num: PageId) -> Option<Box<Page>> {
        self.shadows[page_num as usize].take()
    }

    /// Discards the shadow of a page abandoned mid-transaction (leaf
    /// merge); the page must not reappear in the commit set.
    pub fn drop_shadow(&mut self, page_num: PageId) {
        let slot = page_num as usize;
        if slot >= TABLE_MAX_PAGES {
            return;
        }
        self.shadows[slot] = None;
        if self.modified[slot] {
            self.modified[slot] = false;
            self.num_modified -= 1;
        }
    }

    pub fn num_modified(&self) -> u32 {
        self.num_modified
    }

    /// Drops all shadows and resets the bitmap, entering `state`.
    pub fn finish(&mut self, state: TransactionState) {
        self.clear();
        self.state = state;
    }

    fn clear(&mut self) {
        for slot in self.shadows.iter_mut() {
            *slot = None;
        }
        self.modified.fill(false);
        self.num_modified = 0;
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::new()
    }
}
