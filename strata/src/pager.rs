use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::StorageError;
use crate::page::Page;
use crate::{PAGE_SIZE, PageId, TABLE_MAX_PAGES};

/// Owns the database file and a bounded cache of page buffers, indexed by
/// page number. Pages load lazily and stay resident until close; there is
/// no eviction.
pub struct Pager {
    file: File,
    file_length: u64,
    pub num_pages: u32,
    pages: Vec<Option<Box<Page>>>,
}

impl Pager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        crate::strata_debug_log!("[Pager::open] Opening database file at: {path_ref:?}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupt(format!(
                "file size {} is not a multiple of page size {}",
                file_length, PAGE_SIZE
            )));
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;
        crate::strata_debug_log!(
            "[Pager::open] File size: {file_length}, initial num_pages: {num_pages}"
        );

        let mut pages = Vec::with_capacity(TABLE_MAX_PAGES);
        pages.resize_with(TABLE_MAX_PAGES, || None);

        Ok(Self {
            file,
            file_length,
            num_pages,
            pages,
        })
    }

    /// Returns the cached page, loading it from disk on a miss. Requesting
    /// a page past the end of the file hands back a zeroed buffer and
    /// extends `num_pages`; this is how new pages come into existence.
    pub fn get(&mut self, page_num: PageId) -> Result<&Page, StorageError> {
        self.ensure_cached(page_num)?;
        match self.pages[page_num as usize].as_deref() {
            Some(page) => Ok(page),
            None => unreachable!("page {} was just cached", page_num),
        }
    }

    pub fn get_mut(&mut self, page_num: PageId) -> Result<&mut Page, StorageError> {
        self.ensure_cached(page_num)?;
        match self.pages[page_num as usize].as_deref_mut() {
            Some(page) => Ok(page),
            None => unreachable!("page {} was just cached", page_num),
        }
    }

    fn ensure_cached(&mut self, page_num: PageId) -> Result<(), StorageError> {
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(StorageError::TableFull);
        }
        if self.pages[page_num as usize].is_some() {
            return Ok(());
        }

        let mut page = Box::new(Page::new());
        let offset = page_num as u64 * PAGE_SIZE as u64;
        if offset < self.file_length {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(page.bytes_mut())?;
            crate::strata_debug_log!("[Pager::get] Loaded page {page_num} from disk");
        } else {
            crate::strata_debug_log!("[Pager::get] Page {page_num} is new, using zeroed buffer");
        }
        self.pages[page_num as usize] = Some(page);

        if page_num >= self.num_pages {
            self.num_pages = page_num + 1;
        }
        Ok(())
    }

    /// Writes one cached page back to its slot in the file and syncs.
    /// A short write is an error; there is no partial-page state.
    pub fn flush(&mut self, page_num: PageId) -> Result<(), StorageError> {
        let page = match self.pages[page_num as usize].as_deref() {
            Some(page) => page,
            None => {
                return Err(StorageError::Corrupt(format!(
                    "attempted to flush unloaded page {}",
                    page_num
                )));
            }
        };
        let offset = page_num as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.bytes())?;
        self.file.sync_all()?;
        let end = offset + PAGE_SIZE as u64;
        if end > self.file_length {
            self.file_length = end;
        }
        crate::strata_debug_log!("[Pager::flush] Wrote page {page_num}");
        Ok(())
    }

    /// Next free page number. Pages are allocated by bumping a counter;
    /// there is no free list, so dropped pages are never handed out again.
    pub fn allocate(&self) -> PageId {
        self.num_pages
    }

    pub fn is_cached(&self, page_num: PageId) -> bool {
        (page_num as usize) < TABLE_MAX_PAGES && self.pages[page_num as usize].is_some()
    }

    /// Forgets a cached buffer without flushing it. Used when a merge
    /// abandons a page; the page number leaks by design.
    pub fn drop_slot(&mut self, page_num: PageId) {
        if (page_num as usize) < TABLE_MAX_PAGES {
            self.pages[page_num as usize] = None;
        }
    }

    /// Flushes every populated slot. The file handle closes on drop.
    pub fn close(&mut self) -> Result<(), StorageError> {
        for page_num in 0..self.num_pages {
            if self.pages[page_num as usize].is_some() {
                self.flush(page_num)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pager_round_trip() {
        let temp_dir = tempdir().unwrap();
        let temp_path = temp_dir.path().join("test.db");

        let mut pager = Pager::open(&temp_path).unwrap();
        assert_eq!(pager.num_pages, 0);
        assert_eq!(pager.allocate(), 0);

        pager.get_mut(0).unwrap().bytes_mut()[100] = 0x5a;
        pager.flush(0).unwrap();
        drop(pager);

        let mut pager = Pager::open(&temp_path).unwrap();
        assert_eq!(pager.num_pages, 1);
        assert_eq!(pager.get(0).unwrap().bytes()[100], 0x5a);
    }

    #[test]
    fn test_get_past_file_end_extends_num_pages() {
        let temp_dir = tempdir().unwrap();
        let mut pager = Pager::open(temp_dir.path().join("test.db")).unwrap();

        pager.get(3).unwrap();
        assert_eq!(pager.num_pages, 4);
        assert!(pager.get(3).unwrap().bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_number_past_cache_is_table_full() {
        let temp_dir = tempdir().unwrap();
        let mut pager = Pager::open(temp_dir.path().join("test.db")).unwrap();

        let result = pager.get(TABLE_MAX_PAGES as PageId);
        assert!(matches!(result, Err(StorageError::TableFull)));
    }

    #[test]
    fn test_flush_of_unloaded_page_fails() {
        let temp_dir = tempdir().unwrap();
        let mut pager = Pager::open(temp_dir.path().join("test.db")).unwrap();
        assert!(matches!(pager.flush(0), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_torn_file_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let temp_path = temp_dir.path().join("torn.db");
        std::fs::write(&temp_path, vec![0u8; PAGE_SIZE + 17]).unwrap();

        assert!(matches!(
            Pager::open(&temp_path),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_close_flushes_populated_slots() {
        let temp_dir = tempdir().unwrap();
        let temp_path = temp_dir.path().join("test.db");

        let mut pager = Pager::open(&temp_path).unwrap();
        pager.get_mut(0).unwrap().bytes_mut()[0] = 1;
        pager.get_mut(1).unwrap().bytes_mut()[0] = 2;
        pager.close().unwrap();

        let len = std::fs::metadata(&temp_path).unwrap().len();
        assert_eq!(len, 2 * PAGE_SIZE as u64);
    }
}
