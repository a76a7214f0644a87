//! Paged file manager.
//!
//! Pages are fixed-size, lazily loaded from disk on first access, and kept
//! resident for the lifetime of the `Pager` — there is no eviction. A table
//! or index file may hold at most `TABLE_MAX_PAGES` pages; asking for one
//! beyond that is an internal invariant violation (the catalog/btree layers
//! are responsible for never requesting more), not a recoverable error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use common::{DbError, DbResult};

pub const PAGE_SIZE: usize = 4096;
pub const TABLE_MAX_PAGES: usize = 100;

/// A single in-memory page, always exactly `PAGE_SIZE` bytes.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<u8>,
}

impl Page {
    fn zeroed() -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE],
        }
    }
}

/// Owns the file handle for one table or index and the fixed-size array of
/// pages loaded from it. Pages are loaded lazily and never evicted; the
/// caller mutates page bytes in place and calls `flush` to persist, or
/// `flush_all`/`close` to persist everything before dropping the pager.
pub struct Pager {
    file: File,
    file_length: u64,
    pages: Vec<Option<Page>>,
    num_pages: usize,
}

impl Pager {
    pub fn open(path: &Path) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_length = file.metadata()?.len();
        if file_length as usize % PAGE_SIZE != 0 {
            log::warn!(
                "{}: file length {} is not a multiple of page size {}",
                path.display(),
                file_length,
                PAGE_SIZE
            );
        }
        let num_pages = (file_length as usize).div_ceil(PAGE_SIZE);
        let mut pages = Vec::with_capacity(TABLE_MAX_PAGES);
        pages.resize_with(TABLE_MAX_PAGES, || None);
        Ok(Self {
            file,
            file_length,
            pages,
            num_pages,
        })
    }

    /// Number of pages that currently exist in the backing file (including
    /// any allocated-but-not-yet-flushed pages).
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    fn check_bounds(&self, page_num: usize) -> DbResult<()> {
        if page_num >= TABLE_MAX_PAGES {
            // A caller bug (btree/catalog), not a user mistake: fatal rather
            // than a `Result` a caller could choose to ignore.
            panic!("{} (TABLE_MAX_PAGES = {TABLE_MAX_PAGES})", DbError::PageOutOfRange(page_num as u32));
        }
        Ok(())
    }

    /// Returns a mutable reference to the page, loading it from disk (or
    /// zero-initializing it, if it is beyond the current end of file) on
    /// first access.
    pub fn get_page(&mut self, page_num: usize) -> DbResult<&mut [u8]> {
        self.check_bounds(page_num)?;
        if self.pages[page_num].is_none() {
            let mut page = Page::zeroed();
            if page_num < self.num_pages {
                self.file.seek(SeekFrom::Start((page_num * PAGE_SIZE) as u64))?;
                let readable = self
                    .file_length
                    .saturating_sub((page_num * PAGE_SIZE) as u64)
                    .min(PAGE_SIZE as u64) as usize;
                if readable > 0 {
                    self.file.read_exact(&mut page.data[..readable])?;
                }
            }
            self.pages[page_num] = Some(page);
        }
        Ok(&mut self.pages[page_num].as_mut().unwrap().data)
    }

    /// Allocates the next unused page number, extending `num_pages`.
    pub fn allocate_page(&mut self) -> DbResult<usize> {
        if self.num_pages >= TABLE_MAX_PAGES {
            return Err(DbError::TableFull);
        }
        let page_num = self.num_pages;
        self.num_pages += 1;
        self.get_page(page_num)?;
        Ok(page_num)
    }

    /// Writes one resident page back to disk.
    pub fn flush(&mut self, page_num: usize) -> DbResult<()> {
        self.check_bounds(page_num)?;
        let Some(page) = &self.pages[page_num] else {
            return Ok(());
        };
        self.file.seek(SeekFrom::Start((page_num * PAGE_SIZE) as u64))?;
        self.file.write_all(&page.data)?;
        let end = (page_num * PAGE_SIZE + PAGE_SIZE) as u64;
        if end > self.file_length {
            self.file_length = end;
        }
        Ok(())
    }

    /// Flushes every resident page and syncs the file.
    pub fn flush_all(&mut self) -> DbResult<()> {
        for page_num in 0..self.num_pages {
            if self.pages[page_num].is_some() {
                self.flush(page_num)?;
            }
        }
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Flushes and releases the pager's resources. Equivalent to the
    /// original database's close-time pager teardown: every live page is
    /// written back regardless of whether it is a full or partial trailing
    /// page, since pages here are always `PAGE_SIZE` bytes on disk.
    pub fn close(mut self) -> DbResult<()> {
        self.flush_all()
    }
}
