//! A single file behind a bounded page cache.  Presents the std io traits plus explicit length
//! management so the rest of the engine can treat the container as one seekable byte array.
//!
//! Reads fill whole pages into a clean cache; writes go to a dirty set that `flush` writes back
//! in offset order.  The clean cache is bounded by a byte budget and simply cleared when it
//! overflows, dirty pages are never dropped.  The journal protocol depends on `flush` making
//! everything written so far durable before it returns, so by default it ends with a full sync.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};

/// Cache page size in bytes.
const PAGE_SIZE: u64 = 4096;

pub(crate) struct PagedFile {
    file: File,
    len: u64,
    seek_pos: u64,
    clean: HashMap<u64, Vec<u8>>,
    dirty: HashMap<u64, Vec<u8>>,
    max_clean_pages: usize,
    sync_on_flush: bool,
}

impl PagedFile {
    /// Wrap an open file.  `cache_size` is the clean cache byte budget.
    pub fn new(mut file: File, cache_size: u32, sync_on_flush: bool) -> io::Result<Self> {
        let len = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            len,
            seek_pos: 0,
            clean: HashMap::new(),
            dirty: HashMap::new(),
            max_clean_pages: Self::budget_pages(cache_size),
            sync_on_flush,
        })
    }

    fn budget_pages(cache_size: u32) -> usize {
        ((cache_size as u64 / PAGE_SIZE) as usize).max(1)
    }

    /// Logical file length, including bytes still sitting in dirty pages.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Change the clean cache byte budget.
    pub fn set_cache_budget(&mut self, cache_size: u32) {
        self.max_clean_pages = Self::budget_pages(cache_size);
        if self.clean.len() > self.max_clean_pages {
            self.clean.clear();
        }
    }

    /// Truncate or extend the file to `len`.  Extension zero fills.
    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        if len < self.len {
            let keep_pages = len.div_ceil(PAGE_SIZE);
            self.clean.retain(|idx, _| *idx < keep_pages);
            self.dirty.retain(|idx, _| *idx < keep_pages);
            // Zero the tail of the boundary page so stale bytes never come back.
            let offset = (len % PAGE_SIZE) as usize;
            if offset != 0 {
                let idx = len / PAGE_SIZE;
                for cache in [&mut self.clean, &mut self.dirty] {
                    if let Some(page) = cache.get_mut(&idx) {
                        page[offset..].fill(0);
                    }
                }
            }
        }
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Write all dirty pages back and make them durable.
    pub fn flush_pages(&mut self) -> io::Result<()> {
        let mut indexes: Vec<u64> = self.dirty.keys().copied().collect();
        indexes.sort_unstable();
        for idx in indexes {
            let page = self.dirty.remove(&idx).expect("index came from the map");
            let start = idx * PAGE_SIZE;
            // Never write past the logical length, the on-disk size must match it exactly.
            let end = (start + PAGE_SIZE).min(self.len);
            if end > start {
                self.file.seek(SeekFrom::Start(start))?;
                self.file.write_all(&page[..(end - start) as usize])?;
            }
            self.clean.insert(idx, page);
        }
        if self.clean.len() > self.max_clean_pages {
            self.clean.clear();
        }
        self.file.flush()?;
        if self.sync_on_flush {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Load a page from disk, zero filled past the on-disk end.
    fn load_page(&mut self, idx: u64) -> io::Result<Vec<u8>> {
        let mut page = vec![0_u8; PAGE_SIZE as usize];
        self.file.seek(SeekFrom::Start(idx * PAGE_SIZE))?;
        let mut filled = 0;
        while filled < page.len() {
            match self.file.read(&mut page[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(page)
    }

    /// Borrow a page for reading, loading it into the clean cache on a miss.
    fn read_page(&mut self, idx: u64) -> io::Result<&[u8]> {
        if self.dirty.contains_key(&idx) {
            return Ok(self.dirty.get(&idx).expect("just checked"));
        }
        if !self.clean.contains_key(&idx) {
            let page = self.load_page(idx)?;
            if self.clean.len() >= self.max_clean_pages {
                self.clean.clear();
            }
            self.clean.insert(idx, page);
        }
        Ok(self.clean.get(&idx).expect("just inserted"))
    }

    /// Borrow a page for writing, moving it into the dirty set.
    fn write_page(&mut self, idx: u64) -> io::Result<&mut Vec<u8>> {
        if !self.dirty.contains_key(&idx) {
            let page = match self.clean.remove(&idx) {
                Some(page) => page,
                None => self.load_page(idx)?,
            };
            self.dirty.insert(idx, page);
        }
        Ok(self.dirty.get_mut(&idx).expect("just inserted"))
    }
}

impl Read for PagedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.seek_pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.len - self.seek_pos) as usize;
        let mut copied = 0;
        while copied < want {
            let pos = self.seek_pos + copied as u64;
            let idx = pos / PAGE_SIZE;
            let offset = (pos % PAGE_SIZE) as usize;
            let chunk = (PAGE_SIZE as usize - offset).min(want - copied);
            let page = self.read_page(idx)?;
            buf[copied..copied + chunk].copy_from_slice(&page[offset..offset + chunk]);
            copied += chunk;
        }
        self.seek_pos += copied as u64;
        Ok(copied)
    }
}

impl Write for PagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut copied = 0;
        while copied < buf.len() {
            let pos = self.seek_pos + copied as u64;
            let idx = pos / PAGE_SIZE;
            let offset = (pos % PAGE_SIZE) as usize;
            let chunk = (PAGE_SIZE as usize - offset).min(buf.len() - copied);
            let page = self.write_page(idx)?;
            page[offset..offset + chunk].copy_from_slice(&buf[copied..copied + chunk]);
            copied += chunk;
        }
        self.seek_pos += copied as u64;
        self.len = self.len.max(self.seek_pos);
        Ok(copied)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_pages()
    }
}

impl Seek for PagedFile {
    /// Seek against the logical length; positions never clamp below zero.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(pos) => self.seek_pos = pos,
            SeekFrom::End(pos) => {
                let end = self.len as i64 + pos;
                self.seek_pos = if end >= 0 { end as u64 } else { 0 };
            }
            SeekFrom::Current(pos) => {
                let end = self.seek_pos as i64 + pos;
                self.seek_pos = if end >= 0 { end as u64 } else { 0 };
            }
        }
        Ok(self.seek_pos)
    }
}
