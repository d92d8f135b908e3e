//! Buffer pool: an LRU cache over Physical Pages keyed by
//! `(table_name, page_kind, page_index, column_index)`.
//!
//! Grounded on the pager pattern in the pack's SQL engine crates (an
//! `lru::LruCache` holding pages, with disk write-back on eviction of a
//! dirty page) rather than the teacher's incomplete `bufferpool.rs`.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use lru::LruCache;

use crate::error::EngineResult;
use crate::logical_page::PageKind;
use crate::page::Page;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub table: String,
    pub kind: PageKind,
    pub page_index: usize,
    pub column_index: usize,
}

impl PageKey {
    pub fn new(table: &str, kind: PageKind, page_index: usize, column_index: usize) -> Self {
        PageKey {
            table: table.to_string(),
            kind,
            page_index,
            column_index,
        }
    }

    fn dir_name(&self) -> String {
        match self.kind {
            PageKind::Base => format!("base_{}", self.page_index),
            PageKind::Tail => format!("tail_{}", self.page_index),
        }
    }

    fn data_path(&self, root: &Path) -> PathBuf {
        root.join(&self.table)
            .join(self.dir_name())
            .join(format!("page_{}.dat", self.column_index))
    }

    fn meta_path(&self, root: &Path) -> PathBuf {
        root.join(&self.table)
            .join(self.dir_name())
            .join(format!("page_{}.meta", self.column_index))
    }
}

struct Inner {
    cache: LruCache<PageKey, Page>,
    root: Option<PathBuf>,
}

/// Shared by every table in a `Database`. `get`/`put` serialize through a
/// single process-wide mutex, matching spec 4.10's stated policy.
pub struct BufferPool {
    inner: Mutex<Inner>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        BufferPool {
            inner: Mutex::new(Inner {
                cache: LruCache::new(capacity),
                root: None,
            }),
        }
    }

    pub fn set_root(&self, root: PathBuf) {
        self.inner.lock().unwrap().root = Some(root);
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.inner.lock().unwrap().root.clone()
    }

    pub fn read(&self, key: &PageKey, slot: usize) -> EngineResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        let page = self.fetch(&mut inner, key)?;
        page.read(slot)
    }

    pub fn write(&self, key: &PageKey, value: i64, slot: Option<usize>) -> EngineResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let page = self.fetch(&mut inner, key)?;
        let slot = page.write(value, slot)?;
        Ok(slot)
    }

    fn fetch<'a>(&self, inner: &'a mut Inner, key: &PageKey) -> EngineResult<&'a mut Page> {
        if inner.cache.contains(key) {
            return Ok(inner.cache.get_mut(key).unwrap());
        }

        let page = self.load_from_disk(inner, key)?.unwrap_or_else(Page::new);
        self.insert_with_eviction(inner, key.clone(), page);
        Ok(inner.cache.get_mut(key).unwrap())
    }

    fn load_from_disk(&self, inner: &Inner, key: &PageKey) -> EngineResult<Option<Page>> {
        let Some(root) = inner.root.as_ref() else {
            return Ok(None);
        };
        let path = key.data_path(root);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let num_written = fs::read_to_string(key.meta_path(root))
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0);
        Ok(Some(Page::from_raw(&bytes, num_written)?))
    }

    fn insert_with_eviction(&self, inner: &mut Inner, key: PageKey, page: Page) {
        if let Some((evicted_key, evicted_page)) = inner.cache.push(key, page) {
            if evicted_page.is_dirty() {
                debug!("evicting dirty page {:?}, writing back", evicted_key);
                if let Some(root) = inner.root.clone() {
                    let _ = self.write_back(&root, &evicted_key, &evicted_page);
                }
            }
        }
    }

    fn write_back(&self, root: &Path, key: &PageKey, page: &Page) -> EngineResult<()> {
        let data_path = key.data_path(root);
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&data_path, page.raw())?;
        fs::write(key.meta_path(root), page.num_written().to_string())?;
        Ok(())
    }

    /// Flush every dirty resident page to disk and clear dirty flags,
    /// used on `Database::close` (spec 4.13).
    pub fn flush_all(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(root) = inner.root.clone() else {
            return Ok(());
        };

        let dirty_keys: Vec<PageKey> = inner
            .cache
            .iter()
            .filter(|(_, page)| page.is_dirty())
            .map(|(k, _)| k.clone())
            .collect();

        for key in dirty_keys {
            let page = inner.cache.get(&key).unwrap().clone();
            self.write_back(&root, &key, &page)?;
            if let Some(p) = inner.cache.get_mut(&key) {
                p.clear_dirty();
            }
        }
        Ok(())
    }
}
