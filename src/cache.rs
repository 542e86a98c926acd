//! The public cache facade, coordinating the journal, payload store, and
//! LRU index under a single read/write lock.
//!
//! `fetch`/`store`/`delete`/`mem_size`/`clear_memory` are synchronous:
//! internally they take the lock through `tokio::task::block_in_place` +
//! `Handle::current().block_on`, the idiom for offering a blocking call
//! over an async lock. `flush`/`file_size`/`clear_all` touch storage and
//! are scheduled on a background worker via `tokio::task::spawn`,
//! returning a [`CacheHandle`] rather than blocking the caller on disk I/O.
use crate::{
    config::CacheConfig,
    entry::{CacheEntry, EntryState},
    error::Result,
    flush,
    fs::{Clock, Filesystem, RealFilesystem, SystemClock},
    index::LruIndex,
    journal::{self, Journal},
    key,
    layout::Layout,
    store::PayloadStore,
};
use std::sync::Arc;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{info, warn};

/// A handle to work scheduled on a background worker. Completes when the
/// work is done; dropping a handle without awaiting it leaves the
/// persistence outcome undefined. Callers that need determinism should
/// issue another `flush`.
pub struct CacheHandle<T>(JoinHandle<T>);

impl<T: Send + 'static> CacheHandle<T> {
    pub async fn join(self) -> T {
        self.0.await.expect("background cache task panicked")
    }
}

#[derive(Clone)]
pub struct TieredCache {
    index: Arc<RwLock<LruIndex>>,
    store: PayloadStore,
    journal: Journal,
    fs: Arc<dyn Filesystem>,
    layout: Layout,
    clock: Arc<dyn Clock>,
    max_memory: u64,
    max_disk: u64,
}

impl TieredCache {
    /// Opens (and, if needed, creates and recovers) the cache rooted at
    /// `config.cache_location()`, against the real filesystem and clock.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::open_with(config, Arc::new(RealFilesystem), Arc::new(SystemClock))
    }

    /// Same as [`Self::open`], injecting the filesystem/clock capability
    /// objects so unit tests can avoid touching real disk.
    pub fn open_with(
        config: CacheConfig,
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (max_memory, max_disk) = config.resolve();
        let layout = Layout::new(config.cache_location());

        fs.create_dir_all(&layout.payload_dir())?;
        fs.create_dir_all(&layout.journal_dir())?;

        let journal = Journal::new(layout.clone(), fs.clone(), clock.clone());
        let store = PayloadStore::new(layout.clone(), fs.clone());

        if journal.exists() {
            let removed = journal::recover(&journal, &store)?;
            for key in &removed {
                info!(key, "recovery removed a partial payload file");
            }
        }
        journal.reset()?;

        Ok(Self {
            index: Arc::new(RwLock::new(LruIndex::new())),
            store,
            journal,
            fs,
            layout,
            clock,
            max_memory,
            max_disk,
        })
    }

    fn block_on<F, R>(&self, fut: F) -> R
    where
        F: std::future::Future<Output = R>,
    {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
    }

    /// Returns the payload for `key`, or `None` if it is unknown or
    /// tombstoned. Promotes the entry to MRU and evicts down to
    /// `max_size_in_memory` if needed.
    pub fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        key::validate(key)?;
        self.block_on(async move {
            let now = self.clock.now();
            let mut index = self.index.write().await;

            if matches!(index.peek(key), Some(e) if e.state == EntryState::Deleted) {
                return Ok(None);
            }

            if !index.contains(key) {
                match self.store.read(key)? {
                    None => return Ok(None),
                    Some(bytes) => index.put(CacheEntry::new(key, bytes, EntryState::Synced, now)),
                }
            }

            let bytes = {
                let entry = index
                    .get(key, now)
                    .expect("entry was just confirmed present");
                if entry.state == EntryState::Synced {
                    entry.state = EntryState::Accessed;
                }
                entry.bytes.clone()
            };

            index.evict_until(self.max_memory as usize);

            Ok(Some(bytes))
        })
    }

    /// Stores `bytes` under `key` in memory only; `flush` is required to
    /// persist it. Never evicts; the memory budget is enforced lazily on
    /// `fetch`/`flush`, keeping `store` O(1).
    pub fn store(&self, key: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        key::validate(key)?;
        let bytes = bytes.into();
        self.block_on(async move {
            let now = self.clock.now();
            self.index
                .write()
                .await
                .put(CacheEntry::new(key, bytes, EntryState::Updated, now));
        });
        Ok(())
    }

    /// Marks `key` for removal from disk on the next `flush`.
    pub fn delete(&self, key: &str) -> Result<()> {
        key::validate(key)?;
        self.block_on(async move {
            let now = self.clock.now();
            let mut index = self.index.write().await;

            if !index.contains(key) {
                let bytes = self.store.read(key)?.unwrap_or_default();
                index.put(CacheEntry::new(key, bytes, EntryState::Synced, now));
            }

            if let Some(entry) = index.get(key, now) {
                entry.state = EntryState::Deleted;
            }

            Ok(())
        })
    }

    /// Empties the in-memory index; disk is unaffected.
    pub fn clear_memory(&self) {
        self.block_on(async move {
            self.index.write().await.clear();
        })
    }

    /// Byte-sum of all non-tombstoned entries currently in memory.
    pub fn mem_size(&self) -> u64 {
        self.block_on(async move { self.index.write().await.len_bytes() as u64 })
    }

    /// Sum of payload file sizes on disk, computed on a background worker.
    pub fn file_size(&self) -> CacheHandle<u64> {
        let cache = self.clone();
        CacheHandle(tokio::task::spawn(async move {
            let _index = cache.index.write().await;
            cache.store.total_size().unwrap_or_else(|e| {
                warn!("file_size: {e}");
                0
            })
        }))
    }

    /// Runs the flush engine then the trimmer on a background worker.
    /// Returns `true` on success; failures are logged and folded into
    /// `false` rather than propagated.
    pub fn flush(&self) -> CacheHandle<bool> {
        let cache = self.clone();
        CacheHandle(tokio::task::spawn(async move {
            let mut index = cache.index.write().await;
            let outcome = flush::run(&cache.journal, &cache.store, &mut index).and_then(|()| {
                flush::purge_oldest_entries(&cache.store, &index, cache.max_disk)
            });
            match outcome {
                Ok(()) => true,
                Err(e) => {
                    warn!("flush failed: {e}");
                    false
                }
            }
        }))
    }

    /// Empties the index, deletes the payload folder recursively, recreates
    /// empty payload/journal folders, and resets the journal to just its
    /// header. Runs on a background worker; returns `true` on success.
    pub fn clear_all(&self) -> CacheHandle<bool> {
        let cache = self.clone();
        CacheHandle(tokio::task::spawn(async move {
            let mut index = cache.index.write().await;
            let outcome = (|| -> Result<()> {
                index.clear();
                cache.fs.remove_dir_all(&cache.layout.payload_dir())?;
                cache.store.ensure_dir()?;
                cache.journal.reset()?;
                Ok(())
            })();
            match outcome {
                Ok(()) => true,
                Err(e) => {
                    warn!("clear_all failed: {e}");
                    false
                }
            }
        }))
    }
}
