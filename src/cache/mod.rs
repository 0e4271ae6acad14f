//! Durable response cache.
//!
//! One directory of paired metadata/payload files, indexed in memory by URL.
//!
//! # Lifecycle
//!
//! ```text
//! open()  ──> scan dir, evict expired/torn/orphaned files (eager)
//! get()   ──> index lookup, None once expired (lazy, files stay)
//! add()   ──> write body, then metadata
//! remove()──> delete metadata, then body
//! ```
//!
//! The two files of an entry are not written atomically together. A crash
//! in between leaves an orphan that the next `open()` deletes.
//!
//! The index has no lock of its own; callers serialize access (the server
//! caller keeps the cache behind its own mutex).

mod files;
mod meta;

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::{PageKey, unix_now};
use crate::spec::{PageSpec, decode_page};

pub use meta::{CachedResponse, Freshness};

/// Default cache directory (relative to the config file)
pub const CACHE_DIR: &str = ".tandem/cache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid cache metadata {0}: {1}")]
    Meta(PathBuf, #[source] serde_json::Error),
}

/// Disk-backed `url -> (metadata, bytes)` store.
#[derive(Debug)]
pub struct ResponseCache {
    dir: PathBuf,
    index: FxHashMap<String, CachedResponse>,
}

impl ResponseCache {
    /// Open (creating if needed) the cache in `dir`, evicting invalid entries.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::Io(dir.clone(), e))?;

        let scan = files::scan(&dir, unix_now())?;
        if scan.evicted > 0 {
            crate::log!("cache"; "evicted {} stale file(s)", scan.evicted);
        }
        crate::debug!("cache"; "opened {} with {} entries", dir.display(), scan.entries.len());

        Ok(Self {
            dir,
            index: scan.entries,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Metadata for `url`, unless missing or expired.
    pub fn get(&self, url: &str) -> Option<&CachedResponse> {
        self.get_at(url, unix_now())
    }

    /// Like [`get`](Self::get) at an explicit time.
    pub fn get_at(&self, url: &str, now: u64) -> Option<&CachedResponse> {
        self.index.get(url).filter(|meta| !meta.is_expired(now))
    }

    /// Payload bytes for `url`, unless missing, expired or not the length
    /// its metadata records.
    pub fn get_body(&self, url: &str) -> Option<Vec<u8>> {
        let meta = self.get(url)?;
        let path = files::body_path(&self.dir, &files::stem_for(url));
        match fs::read(&path) {
            Ok(bytes) if bytes.len() as u64 == meta.len => Some(bytes),
            Ok(bytes) => {
                crate::log!(
                    "cache";
                    "{} is {} bytes, expected {}",
                    path.display(),
                    bytes.len(),
                    meta.len
                );
                None
            }
            Err(e) => {
                crate::log!("cache"; "failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Decoded page for `key`. Never fails: problems are logged.
    pub fn get_page_spec(&self, key: &PageKey) -> Option<PageSpec> {
        let bytes = self.get_body(key.as_str())?;
        match decode_page(&bytes) {
            Ok(spec) => Some(spec),
            Err(e) => {
                crate::log!("cache"; "undecodable page {}: {}", key, e);
                None
            }
        }
    }

    /// Store `bytes` under `meta.url`, replacing any existing entry.
    pub fn add(&mut self, mut meta: CachedResponse, bytes: &[u8]) -> Result<(), CacheError> {
        meta.len = bytes.len() as u64;
        let stem = files::stem_for(&meta.url);

        let body = files::body_path(&self.dir, &stem);
        let written = fs::write(&body, bytes)
            .map_err(|e| CacheError::Io(body.clone(), e))
            .and_then(|()| self.write_meta(&stem, &meta));
        if let Err(e) = written {
            // The old metadata no longer describes what is on disk.
            self.index.remove(&meta.url);
            self.discard(&stem);
            return Err(e);
        }

        crate::debug!("cache"; "stored {} ({} bytes)", meta.url, meta.len);
        self.index.insert(meta.url.clone(), meta);
        Ok(())
    }

    /// Extend the lifetime of an existing entry (after a `304`).
    ///
    /// Returns false if there is no entry to extend.
    pub fn refresh(
        &mut self,
        url: &str,
        expires_at: u64,
        refresh_at: u64,
    ) -> Result<bool, CacheError> {
        let Some(existing) = self.index.get(url) else {
            return Ok(false);
        };
        let mut meta = existing.clone();
        meta.expires_at = expires_at;
        meta = meta.with_refresh_at(refresh_at);

        self.write_meta(&files::stem_for(url), &meta)?;
        self.index.insert(url.to_string(), meta);
        Ok(true)
    }

    /// Delete the entry for `url`. Returns whether one existed.
    pub fn remove(&mut self, url: &str) -> Result<bool, CacheError> {
        let existed = self.index.remove(url).is_some();
        let stem = files::stem_for(url);
        for path in [files::meta_path(&self.dir, &stem), files::body_path(&self.dir, &stem)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::Io(path, e)),
            }
        }
        Ok(existed)
    }

    /// Every indexed entry, expired or not, sorted by URL.
    pub fn entries(&self) -> Vec<&CachedResponse> {
        let mut entries: Vec<_> = self.index.values().collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        entries
    }

    /// Remove every entry. Returns how many were removed.
    pub fn purge(&mut self) -> Result<usize, CacheError> {
        let urls: Vec<String> = self.index.keys().cloned().collect();
        for url in &urls {
            self.remove(url)?;
        }
        Ok(urls.len())
    }

    /// Best-effort removal of both files of `stem`.
    fn discard(&self, stem: &str) {
        for path in [files::meta_path(&self.dir, stem), files::body_path(&self.dir, stem)] {
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                crate::debug!("cache"; "failed to remove {}: {}", path.display(), e);
            }
        }
    }

    fn write_meta(&self, stem: &str, meta: &CachedResponse) -> Result<(), CacheError> {
        let path = files::meta_path(&self.dir, stem);
        let json = serde_json::to_vec_pretty(meta).map_err(|e| CacheError::Meta(path.clone(), e))?;
        fs::write(&path, json).map_err(|e| CacheError::Io(path, e))
    }
}
