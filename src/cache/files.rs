//! On-disk layout of the response cache.
//!
//! ```text
//! cache/
//! ├── 3f2a…e1.meta.json   # CachedResponse
//! └── 3f2a…e1.body        # raw payload
//! ```
//!
//! Both halves of an entry share a stem derived from its URL. Anything
//! that does not form a complete, unexpired pair is evicted at startup.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use super::CacheError;
use super::meta::CachedResponse;

pub const META_SUFFIX: &str = ".meta.json";
pub const BODY_SUFFIX: &str = ".body";

/// Length of the hex stem (128 bits of blake3).
const STEM_LEN: usize = 32;

/// File stem of the entry for `url`.
pub fn stem_for(url: &str) -> String {
    let hash = blake3::hash(url.as_bytes());
    hex::encode(hash.as_bytes())[..STEM_LEN].to_string()
}

pub fn meta_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}{META_SUFFIX}"))
}

pub fn body_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}{BODY_SUFFIX}"))
}

/// Which half of an entry a file name is.
enum Half {
    Meta,
    Body,
}

fn classify(name: &str) -> Option<(&str, Half)> {
    let (stem, half) = if let Some(stem) = name.strip_suffix(META_SUFFIX) {
        (stem, Half::Meta)
    } else if let Some(stem) = name.strip_suffix(BODY_SUFFIX) {
        (stem, Half::Body)
    } else {
        return None;
    };
    let valid = stem.len() == STEM_LEN && stem.bytes().all(|b| b.is_ascii_hexdigit());
    valid.then_some((stem, half))
}

#[derive(Default)]
struct Pair {
    meta: Option<PathBuf>,
    body: Option<PathBuf>,
}

/// Result of a startup scan.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// URL -> metadata of every valid entry
    pub entries: FxHashMap<String, CachedResponse>,
    /// Number of files deleted
    pub evicted: usize,
}

/// Enumerate `dir`, keep valid pairs, delete everything else.
pub fn scan(dir: &Path, now: u64) -> Result<ScanResult, CacheError> {
    let mut result = ScanResult::default();
    let mut pairs: FxHashMap<String, Pair> = FxHashMap::default();

    let read_dir = fs::read_dir(dir).map_err(|e| CacheError::Io(dir.to_path_buf(), e))?;
    for dirent in read_dir {
        let dirent = dirent.map_err(|e| CacheError::Io(dir.to_path_buf(), e))?;
        let path = dirent.path();
        if !path.is_file() {
            crate::debug!("cache"; "ignoring non-file {}", path.display());
            continue;
        }
        let name = dirent.file_name().to_string_lossy().into_owned();
        match classify(&name) {
            Some((stem, Half::Meta)) => pairs.entry(stem.to_string()).or_default().meta = Some(path),
            Some((stem, Half::Body)) => pairs.entry(stem.to_string()).or_default().body = Some(path),
            None => result.evicted += evict(&[&path]),
        }
    }

    for (stem, pair) in pairs {
        match pair {
            Pair {
                meta: Some(meta),
                body: Some(body),
            } => match validate(&stem, &meta, &body, now) {
                Some(entry) => {
                    result.entries.insert(entry.url.clone(), entry);
                }
                None => result.evicted += evict(&[&meta, &body]),
            },
            Pair { meta, body } => {
                let orphans: Vec<&Path> = meta.iter().chain(body.iter()).map(PathBuf::as_path).collect();
                result.evicted += evict(&orphans);
            }
        }
    }

    Ok(result)
}

/// Decode and check one pair. `None` means evict.
fn validate(stem: &str, meta: &Path, body: &Path, now: u64) -> Option<CachedResponse> {
    let entry = match read_meta(meta) {
        Ok(entry) => entry,
        Err(e) => {
            crate::debug!("cache"; "{}", e);
            return None;
        }
    };
    if entry.is_expired(now) {
        crate::debug!("cache"; "expired: {}", entry.url);
        return None;
    }
    if stem_for(&entry.url) != stem {
        crate::debug!("cache"; "stem mismatch for {}", entry.url);
        return None;
    }
    let body_len = fs::metadata(body).map(|m| m.len()).ok()?;
    if body_len != entry.len {
        crate::debug!("cache"; "torn entry for {} ({} != {} bytes)", entry.url, body_len, entry.len);
        return None;
    }
    Some(entry)
}

pub fn read_meta(path: &Path) -> Result<CachedResponse, CacheError> {
    let bytes = fs::read(path).map_err(|e| CacheError::Io(path.to_path_buf(), e))?;
    serde_json::from_slice(&bytes).map_err(|e| CacheError::Meta(path.to_path_buf(), e))
}

/// Delete files, returning how many were removed.
pub fn evict(paths: &[&Path]) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {
                crate::debug!("cache"; "evicted {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => crate::log!("cache"; "failed to evict {}: {}", path.display(), e),
        }
    }
    removed
}
