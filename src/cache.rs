//! Keyed cache of file-backed buffers.
//!
//! Each entry is a file named after its key inside the cache directory, so
//! `filename()` of a cached buffer is a stable path. Entries whose
//! modification time falls outside the freshness window are treated as
//! absent and removed on access.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::buffer::{BufferImpl, DataBuffer, FileBackedBuffer};
use crate::config::CacheConfig;
use crate::error::{BufferError, Result};

pub struct FileCache {
    dir: PathBuf,
    window: Option<Duration>,
    block_size: usize,
}

impl FileCache {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        info!("Using buffer cache at {}", config.dir.display());
        Ok(Self {
            dir: config.dir.clone(),
            window: config.window(),
            block_size: config.block_size.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if !valid {
            return Err(BufferError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.dir.join(key))
    }

    /// Start a new entry, replacing any existing one.
    pub fn create(&self, key: &str) -> Result<DataBuffer> {
        let path = self.path_for(key)?;
        let buf = FileBackedBuffer::create(&path, self.block_size)?;
        debug!("Created cache entry {}", key);
        Ok(DataBuffer::from_impl(buf))
    }

    /// Open a fresh entry. Missing and stale entries yield `None`.
    pub fn open(&self, key: &str) -> Result<Option<DataBuffer>> {
        let path = self.path_for(key)?;
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if self.is_stale(modified) {
            debug!("Cache entry {} expired", key);
            remove_if_exists(&path)?;
            return Ok(None);
        }
        let buf = FileBackedBuffer::open(&path, self.block_size)?;
        Ok(Some(DataBuffer::from_impl(buf)))
    }

    /// Store the content of `buf` under `key`.
    ///
    /// File-backed sources are hard-linked when possible; everything else is
    /// streamed chunk by chunk. A linked entry shares its file with the
    /// source: later writes through either one reach the other, and the
    /// size recorded by the other handle goes stale. Store a
    /// [`DataBuffer::copy`] to keep them apart.
    ///
    /// Fails with `Io`, leaving no entry, when the source yields fewer bytes
    /// than its size.
    pub fn store(&self, key: &str, buf: &DataBuffer) -> Result<DataBuffer> {
        let path = self.path_for(key)?;
        if let Some(source) = buf.filename() {
            if source == path {
                return Ok(buf.clone());
            }
            remove_if_exists(&path)?;
            match fs::hard_link(&source, &path) {
                Ok(()) => {
                    let stored = FileBackedBuffer::open(&path, self.block_size)?;
                    if stored.size() != buf.size() {
                        let err = BufferError::truncated(stored.size(), buf.size());
                        drop(stored);
                        remove_if_exists(&path)?;
                        return Err(err);
                    }
                    debug!("Linked {} into cache entry {}", source.display(), key);
                    return Ok(DataBuffer::from_impl(stored));
                }
                Err(e) => warn!("Hard link of {} failed, copying instead: {}", source.display(), e),
            }
        }

        let mut target = self.create(key)?;
        let copied = buf.view().copy_to(&mut target);
        match copied {
            Ok(size) => {
                debug!("Stored {} bytes in cache entry {}", size, key);
                Ok(target)
            }
            Err(e) => {
                drop(target);
                remove_if_exists(&path)?;
                Err(e)
            }
        }
    }

    /// Delete the entry for `key`; returns whether one existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        remove_if_exists(&path)
    }

    /// Delete every stale entry and return how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        if self.window.is_none() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            if self.is_stale(metadata.modified()?) && remove_if_exists(&entry.path())? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Purged {} expired cache entries", removed);
        }
        Ok(removed)
    }

    fn is_stale(&self, modified: SystemTime) -> bool {
        match self.window {
            Some(window) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age > window)
                .unwrap_or(false),
            None => false,
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
