// Two-tier garment cache: a bounded LRU map in memory backed by PNG files on disk.
//
// The memory tier is always a subset of the disk tier: `put` persists to disk
// before touching the map, and a failed disk write leaves both tiers untouched.

use crate::assets::{CacheEntry, CacheKey, CacheTier, GarmentAsset};
use crate::error::StoreError;
use image::ImageFormat;
use lru::LruCache;
use serde::Serialize;
use std::fs;
use std::io::{Cursor, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const ASSET_EXTENSION: &str = "png";
const TEMP_PREFIX: &str = ".incoming-";

/// Occupancy snapshot for the admin surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_files: usize,
    pub capacity: usize,
}

/// Bounded LRU map of decoded assets. A zero capacity disables the tier.
struct MemoryTier {
    entries: Option<LruCache<CacheKey, Arc<GarmentAsset>>>,
}

impl MemoryTier {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    fn touch(&mut self, key: &CacheKey) -> Option<Arc<GarmentAsset>> {
        self.entries.as_mut()?.get(key).cloned()
    }

    /// Inserts or replaces `key`. When a new key overflows the tier, the
    /// least-recently-used entry goes and its key is returned.
    fn insert(&mut self, key: CacheKey, asset: Arc<GarmentAsset>) -> Option<CacheKey> {
        let entries = self.entries.as_mut()?;
        match entries.push(key.clone(), asset) {
            Some((old, _)) if old != key => Some(old),
            _ => None,
        }
    }

    #[cfg(test)]
    fn contains(&self, key: &CacheKey) -> bool {
        self.entries.as_ref().is_some_and(|e| e.contains(key))
    }

    fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.len())
    }

    fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }
}

pub struct AssetStore {
    root: PathBuf,
    capacity: usize,
    /// Shared by `get`/`put`, held exclusively by `clear`.
    gate: RwLock<()>,
    memory: Mutex<MemoryTier>,
}

impl AssetStore {
    /// Opens (creating if needed) a store rooted at `root` with room for
    /// `capacity` assets in memory.
    pub fn open(root: impl Into<PathBuf>, capacity: usize) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        info!(
            "Asset store opened at {:?} (memory capacity {})",
            root, capacity
        );
        Ok(Self {
            root,
            capacity,
            gate: RwLock::new(()),
            memory: Mutex::new(MemoryTier::with_capacity(capacity)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn asset_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.as_str(), ASSET_EXTENSION))
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<GarmentAsset>> {
        self.lookup(key).map(|entry| entry.asset)
    }

    /// Memory tier first, then disk. A disk hit is promoted into memory,
    /// evicting the least-recently-used entry if the tier is full.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let _shared = self.gate.read().unwrap_or_else(|e| e.into_inner());

        if let Some(asset) = self.memory().touch(key) {
            debug!("Asset {} served from memory", key.short());
            return Some(CacheEntry {
                key: key.clone(),
                tier: CacheTier::Memory,
                asset,
            });
        }

        let asset = Arc::new(self.read_disk(key)?);
        debug!("Asset {} served from disk", key.short());

        let promoted = {
            let mut memory = self.memory();
            // A concurrent put may have landed while we were decoding; its
            // asset is newer than what we read, so keep it.
            if let Some(current) = memory.touch(key) {
                current
            } else {
                if let Some(evicted) = memory.insert(key.clone(), asset.clone()) {
                    debug!("Evicted {} from memory tier", evicted.short());
                }
                asset
            }
        };

        Some(CacheEntry {
            key: key.clone(),
            tier: CacheTier::Disk,
            asset: promoted,
        })
    }

    fn read_disk(&self, key: &CacheKey) -> Option<GarmentAsset> {
        let path = self.asset_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read cached asset {:?}: {}", path, e);
                return None;
            }
        };

        match image::load_from_memory_with_format(&bytes, ImageFormat::Png) {
            Ok(img) => Some(GarmentAsset::new(key.as_str(), img.to_rgba8())),
            Err(e) => {
                warn!("Cached asset {:?} is unreadable, ignoring: {}", path, e);
                None
            }
        }
    }

    /// Persists `asset` to disk (write-then-rename) and then to memory.
    /// Replaces any existing entry for `key`.
    pub fn put(&self, key: &CacheKey, asset: Arc<GarmentAsset>) -> Result<(), StoreError> {
        let path = self.asset_path(key);

        let mut encoded = Vec::new();
        asset
            .pixels
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(|e| StoreError::Encode {
                path: path.clone(),
                source: e,
            })?;

        let _shared = self.gate.read().unwrap_or_else(|e| e.into_inner());

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| StoreError::io(&self.root, e))?;
        tmp.write_all(&encoded)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        if let Some(evicted) = self.memory().insert(key.clone(), asset) {
            debug!("Evicted {} from memory tier", evicted.short());
        }
        debug!("Asset {} stored at {:?}", key.short(), path);
        Ok(())
    }

    #[cfg(test)]
    pub fn contains_in_memory(&self, key: &CacheKey) -> bool {
        self.memory().contains(key)
    }

    #[cfg(test)]
    pub fn contains_on_disk(&self, key: &CacheKey) -> bool {
        self.asset_path(key).is_file()
    }

    pub fn stats(&self) -> CacheStats {
        let _shared = self.gate.read().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            memory_entries: self.memory().len(),
            disk_files: self.disk_files().count(),
            capacity: self.capacity,
        }
    }

    fn disk_files(&self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| stored_key(p).is_some())
    }

    /// Empties both tiers. Waits for in-flight `get`/`put` calls to finish and
    /// blocks new ones until done. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let _exclusive = self.gate.write().unwrap_or_else(|e| e.into_inner());
        self.memory().clear();

        let mut removed = 0;
        let stale: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| is_store_file(p))
            .collect();

        for path in stale {
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
            removed += 1;
        }

        info!("Asset store cleared ({} files removed)", removed);
        Ok(removed)
    }
}

/// Files the store owns: finished assets and leftover temp files.
fn is_store_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return false;
    };
    if name.starts_with(TEMP_PREFIX) {
        return true;
    }
    stored_key(path).is_some()
}

/// Key of an asset file, or `None` for anything the store did not write.
fn stored_key(path: &Path) -> Option<CacheKey> {
    if path.extension().and_then(|s| s.to_str()) != Some(ASSET_EXTENSION) {
        return None;
    }
    CacheKey::parse(path.file_stem()?.to_str()?)
}
