// Acquirer: download → decode → remove background → cache.
//
// The store is written only after every step succeeded, so a failed or
// cancelled acquisition never leaves a partial entry behind.

use crate::assets::remote::{BackgroundRemover, GarmentSource};
use crate::assets::store::AssetStore;
use crate::assets::{CacheKey, GarmentAsset};
use crate::error::AcquisitionError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub fetch_timeout: Duration,
    pub segment_timeout: Duration,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            segment_timeout: Duration::from_secs(30),
        }
    }
}

type KeyLocks = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

pub struct AssetAcquirer {
    store: Arc<AssetStore>,
    source: Arc<dyn GarmentSource>,
    remover: Arc<dyn BackgroundRemover>,
    config: AcquireConfig,
    in_flight: KeyLocks,
}

/// Holds a reference to a per-key lock; the map entry goes away with the
/// last holder.
struct KeySlot<'a> {
    locks: &'a KeyLocks,
    key: CacheKey,
    lock: Arc<AsyncMutex<()>>,
}

impl<'a> KeySlot<'a> {
    fn claim(locks: &'a KeyLocks, key: &CacheKey) -> Self {
        let mut map = locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = map.entry(key.clone()).or_default().clone();
        Self {
            locks,
            key: key.clone(),
            lock,
        }
    }
}

impl Drop for KeySlot<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) <= 2 {
            map.remove(&self.key);
        }
    }
}

impl AssetAcquirer {
    pub fn new(
        store: Arc<AssetStore>,
        source: Arc<dyn GarmentSource>,
        remover: Arc<dyn BackgroundRemover>,
        config: AcquireConfig,
    ) -> Self {
        Self {
            store,
            source,
            remover,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    /// Returns the processed asset for `url`, from cache unless
    /// `force_reprocess` is set. Concurrent misses on the same URL share a
    /// single download and segmentation.
    pub async fn acquire(
        &self,
        url: &str,
        force_reprocess: bool,
    ) -> Result<Arc<GarmentAsset>, AcquisitionError> {
        let key = CacheKey::from_url(url);

        if !force_reprocess {
            if let Some(asset) = self.cached(&key).await {
                return Ok(asset);
            }
        }

        let slot = KeySlot::claim(&self.in_flight, &key);
        let _turn = slot.lock.clone().lock_owned().await;

        // Whoever held the lock before us may have filled the cache
        if !force_reprocess {
            if let Some(asset) = self.cached(&key).await {
                return Ok(asset);
            }
        }

        self.process(url, &key).await
    }

    async fn cached(&self, key: &CacheKey) -> Option<Arc<GarmentAsset>> {
        let store = self.store.clone();
        let lookup_key = key.clone();
        match tokio::task::spawn_blocking(move || store.lookup(&lookup_key)).await {
            Ok(hit) => hit.map(|entry| {
                debug!("Asset {} cache hit ({:?})", entry.key.short(), entry.tier);
                entry.asset
            }),
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", key.short(), e);
                None
            }
        }
    }

    async fn process(
        &self,
        url: &str,
        key: &CacheKey,
    ) -> Result<Arc<GarmentAsset>, AcquisitionError> {
        let start = Instant::now();
        info!("Downloading and processing {}", truncate(url, 50));

        let bytes = match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch(url))
            .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(AcquisitionError::Fetch {
                    url: url.to_string(),
                    message: format!("{:#}", e),
                })
            }
            Err(_) => {
                return Err(AcquisitionError::Timeout {
                    url: url.to_string(),
                    stage: "download",
                    timeout: self.config.fetch_timeout,
                })
            }
        };

        let photo = image::load_from_memory(&bytes)
            .map_err(|e| AcquisitionError::Decode {
                url: url.to_string(),
                source: e,
            })?
            .to_rgb8();

        let cutout = match tokio::time::timeout(
            self.config.segment_timeout,
            self.remover.remove_background(&photo),
        )
        .await
        {
            Ok(Ok(cutout)) => cutout,
            Ok(Err(e)) => {
                return Err(AcquisitionError::Segmentation {
                    url: url.to_string(),
                    message: format!("{:#}", e),
                })
            }
            Err(_) => {
                return Err(AcquisitionError::Timeout {
                    url: url.to_string(),
                    stage: "background removal",
                    timeout: self.config.segment_timeout,
                })
            }
        };

        let asset = Arc::new(GarmentAsset::new(key.as_str(), cutout));

        let store = self.store.clone();
        let store_key = key.clone();
        let stored = asset.clone();
        match tokio::task::spawn_blocking(move || store.put(&store_key, stored)).await {
            Ok(Ok(())) => info!(
                "Asset {} processed and cached in {:.1}ms",
                key.short(),
                start.elapsed().as_secs_f64() * 1000.0
            ),
            // The asset is still good for this request; it just won't be reused.
            Ok(Err(e)) => warn!("Failed to cache asset {}: {}", key.short(), e),
            Err(e) => warn!("Cache write for {} did not complete: {}", key.short(), e),
        }

        Ok(asset)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
