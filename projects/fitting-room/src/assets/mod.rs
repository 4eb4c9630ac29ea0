// Garment asset cache: keys, the two-tier store, and the acquirer that fills it

pub mod acquire;
pub mod remote;
pub mod store;

use image::RgbaImage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Deterministic identifier derived from a garment's canonical source URL.
/// Used both as the memory-tier key and as the disk-tier file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_url(url: &str) -> Self {
        let canonical = canonicalize_url(url);
        let digest = Sha256::digest(canonical.as_bytes());
        CacheKey(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }

    /// Accepts only strings this type could have produced (64 lowercase hex chars).
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64
            && s
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| CacheKey(s.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses and re-serialises the URL so trivially different spellings
/// (host case, default port) map to the same key.
fn canonicalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match url::Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Processed, background-removed RGBA image of one clothing item.
/// Never mutated once built; re-processing produces a new asset.
#[derive(Debug, Clone, PartialEq)]
pub struct GarmentAsset {
    pub source_id: String,
    pub pixels: RgbaImage,
}

impl GarmentAsset {
    pub fn new(source_id: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            source_id: source_id.into(),
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Disk,
}

/// A store lookup result, tagged with the tier that served it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub tier: CacheTier,
    pub asset: Arc<GarmentAsset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable_and_hex() {
        let a = CacheKey::from_url("https://res.example.com/shirt.png");
        let b = CacheKey::from_url("https://res.example.com/shirt.png");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(CacheKey::parse(a.as_str()).is_some());
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_cache_key_canonicalizes() {
        let a = CacheKey::from_url("https://RES.example.com:443/shirt.png");
        let b = CacheKey::from_url("  https://res.example.com/shirt.png ");
        assert_eq!(a, b);
        assert_ne!(a, CacheKey::from_url("https://res.example.com/pants.png"));
    }

    #[test]
    fn test_cache_key_parse_rejects_foreign_names() {
        assert!(CacheKey::parse("notes.txt").is_none());
        assert!(CacheKey::parse(&"A".repeat(64)).is_none());
    }
}
