//! Program binary cache keyed by shader source
//!
//! Linking is the slowest step of most replays. When a program with identical
//! attached sources has been linked before, its binary is loaded instead. The link
//! status recorded with the entry must be reproduced, otherwise the caller falls
//! back to a real link.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub format: u32,
    /// Program binary, hex-encoded on disk
    #[serde(with = "hex_bytes")]
    pub binary: Vec<u8>,
    pub link_status: bool,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Default)]
pub struct ShaderCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl ShaderCache {
    /// In-memory cache that is never persisted
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache at `path`; a missing file starts an empty cache there
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "opened shader cache");
        Ok(Self {
            path: Some(path),
            entries,
            dirty: false,
        })
    }

    /// SHA-256 over the sources in attach order, each prefixed by its length
    pub fn key<'a, I>(sources: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut hasher = Sha256::new();
        for source in sources {
            hasher.update((source.len() as u64).to_le_bytes());
            hasher.update(source.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        if self.entries.get(&key) != Some(&entry) {
            self.entries.insert(key, entry);
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write back if anything changed and the cache has a backing file
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.as_ref().filter(|_| self.dirty) else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(path, json)?;
        info!(path = %path.display(), entries = self.entries.len(), "saved shader cache");
        self.dirty = false;
        Ok(())
    }
}
