//! Content-addressed result cache.
//!
//! A run's inputs — framework names, data file contents, engine version —
//! hash to a SHA-256 key; the cached value is the bincode-serialized sorted
//! export of the final store. Entries are safe to delete at any time, and a
//! corrupt entry is a miss with a warning, never a failure.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::export::ExportedTriple;

/// Everything that determines a run's output.
#[derive(Debug)]
pub struct CacheInputs<'a> {
    /// Framework names (sorted internally; load order does not affect the
    /// fixpoint).
    pub frameworks: &'a [String],
    /// Data files as (name, contents) pairs, in load order.
    pub data: &'a [(String, String)],
}

impl CacheInputs<'_> {
    /// The content hash of these inputs, as lowercase hex.
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update([0]);
        let mut frameworks: Vec<&String> = self.frameworks.iter().collect();
        frameworks.sort();
        for fw in frameworks {
            hasher.update(fw.as_bytes());
            hasher.update([0]);
        }
        for (name, contents) in self.data {
            hasher.update(name.as_bytes());
            hasher.update([0]);
            hasher.update(contents.as_bytes());
            hasher.update([0]);
        }
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A directory of `<key>.bin` result blobs.
#[derive(Debug)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }

    /// Load a cached export. Missing or unreadable entries are misses.
    pub fn load(&self, key: &str) -> Option<Vec<ExportedTriple>> {
        let path = self.entry_path(key);
        let bytes = fs::read(&path).ok()?;
        match bincode::deserialize(&bytes) {
            Ok(export) => {
                tracing::debug!(key, "result cache hit");
                Some(export)
            }
            Err(err) => {
                tracing::warn!(key, %err, "discarding corrupt cache entry");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Store an export under its key.
    pub fn store(&self, key: &str, export: &[ExportedTriple]) -> Result<(), CacheError> {
        let bytes = bincode::serialize(export).map_err(|e| CacheError::Serialize {
            message: e.to_string(),
        })?;
        let path = self.entry_path(key);
        fs::write(&path, bytes).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Remove one entry; absent entries are fine.
    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.entry_path(key));
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_export() -> Vec<ExportedTriple> {
        vec![ExportedTriple {
            subject: "PatientInfo".into(),
            predicate: "pj:hasLabel".into(),
            object: "hipaa:PHI".into(),
            scope: Some("Research".into()),
        }]
    }

    #[test]
    fn key_is_stable_and_input_sensitive() {
        let frameworks = vec!["hipaa".to_string(), "gdpr".to_string()];
        let data = vec![("catalog.pj".to_string(), "@container T table\n".to_string())];
        let a = CacheInputs {
            frameworks: &frameworks,
            data: &data,
        }
        .key();
        let b = CacheInputs {
            frameworks: &frameworks,
            data: &data,
        }
        .key();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other_data = vec![("catalog.pj".to_string(), "@container U table\n".to_string())];
        let c = CacheInputs {
            frameworks: &frameworks,
            data: &other_data,
        }
        .key();
        assert_ne!(a, c);
    }

    #[test]
    fn framework_order_does_not_change_key() {
        let data = vec![];
        let ab = vec!["a".to_string(), "b".to_string()];
        let ba = vec!["b".to_string(), "a".to_string()];
        let k1 = CacheInputs {
            frameworks: &ab,
            data: &data,
        }
        .key();
        let k2 = CacheInputs {
            frameworks: &ba,
            data: &data,
        }
        .key();
        assert_eq!(k1, k2);
    }

    #[test]
    fn store_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).unwrap();
        let export = sample_export();
        cache.store("abc123", &export).unwrap();
        assert_eq!(cache.load("abc123"), Some(export));
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).unwrap();
        assert!(cache.load("nope").is_none());
    }

    #[test]
    fn corrupt_entry_is_discarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.bin"), b"not bincode").unwrap();
        assert!(cache.load("bad").is_none());
        // The corrupt file was cleaned up.
        assert!(!dir.path().join("bad.bin").exists());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).unwrap();
        cache.store("k", &sample_export()).unwrap();
        cache.remove("k");
        cache.remove("k");
        assert!(cache.load("k").is_none());
    }
}
