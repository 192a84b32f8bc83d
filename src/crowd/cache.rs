// src/crowd/cache.rs
//! On-disk persistence for the sampled point set.
//!
//! One JSON array of `{x, y, z}` lives under a schema-versioned key inside
//! the cache directory. Loading prunes keys left behind by older schema
//! versions. Every failure mode (missing key, corrupt JSON, wrong length,
//! storage errors) degrades to a cache miss; the caller re-samples.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bevy::prelude::*;
use thiserror::Error;

use super::core::{SurfacePoint, SAMPLE_SCHEMA_VERSION};

/// Key prefix shared by all schema versions; pruning matches on this.
pub const STORE_PREFIX: &str = "spectator-points-";

#[derive(Debug, Error)]
enum StoreError {
    #[error("no cache entry")]
    Missing,
    #[error("storage I/O: {0}")]
    Io(#[from] io::Error),
    #[error("malformed cache JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache holds {found} points, expected {expected}")]
    WrongLength { found: usize, expected: usize },
}

/// Filesystem-backed point store. Cheap to clone around systems.
#[derive(Clone, Debug)]
pub struct SampleStore {
    dir: PathBuf,
    expected: usize,
}

impl SampleStore {
    pub fn new(dir: impl Into<PathBuf>, expected: usize) -> Self {
        Self { dir: dir.into(), expected }
    }

    /// Key for the current schema version.
    fn key_path(&self) -> PathBuf {
        self.dir.join(format!("{STORE_PREFIX}{SAMPLE_SCHEMA_VERSION}.json"))
    }

    /// Load the cached point set, or `None` on any kind of miss.
    /// Also deletes sibling keys carrying other schema versions.
    pub fn load(&self) -> Option<Vec<SurfacePoint>> {
        self.prune_stale_keys();

        match self.try_load() {
            Ok(points) => {
                info!("Sample cache: loaded {} points ({})", points.len(), SAMPLE_SCHEMA_VERSION);
                Some(points)
            }
            Err(StoreError::Missing) => {
                debug!("Sample cache: no entry for schema {SAMPLE_SCHEMA_VERSION}");
                None
            }
            Err(err) => {
                warn!("Sample cache: treating unreadable entry as a miss: {err}");
                None
            }
        }
    }

    fn try_load(&self) -> Result<Vec<SurfacePoint>, StoreError> {
        let bytes = match fs::read(self.key_path()) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::Missing),
            Err(e) => return Err(e.into()),
        };
        let points: Vec<SurfacePoint> = serde_json::from_slice(&bytes)?;
        if points.len() != self.expected {
            return Err(StoreError::WrongLength { found: points.len(), expected: self.expected });
        }
        Ok(points)
    }

    /// Persist the point set. Best-effort: a failed write leaves the caller
    /// with an unpersisted in-memory result and a diagnostic, nothing more.
    pub fn save(&self, points: &[SurfacePoint]) {
        match self.try_save(points) {
            Ok(()) => info!("Sample cache: saved {} points ({})", points.len(), SAMPLE_SCHEMA_VERSION),
            Err(err) => warn!("Sample cache: save failed, continuing unpersisted: {err}"),
        }
    }

    fn try_save(&self, points: &[SurfacePoint]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec(points)?;
        fs::write(self.key_path(), json)?;
        Ok(())
    }

    /// Delete entries written under other schema versions so storage never
    /// accumulates stale formats.
    fn prune_stale_keys(&self) {
        let Ok(entries) = fs::read_dir(&self.dir) else { return };
        let current = self.key_path();

        for entry in entries.flatten() {
            let path = entry.path();
            if path == current {
                continue;
            }
            if is_store_key(&path) {
                match fs::remove_file(&path) {
                    Ok(()) => debug!("Sample cache: pruned stale key {:?}", path.file_name()),
                    Err(err) => warn!("Sample cache: could not prune {:?}: {err}", path.file_name()),
                }
            }
        }
    }
}

fn is_store_key(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(STORE_PREFIX) && n.ends_with(".json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<SurfacePoint> {
        (0..n)
            .map(|i| SurfacePoint::new(i as f32, 0.5, -(i as f32)))
            .collect()
    }

    #[test]
    fn round_trip_preserves_points() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path(), 64);

        let original = points(64);
        store.save(&original);
        assert_eq!(store.load().unwrap(), original);
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path(), 64);
        assert!(store.load().is_none());
    }

    #[test]
    fn wrong_length_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SampleStore::new(dir.path(), 10);
        writer.save(&points(10));

        let reader = SampleStore::new(dir.path(), 64);
        assert!(reader.load().is_none());
    }

    #[test]
    fn corrupt_json_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path(), 8);
        fs::write(store.key_path(), b"[{\"x\": not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn load_prunes_stale_schema_keys() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(format!("{STORE_PREFIX}v1.json"));
        fs::write(&stale, b"[]").unwrap();

        let store = SampleStore::new(dir.path(), 8);
        store.save(&points(8));
        assert!(store.load().is_some());
        assert!(!stale.exists(), "stale schema key should be deleted on load");
    }

    #[test]
    fn unrelated_files_survive_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("notes.json");
        fs::write(&other, b"{}").unwrap();

        SampleStore::new(dir.path(), 8).load();
        assert!(other.exists());
    }

    #[test]
    fn save_failure_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the store expects a directory.
        let blocked = dir.path().join("occupied");
        fs::write(&blocked, b"").unwrap();

        let store = SampleStore::new(&blocked, 4);
        store.save(&points(4));
        assert!(store.load().is_none());
    }
}
