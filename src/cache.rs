//! Change cache for incremental builds.
//!
//! Every conversion forks MuseScore and a PDF tool, which takes seconds per
//! song. This module lets the pipeline skip a chain when its notation source
//! has not changed since the last run.
//!
//! # Design
//!
//! The cache is a flat map from the **absolute path** of a source file to the
//! SHA-256 of its contents. Content-based rather than mtime-based so it
//! survives `git checkout`, which resets modification times.
//!
//! [`ChangeCache::is_modified`] is the only query:
//!
//! | Stored record | File on disk | Result | Side effect |
//! |---|---|---|---|
//! | none | present | changed | record inserted |
//! | different hash | present | changed | record updated |
//! | same hash | present | unchanged | none |
//! | any | missing | unchanged | none |
//!
//! ## Known limitation
//!
//! A new hash is persisted as soon as the difference is detected, before the
//! conversion that depends on it has run. If the process dies in between, the
//! next run sees an unchanged source and skips the chain. The pipeline empties
//! a chain's working folder before converting, so an interrupted chain is
//! left without images and the "no images yet" rule regenerates it anyway in
//! the common case.
//!
//! ## Concurrency
//!
//! Songs are converted in parallel. All reads and writes go through one
//! mutex, so the lookup, the update and the write to disk happen as one step
//! per call and no update is lost.
//!
//! ## Storage
//!
//! A pretty-printed JSON file in the base directory (`filehashes.json` by
//! default). An unreadable or corrupt store is treated as empty: every source
//! counts as changed once, and the store is rewritten on the next update.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Version of the store format. Bump this to invalidate existing stores when
/// the format or key computation changes.
const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Change cache lock poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for CacheError {
    fn from(_: PoisonError<T>) -> Self {
        CacheError::Poisoned
    }
}

/// On-disk layout of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HashStore {
    pub version: u32,
    /// Absolute source path → hex SHA-256 of its contents.
    pub hashes: BTreeMap<String, String>,
}

impl HashStore {
    fn empty() -> Self {
        Self {
            version: STORE_VERSION,
            hashes: BTreeMap::new(),
        }
    }
}

/// Persistent, thread-safe source hash store.
#[derive(Debug)]
pub struct ChangeCache {
    path: PathBuf,
    store: Mutex<HashStore>,
}

impl ChangeCache {
    /// Open the store at `path`. Returns an empty cache if the file doesn't
    /// exist or can't be parsed (version mismatch, corruption).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = load_store(&path);
        Self {
            path,
            store: Mutex::new(store),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Report whether `source` changed since it was last seen, recording the
    /// new hash if it did.
    ///
    /// A source that does not exist is reported unchanged: there is nothing
    /// to regenerate from.
    pub fn is_modified(&self, source: &Path) -> Result<bool, CacheError> {
        if !source.is_file() {
            return Ok(false);
        }
        let key = cache_key(source)?;
        let hash = hash_file(source).map_err(|e| CacheError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        let mut store = self.lock()?;
        if store.hashes.get(&key) == Some(&hash) {
            debug!(source = %key, "source unchanged");
            return Ok(false);
        }

        let first_sight = store.hashes.insert(key.clone(), hash).is_none();
        debug!(source = %key, first_sight, "source changed");
        self.persist(&store)?;
        Ok(true)
    }

    /// Stored hash for `source`, if any.
    pub fn stored_hash(&self, source: &Path) -> Result<Option<String>, CacheError> {
        let key = cache_key(source)?;
        Ok(self.lock()?.hashes.get(&key).cloned())
    }

    /// Number of records.
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.lock()?.hashes.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Delete every record and persist the empty store.
    pub fn flush(&self) -> Result<(), CacheError> {
        let mut store = self.lock()?;
        store.hashes.clear();
        self.persist(&store)
    }

    /// Delete the backing file and every in-memory record.
    pub fn purge(&self) -> Result<(), CacheError> {
        let mut store = self.lock()?;
        store.hashes.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashStore>, CacheError> {
        Ok(self.store.lock()?)
    }

    fn persist(&self, store: &HashStore) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(store)?;
        fs::write(&self.path, json).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

fn load_store(path: &Path) -> HashStore {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return HashStore::empty(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "change cache unreadable, starting empty");
            return HashStore::empty();
        }
    };
    match serde_json::from_str::<HashStore>(&content) {
        Ok(store) if store.version == STORE_VERSION => store,
        Ok(store) => {
            debug!(found = store.version, expected = STORE_VERSION, "change cache version mismatch");
            HashStore::empty()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "change cache corrupt, starting empty");
            HashStore::empty()
        }
    }
}

/// Absolute, symlink-resolved path of a source, used as the record key.
fn cache_key(source: &Path) -> Result<String, CacheError> {
    let absolute = fs::canonicalize(source).map_err(|e| CacheError::Io {
        path: source.to_path_buf(),
        source: e,
    })?;
    Ok(absolute.to_string_lossy().to_string())
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}
