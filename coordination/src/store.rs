//! Versioned record store for coordination aggregates
//!
//! Each aggregate is persisted as one JSON record under a [`RecordKey`].
//! Every record carries a version that increases by one per write; writers
//! state the version they read and a mismatch fails with
//! [`StoreError::VersionConflict`] instead of silently losing an update.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use fs2::FileExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Error type for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Version conflict on {key}: expected {expected}, found version {found}")]
    VersionConflict {
        key: String,
        expected: Expected,
        found: u64,
    },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Invalid record key: {0}")]
    InvalidKey(String),
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a store
pub type SharedStateStore = Arc<dyn StateStore>;

/// Logical partition of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Orchestration,
    /// Session id → id of its active orchestration
    ActivePointer,
    Debate,
    EscalationThread,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Orchestration,
        RecordKind::ActivePointer,
        RecordKind::Debate,
        RecordKind::EscalationThread,
    ];

    /// Directory / partition name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orchestration => "orchestrations",
            Self::ActivePointer => "active",
            Self::Debate => "debates",
            Self::EscalationThread => "escalations",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: String,
}

impl RecordKey {
    pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn orchestration(id: impl Into<String>) -> Self {
        Self::new(RecordKind::Orchestration, id)
    }

    pub fn active(session_id: impl Into<String>) -> Self {
        Self::new(RecordKind::ActivePointer, session_id)
    }

    pub fn debate(id: impl Into<String>) -> Self {
        Self::new(RecordKind::Debate, id)
    }

    pub fn thread(id: impl Into<String>) -> Self {
        Self::new(RecordKind::EscalationThread, id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Version precondition for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Record must not exist yet
    Absent,
    /// Record must be at exactly this version
    Version(u64),
    /// Unconditional write
    Any,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Version(v) => write!(f, "version {}", v),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Persisted envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub version: u64,
    pub record: serde_json::Value,
}

/// Backing storage for aggregates.
///
/// Implementations must perform the version check and the write atomically
/// with respect to every other writer of the same backing storage, including
/// other handles and other processes.
pub trait StateStore: Send + Sync {
    fn read(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>>;

    /// Write `record` if the stored version matches `expected`; returns the new version.
    fn write(
        &self,
        key: &RecordKey,
        record: serde_json::Value,
        expected: Expected,
    ) -> StoreResult<u64>;

    /// Returns whether a record was removed.
    fn remove(&self, key: &RecordKey) -> StoreResult<bool>;

    /// Ids stored under `kind`, sorted.
    fn list(&self, kind: RecordKind) -> StoreResult<Vec<String>>;
}

/// Decoded record plus the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Read and decode a record.
pub fn load<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &RecordKey,
) -> StoreResult<Option<Versioned<T>>> {
    match store.read(key)? {
        Some(stored) => {
            let value = serde_json::from_value(stored.record)
                .map_err(|e| StoreError::Deserialization(format!("{}: {}", key, e)))?;
            Ok(Some(Versioned {
                version: stored.version,
                value,
            }))
        }
        None => Ok(None),
    }
}

/// Encode and write a record.
pub fn save<T: Serialize>(
    store: &dyn StateStore,
    key: &RecordKey,
    value: &T,
    expected: Expected,
) -> StoreResult<u64> {
    let record =
        serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.write(key, record, expected)
}

/// Check `expected` against the current version; returns the next version.
fn next_version(key: &RecordKey, current: Option<u64>, expected: Expected) -> StoreResult<u64> {
    let found = current.unwrap_or(0);
    let ok = match expected {
        Expected::Absent => current.is_none(),
        Expected::Version(v) => current == Some(v),
        Expected::Any => true,
    };
    if !ok {
        return Err(StoreError::VersionConflict {
            key: key.to_string(),
            expected,
            found,
        });
    }
    Ok(found + 1)
}

// =========================================================================
// In-memory store
// =========================================================================

/// Process-local store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }
}

impl StateStore for MemoryStore {
    fn read(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    fn write(
        &self,
        key: &RecordKey,
        record: serde_json::Value,
        expected: Expected,
    ) -> StoreResult<u64> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        let version = next_version(key, records.get(key).map(|r| r.version), expected)?;
        records.insert(key.clone(), StoredRecord { version, record });
        Ok(version)
    }

    fn remove(&self, key: &RecordKey) -> StoreResult<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.remove(key).is_some())
    }

    fn list(&self, kind: RecordKind) -> StoreResult<Vec<String>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut ids: Vec<String> = records
            .keys()
            .filter(|k| k.kind == kind)
            .map(|k| k.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// =========================================================================
// File store
// =========================================================================

/// Per-kind lock file, held exclusively across version check and rename.
const LOCK_FILE: &str = ".lock";

/// One pretty-printed JSON file per record: `<root>/<kind>/<id>.json`.
///
/// Writers take an OS-level exclusive lock on `<root>/<kind>/.lock`, so
/// separate handles and separate processes on the same root serialize.
/// Each write goes through its own temp file and a rename; readers never
/// observe a half-written record and take no lock.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &RecordKey) -> StoreResult<PathBuf> {
        let valid = !key.id.is_empty()
            && !key.id.starts_with('.')
            && key
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self
            .root
            .join(key.kind.as_str())
            .join(format!("{}.json", key.id)))
    }

    /// Exclusive lock on `kind`; released when the returned file is dropped.
    fn lock_kind(&self, kind: RecordKind) -> StoreResult<File> {
        let dir = self.root.join(kind.as_str());
        fs::create_dir_all(&dir)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn read_path(path: &Path) -> StoreResult<Option<StoredRecord>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored = serde_json::from_str(&text)
            .map_err(|e| StoreError::Deserialization(format!("{}: {}", path.display(), e)))?;
        Ok(Some(stored))
    }
}

impl StateStore for FileStore {
    fn read(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        let path = self.path_for(key)?;
        Self::read_path(&path)
    }

    fn write(
        &self,
        key: &RecordKey,
        record: serde_json::Value,
        expected: Expected,
    ) -> StoreResult<u64> {
        let path = self.path_for(key)?;
        let _lock = self.lock_kind(key.kind)?;

        let current = Self::read_path(&path)?.map(|r| r.version);
        let version = next_version(key, current, expected)?;

        let text = serde_json::to_vec_pretty(&StoredRecord { version, record })
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let dir = self.root.join(key.kind.as_str());
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&text)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(version)
    }

    fn remove(&self, key: &RecordKey) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        let _lock = self.lock_kind(key.kind)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, kind: RecordKind) -> StoreResult<Vec<String>> {
        let dir = self.root.join(kind.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
