//! Identifier-map cache: full path-state snapshots keyed by revision id.
//!
//! The projection engine stores the state it computed for a revision so a
//! later projection can start from it instead of replaying from the start
//! of history. Snapshots are pure functions of the history up to their
//! revision, which gives the cache its contract:
//!
//! - `save` may be called any number of times for the same revision, from
//!   any number of threads; the last write wins and every write is equal.
//! - `load` of an unknown revision returns an empty [`PathState`].
//! - Nothing about the projection result may depend on what is cached.
//!
//! # Row layout
//!
//! Persistent implementations store one [`CacheRow`] per live path:
//! `(path, object_id, last_touched, revision)`, looked up by `revision`.

mod file;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::model::{ObjectId, PathEntry, PathState};
use crate::revid::{ParseError, RevisionId};

pub use file::FileCache;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistent store of path-state snapshots.
pub trait IdMapCache: Send + Sync {
    /// Store the snapshot of `revision`, computed on top of `parents`.
    ///
    /// # Errors
    /// Returns [`CacheError`] if the snapshot could not be written.
    fn save(
        &self,
        revision: &RevisionId,
        parents: &[RevisionId],
        state: &PathState,
    ) -> Result<(), CacheError>;

    /// Load the snapshot of `revision`; empty if none is stored.
    ///
    /// # Errors
    /// Returns [`CacheError`] if the store could not be read, or
    /// [`CacheError::Parse`] if a stored revision id is malformed.
    fn load(&self, revision: &RevisionId) -> Result<PathState, CacheError>;
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One stored path of one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRow {
    /// Branch-local path.
    pub path: String,
    /// Object id at the path.
    pub object_id: String,
    /// Encoded revision id that last touched the path.
    pub last_touched: String,
    /// Encoded revision id of the snapshot the row belongs to.
    pub revision: String,
}

/// Flatten a snapshot into rows.
#[must_use]
pub fn to_rows(revision: &RevisionId, state: &PathState) -> Vec<CacheRow> {
    let owner = revision.encode();
    state
        .iter()
        .map(|(path, entry)| CacheRow {
            path: path.to_owned(),
            object_id: entry.object_id.as_str().to_owned(),
            last_touched: entry.last_touched.encode(),
            revision: owner.clone(),
        })
        .collect()
}

/// Rebuild a snapshot from rows.
///
/// # Errors
/// Returns [`ParseError`] if a row's `last_touched` does not decode.
pub fn from_rows(rows: Vec<CacheRow>) -> Result<PathState, ParseError> {
    rows.into_iter()
        .map(|row| {
            let last_touched = RevisionId::decode(&row.last_touched)?;
            Ok((
                row.path,
                PathEntry::new(ObjectId::new(row.object_id), last_touched),
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Errors produced by [`IdMapCache`] implementations.
#[derive(Debug)]
pub enum CacheError {
    /// I/O error reading or writing the store.
    Io(io::Error),
    /// A stored snapshot is not valid JSON.
    Json(serde_json::Error),
    /// A stored revision id does not decode.
    Parse(ParseError),
    /// A stored snapshot belongs to a different revision than its key.
    Mismatch {
        /// Revision that was requested.
        expected: String,
        /// Revision the stored snapshot claims.
        found: String,
    },
    /// A writer panicked while holding the in-memory store.
    Poisoned,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "id map cache I/O error: {e}"),
            Self::Json(e) => write!(f, "id map cache JSON error: {e}"),
            Self::Parse(e) => write!(f, "id map cache holds a malformed revision id: {e}"),
            Self::Mismatch { expected, found } => write!(
                f,
                "id map cache entry for {expected} holds the snapshot of {found}"
            ),
            Self::Poisoned => write!(f, "id map cache lock poisoned"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<ParseError> for CacheError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Snapshot {
    parents: Vec<RevisionId>,
    state: PathState,
}

/// Process-local cache, shared between threads.
#[derive(Debug, Default)]
pub struct MemoryCache {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.read().map_or(0, |s| s.len())
    }

    /// Return `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parents recorded for `revision`'s snapshot.
    #[must_use]
    pub fn parents(&self, revision: &RevisionId) -> Option<Vec<RevisionId>> {
        let snapshots = self.snapshots.read().ok()?;
        snapshots.get(&revision.encode()).map(|s| s.parents.clone())
    }
}

impl IdMapCache for MemoryCache {
    fn save(
        &self,
        revision: &RevisionId,
        parents: &[RevisionId],
        state: &PathState,
    ) -> Result<(), CacheError> {
        let mut snapshots = self.snapshots.write().map_err(|_| CacheError::Poisoned)?;
        snapshots.insert(
            revision.encode(),
            Snapshot {
                parents: parents.to_vec(),
                state: state.clone(),
            },
        );
        Ok(())
    }

    fn load(&self, revision: &RevisionId) -> Result<PathState, CacheError> {
        let snapshots = self.snapshots.read().map_err(|_| CacheError::Poisoned)?;
        Ok(snapshots
            .get(&revision.encode())
            .map(|s| s.state.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
