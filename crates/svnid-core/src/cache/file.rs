//! On-disk snapshot store: one JSON document per cached revision.
//!
//! ```text
//! <dir>/
//!   3f9a…e1.json   ← sha256(encoded revision id)
//!   b04c…77.json
//! ```
//!
//! Each document holds the snapshot's revision id, its parents, and one
//! [`CacheRow`] per live path. Writes go to a temporary file in the same
//! directory and are renamed into place, so readers never observe a
//! partial snapshot and concurrent writers of the same revision simply
//! replace each other.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::{CacheError, CacheRow, IdMapCache, from_rows, to_rows};
use crate::model::PathState;
use crate::revid::RevisionId;

#[derive(Serialize, Deserialize)]
struct SnapshotDocument {
    revision: String,
    parents: Vec<String>,
    rows: Vec<CacheRow>,
}

/// Directory-backed [`IdMapCache`].
#[derive(Clone, Debug)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Use `dir` as the store. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the snapshot of `revision`.
    #[must_use]
    pub fn snapshot_path(&self, revision: &RevisionId) -> PathBuf {
        let digest = Sha256::digest(revision.encode().as_bytes());
        self.dir.join(format!("{digest:x}.json"))
    }

    /// Parents recorded for `revision`'s snapshot; `None` if not cached.
    ///
    /// # Errors
    /// Returns [`CacheError`] on I/O, JSON, or revision-id decode failure.
    pub fn parents(&self, revision: &RevisionId) -> Result<Option<Vec<RevisionId>>, CacheError> {
        let Some(doc) = self.read_document(revision)? else {
            return Ok(None);
        };
        let parents = doc
            .parents
            .iter()
            .map(|p| RevisionId::decode(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(parents))
    }

    fn read_document(&self, revision: &RevisionId) -> Result<Option<SnapshotDocument>, CacheError> {
        let content = match fs::read_to_string(self.snapshot_path(revision)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io(e)),
        };
        let doc: SnapshotDocument = serde_json::from_str(&content)?;
        let expected = revision.encode();
        if doc.revision != expected {
            return Err(CacheError::Mismatch {
                expected,
                found: doc.revision,
            });
        }
        Ok(Some(doc))
    }
}

impl IdMapCache for FileCache {
    fn save(
        &self,
        revision: &RevisionId,
        parents: &[RevisionId],
        state: &PathState,
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let doc = SnapshotDocument {
            revision: revision.encode(),
            parents: parents.iter().map(RevisionId::encode).collect(),
            rows: to_rows(revision, state),
        };
        let json = serde_json::to_vec(&doc)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.snapshot_path(revision))
            .map_err(|e| CacheError::Io(e.error))?;

        tracing::debug!(
            revision = %revision,
            paths = state.len(),
            "saved id map snapshot"
        );
        Ok(())
    }

    fn load(&self, revision: &RevisionId) -> Result<PathState, CacheError> {
        match self.read_document(revision)? {
            Some(doc) => Ok(from_rows(doc.rows)?),
            None => Ok(PathState::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
