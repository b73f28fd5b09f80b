//! JSON history dumps.
//!
//! A dump is a repository's changed-path log, one entry per revision:
//!
//! ```json
//! {
//!   "uuid": "6f1a3c2e-9b7d-4e55-a0c1-1d2e3f405162",
//!   "revisions": [
//!     {"revnum": 1, "changes": {"trunk": {"action": "A"}}},
//!     {"revnum": 2, "changes": {
//!       "branches/foo": {"action": "A", "copyfrom_path": "trunk", "copyfrom_rev": 1}
//!     }}
//!   ]
//! }
//! ```
//!
//! Revisions must be listed in increasing order; gaps are empty revisions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use svnid_core::history::MemoryHistory;
use svnid_core::model::{Action, ChangeRecord, RawChangeset};

/// Parsed history dump.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryDump {
    /// Repository instance id.
    pub uuid: String,
    /// Revisions, oldest first.
    #[serde(default)]
    pub revisions: Vec<DumpRevision>,
}

/// One revision of a dump.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpRevision {
    /// Revision number (≥ 1).
    pub revnum: u64,
    /// Changed paths, repository-global.
    #[serde(default)]
    pub changes: BTreeMap<String, DumpChange>,
}

/// One changed path of a dump revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpChange {
    /// `A`, `D`, `R` or `M`.
    pub action: Action,
    /// Copy source path.
    #[serde(default)]
    pub copyfrom_path: Option<String>,
    /// Copy source revision.
    #[serde(default)]
    pub copyfrom_rev: Option<u64>,
}

/// Errors reading a dump.
#[derive(Debug)]
pub enum DumpError {
    /// The file could not be read.
    Io {
        /// Dump path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The content is not a valid dump document.
    Json {
        /// Dump path, if read from a file.
        path: Option<PathBuf>,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// The dump is well formed JSON but describes an impossible history.
    Invalid {
        /// Offending revision.
        revnum: u64,
        /// What is wrong with it.
        detail: String,
    },
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "could not read history dump {}: {source}", path.display())
            }
            Self::Json {
                path: Some(path),
                source,
            } => write!(f, "{}: invalid history dump: {source}", path.display()),
            Self::Json { path: None, source } => write!(f, "invalid history dump: {source}"),
            Self::Invalid { revnum, detail } => write!(f, "history dump r{revnum}: {detail}"),
        }
    }
}

impl std::error::Error for DumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Invalid { .. } => None,
        }
    }
}

impl HistoryDump {
    /// Read and parse a dump file.
    ///
    /// # Errors
    /// Returns [`DumpError`] on I/O or JSON errors.
    pub fn load(path: &Path) -> Result<Self, DumpError> {
        let content = std::fs::read_to_string(path).map_err(|source| DumpError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            DumpError::Json { source, .. } => DumpError::Json {
                path: Some(path.to_owned()),
                source,
            },
            other => other,
        })
    }

    /// Parse a dump document.
    ///
    /// # Errors
    /// Returns [`DumpError::Json`] if `json` is not a dump document.
    pub fn parse(json: &str) -> Result<Self, DumpError> {
        serde_json::from_str(json).map_err(|source| DumpError::Json { path: None, source })
    }

    /// Build the in-memory history described by the dump.
    ///
    /// Paths are normalized (no leading or trailing `/`).
    ///
    /// # Errors
    /// Returns [`DumpError::Invalid`] for revision 0, revisions out of
    /// order, half-specified copy sources, or copies from a revision that
    /// is not older than the copy.
    pub fn to_history(&self) -> Result<MemoryHistory, DumpError> {
        let mut history = MemoryHistory::new();
        let mut last = 0;
        for rev in &self.revisions {
            let invalid = |detail: String| DumpError::Invalid {
                revnum: rev.revnum,
                detail,
            };
            if rev.revnum <= last {
                return Err(invalid(format!(
                    "revision numbers must increase (previous was r{last})"
                )));
            }
            last = rev.revnum;

            let mut changes = RawChangeset::new();
            for (path, change) in &rev.changes {
                let record = match (&change.copyfrom_path, change.copyfrom_rev) {
                    (None, None) => ChangeRecord::new(change.action),
                    (Some(src), Some(src_rev)) if src_rev < rev.revnum => {
                        ChangeRecord::copied(change.action, normalize(src), src_rev)
                    }
                    (Some(_), Some(src_rev)) => {
                        return Err(invalid(format!(
                            "'{path}' copied from r{src_rev}, which is not an earlier revision"
                        )));
                    }
                    _ => {
                        return Err(invalid(format!(
                            "'{path}' needs both copyfrom_path and copyfrom_rev"
                        )));
                    }
                };
                if record.copy_from.is_some() && !record.action.creates() {
                    return Err(invalid(format!(
                        "'{path}' has a copy source but action {}",
                        record.action
                    )));
                }
                changes.insert(normalize(path), record);
            }
            history.insert(rev.revnum, changes);
        }
        tracing::debug!(
            uuid = %self.uuid,
            revisions = self.revisions.len(),
            latest = history.latest_revnum(),
            "loaded history dump"
        );
        Ok(history)
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;
    use svnid_core::history::HistoryWalker;

    const DUMP: &str = r#"{
        "uuid": "u-1",
        "revisions": [
            {"revnum": 1, "changes": {"/trunk": {"action": "A"}}},
            {"revnum": 2, "changes": {"trunk/a": {"action": "A", "copyfrom_path": null, "copyfrom_rev": null}}},
            {"revnum": 4, "changes": {"branches/x/": {"action": "A", "copyfrom_path": "/trunk", "copyfrom_rev": 2}}}
        ]
    }"#;

    #[test]
    fn parses_and_builds_history() {
        let dump = HistoryDump::parse(DUMP).unwrap();
        assert_eq!(dump.uuid, "u-1");
        let history = dump.to_history().unwrap();
        assert_eq!(history.latest_revnum(), 4);
        assert!(history.changes(3).is_none());

        let copy = &history.changes(4).unwrap()["branches/x"];
        let src = copy.copy_from.as_ref().unwrap();
        assert_eq!((src.path.as_str(), src.revnum), ("trunk", 2));
        assert!(history.changes(1).unwrap().contains_key("trunk"));
        assert_eq!(
            history.find_children("branches/x", 4).unwrap(),
            vec!["branches/x/a"]
        );
    }

    #[test]
    fn rejects_out_of_order_revisions() {
        let dump = HistoryDump::parse(
            r#"{"uuid": "u", "revisions": [{"revnum": 2}, {"revnum": 2}]}"#,
        )
        .unwrap();
        assert!(matches!(
            dump.to_history(),
            Err(DumpError::Invalid { revnum: 2, .. })
        ));
        let zero = HistoryDump::parse(r#"{"uuid": "u", "revisions": [{"revnum": 0}]}"#).unwrap();
        assert!(zero.to_history().is_err());
    }

    #[test]
    fn rejects_half_copy_source() {
        let dump = HistoryDump::parse(
            r#"{"uuid": "u", "revisions": [{"revnum": 1, "changes": {"a": {"action": "A", "copyfrom_path": "b"}}}]}"#,
        )
        .unwrap();
        let err = dump.to_history().unwrap_err();
        assert!(err.to_string().contains("copyfrom_rev"));
    }

    #[test]
    fn rejects_forward_copy_and_copied_modify() {
        let forward = HistoryDump::parse(
            r#"{"uuid": "u", "revisions": [{"revnum": 1, "changes": {"a": {"action": "A", "copyfrom_path": "b", "copyfrom_rev": 1}}}]}"#,
        )
        .unwrap();
        assert!(forward.to_history().is_err());

        let modify = HistoryDump::parse(
            r#"{"uuid": "u", "revisions": [{"revnum": 1}, {"revnum": 2, "changes": {"a": {"action": "M", "copyfrom_path": "b", "copyfrom_rev": 1}}}]}"#,
        )
        .unwrap();
        assert!(modify.to_history().is_err());
    }

    #[test]
    fn rejects_unknown_action_and_fields() {
        assert!(HistoryDump::parse(
            r#"{"uuid": "u", "revisions": [{"revnum": 1, "changes": {"a": {"action": "X"}}}]}"#
        )
        .is_err());
        assert!(HistoryDump::parse(r#"{"uuid": "u", "extra": 1}"#).is_err());
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{").unwrap();
        let err = HistoryDump::load(&path).unwrap_err();
        assert!(err.to_string().contains("history.json"));

        let missing = HistoryDump::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, DumpError::Io { .. }));
    }
}
