//! Path-state model: object identifiers, path entries, and changesets.
//!
//! A [`PathState`] maps every live path of one branch (slash-separated, no
//! leading slash, `""` for the branch root) to a [`PathEntry`]: the stable
//! [`ObjectId`] of the object at that path and the revision that last
//! touched it.
//!
//! # Changes
//!
//! | Action | Effect on the path |
//! |--------|--------------------|
//! | `A` | new object, new id (optionally copied from a source subtree) |
//! | `D` | object and its subtree removed |
//! | `R` | `D` followed by `A` in the same revision |
//! | `M` | id kept, last-touched advanced |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::revid::{MappingVersion, RevisionId, escape_path};

// ---------------------------------------------------------------------------
// ObjectId
// ---------------------------------------------------------------------------

/// Stable identifier of a tracked file or directory.
///
/// Assigned when the object is created and never reassigned while it lives.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap an existing identifier (e.g. a rename override or a cached row).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier of the object created at `path` in `revision`.
    ///
    /// Deterministic, so replaying the same history always yields the same
    /// ids, and distinct for every (revision, path) pair.
    #[must_use]
    pub fn derive(revision: &RevisionId, path: &str) -> Self {
        Self(format!(
            "svn-v{}:{}@{}-{}-{}",
            MappingVersion::CURRENT.number(),
            revision.revnum(),
            revision.uuid(),
            escape_path(revision.branch()),
            escape_path(path)
        ))
    }

    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// PathEntry / PathState
// ---------------------------------------------------------------------------

/// Identity and last-touched revision of one live path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Stable identifier of the object at this path.
    pub object_id: ObjectId,
    /// Most recent revision that created or modified the path, or touched it
    /// through a change below it.
    pub last_touched: RevisionId,
}

impl PathEntry {
    /// Build an entry.
    #[must_use]
    pub const fn new(object_id: ObjectId, last_touched: RevisionId) -> Self {
        Self {
            object_id,
            last_touched,
        }
    }
}

/// Every live path of a branch at one revision.
///
/// Invariants the projection engine maintains:
/// - if `a/b` is present, `a` is present (and so is `""`);
/// - the root `""` is present once the branch exists;
/// - no entry was touched after the revision the state is observed at.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathState {
    entries: BTreeMap<String, PathEntry>,
}

impl PathState {
    /// Create an empty state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Look up one path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&PathEntry> {
        self.entries.get(path)
    }

    pub(crate) fn get_mut(&mut self, path: &str) -> Option<&mut PathEntry> {
        self.entries.get_mut(path)
    }

    /// Object id at `path`, if live.
    #[must_use]
    pub fn object_id(&self, path: &str) -> Option<&ObjectId> {
        self.entries.get(path).map(|e| &e.object_id)
    }

    /// Return `true` if `path` is live.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace the entry at `path`.
    pub fn insert(&mut self, path: impl Into<String>, entry: PathEntry) -> Option<PathEntry> {
        self.entries.insert(path.into(), entry)
    }

    /// Remove `path` and everything below it. Returns the number of entries
    /// removed.
    pub fn remove_subtree(&mut self, path: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|p, _| p != path && !is_descendant(p, path));
        before - self.entries.len()
    }

    /// Number of live paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` if no path is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathEntry)> {
        self.entries.iter().map(|(p, e)| (p.as_str(), e))
    }

    /// Describe every broken invariant for a state observed at
    /// `observed_revnum`. Empty when the state is well formed.
    ///
    /// Checked: every non-root path has its parent; no entry is newer than
    /// the observation; a parent was touched no earlier than any child.
    #[must_use]
    pub fn invariant_violations(&self, observed_revnum: u64) -> Vec<String> {
        let mut problems = Vec::new();
        for (path, entry) in &self.entries {
            let touched = entry.last_touched.revnum();
            if touched > observed_revnum {
                problems.push(format!(
                    "'{path}' touched in r{touched}, after observed r{observed_revnum}"
                ));
            }
            let Some(parent) = parent_path(path) else {
                continue;
            };
            match self.entries.get(parent) {
                None => problems.push(format!("'{path}' has no parent entry '{parent}'")),
                Some(p) if p.last_touched.revnum() < touched => problems.push(format!(
                    "parent '{parent}' (r{}) touched before child '{path}' (r{touched})",
                    p.last_touched.revnum()
                )),
                Some(_) => {}
            }
        }
        problems
    }
}

impl FromIterator<(String, PathEntry)> for PathState {
    fn from_iter<I: IntoIterator<Item = (String, PathEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PathState {
    type Item = (String, PathEntry);
    type IntoIter = std::collections::btree_map::IntoIter<String, PathEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Changesets
// ---------------------------------------------------------------------------

/// What a revision did to one path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Path created.
    #[serde(rename = "A")]
    Add,
    /// Path (and subtree) removed.
    #[serde(rename = "D")]
    Delete,
    /// Path removed and re-created in the same revision.
    #[serde(rename = "R")]
    Replace,
    /// Path content or properties changed.
    #[serde(rename = "M")]
    Modify,
}

impl Action {
    /// Parse the one-letter action code used in history logs.
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'A' => Some(Self::Add),
            'D' => Some(Self::Delete),
            'R' => Some(Self::Replace),
            'M' => Some(Self::Modify),
            _ => None,
        }
    }

    /// The one-letter action code.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Add => 'A',
            Self::Delete => 'D',
            Self::Replace => 'R',
            Self::Modify => 'M',
        }
    }

    /// `true` for actions that remove the old object first (`D`, `R`).
    #[must_use]
    pub const fn removes(self) -> bool {
        matches!(self, Self::Delete | Self::Replace)
    }

    /// `true` for actions that create a new object (`A`, `R`).
    #[must_use]
    pub const fn creates(self) -> bool {
        matches!(self, Self::Add | Self::Replace)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Copy provenance in repository-global terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySource {
    /// Repository-global source path.
    pub path: String,
    /// Source revision number.
    pub revnum: u64,
}

/// One path's change as recorded by the repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// What happened.
    pub action: Action,
    /// Where the new object was copied from, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_from: Option<CopySource>,
}

impl ChangeRecord {
    /// A change without copy provenance.
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self {
            action,
            copy_from: None,
        }
    }

    /// A change copied from `path` at `revnum`.
    #[must_use]
    pub fn copied(action: Action, path: impl Into<String>, revnum: u64) -> Self {
        Self {
            action,
            copy_from: Some(CopySource {
                path: path.into(),
                revnum,
            }),
        }
    }
}

/// Repository-global changeset of one revision.
pub type RawChangeset = BTreeMap<String, ChangeRecord>;

/// Copy provenance rewritten to branch-local terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalCopySource {
    /// Source path, local to the source branch.
    pub path: String,
    /// Source revision on the source branch.
    pub revision: RevisionId,
}

/// One path's change, local to its branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalChange {
    /// What happened.
    pub action: Action,
    /// Where the new object was copied from, if anywhere.
    pub copy_from: Option<LocalCopySource>,
}

/// Branch-local changeset of one revision, keyed by local path.
pub type LocalChangeset = BTreeMap<String, LocalChange>;

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Parent of a local path; `""` is the parent of top-level paths and has no
/// parent itself.
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}

/// Ancestors of `path`, nearest first, ending with the root `""`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_path(path), |p| parent_path(*p))
}

/// `true` if `path` lies strictly below `dir`.
#[must_use]
pub fn is_descendant(path: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return !path.is_empty();
    }
    path.len() > dir.len() + 1
        && path.starts_with(dir)
        && path.as_bytes()[dir.len()] == b'/'
}

/// Join two slash-separated paths, either of which may be `""`.
#[must_use]
pub fn join_path(base: &str, rel: &str) -> String {
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{rel}"),
    }
}

/// Move `path` from below `from` to the same place below `to`.
///
/// Returns `None` if `path` is not a descendant of `from`.
#[must_use]
pub fn rebase_path(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_descendant(path, from) {
        return None;
    }
    let rel = if from.is_empty() {
        path
    } else {
        &path[from.len() + 1..]
    };
    Some(join_path(to, rel))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
