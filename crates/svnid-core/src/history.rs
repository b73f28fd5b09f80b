//! History collaborator: reading changesets out of the source repository.
//!
//! The projection engine never talks to a repository directly. It asks a
//! [`HistoryWalker`] for:
//!
//! 1. the changesets that shaped a branch, newest first, following the
//!    branch back across the copy that created it
//!    ([`HistoryWalker::follow_history`]);
//! 2. every path below a directory at some revision
//!    ([`HistoryWalker::find_children`]), used to give a copied subtree its
//!    identities.
//!
//! [`MemoryHistory`] implements both over an in-memory revision log. It is
//! what the JSON history dumps load into and what the tests drive.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::{Action, RawChangeset, is_descendant, rebase_path};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One revision of a branch's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Branch path the revision was recorded on (changes when the walk
    /// crosses a branch copy).
    pub branch: String,
    /// Changes under `branch` in this revision, repository-global paths.
    pub changes: RawChangeset,
    /// Revision number.
    pub revnum: u64,
}

/// Iterator returned by [`HistoryWalker::follow_history`].
pub type HistoryIter<'a> = Box<dyn Iterator<Item = Result<HistoryEntry, HistoryError>> + 'a>;

/// Read access to the source repository's history.
///
/// Calls may block on I/O. Implementations own their retry policy.
pub trait HistoryWalker: Send + Sync {
    /// Revisions that touched `branch` at or before `revnum`, newest first.
    ///
    /// When the branch was created by copying another path, the walk
    /// continues on the copy source from the source revision. Each call
    /// starts a fresh, independent walk.
    fn follow_history<'a>(&'a self, branch: &str, revnum: u64) -> HistoryIter<'a>;

    /// Every live path strictly below `path` at `revnum`, repository-global.
    ///
    /// # Errors
    /// Returns [`HistoryError`] if the revision does not exist or the
    /// backend fails.
    fn find_children(&self, path: &str, revnum: u64) -> Result<Vec<String>, HistoryError>;
}

/// Errors from a [`HistoryWalker`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryError {
    /// The requested revision is newer than the repository.
    NoSuchRevision {
        /// Requested revision.
        revnum: u64,
        /// Latest revision available.
        latest: u64,
    },
    /// A copy refers to a source revision that is not older than the copy.
    InvalidCopySource {
        /// Copy destination.
        path: String,
        /// Revision containing the copy.
        revnum: u64,
        /// Source revision named by the copy.
        source_revnum: u64,
    },
    /// The backing store failed.
    Backend {
        /// Description of the failure.
        detail: String,
    },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchRevision { revnum, latest } => {
                write!(f, "no revision r{revnum} (latest is r{latest})")
            }
            Self::InvalidCopySource {
                path,
                revnum,
                source_revnum,
            } => write!(
                f,
                "r{revnum}: '{path}' copied from r{source_revnum}, which is not an earlier revision"
            ),
            Self::Backend { detail } => write!(f, "history backend error: {detail}"),
        }
    }
}

impl std::error::Error for HistoryError {}

// ---------------------------------------------------------------------------
// MemoryHistory
// ---------------------------------------------------------------------------

/// In-memory revision log. Revision 0 is the empty repository (root only).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryHistory {
    revisions: BTreeMap<u64, RawChangeset>,
}

impl MemoryHistory {
    /// Create an empty history (only revision 0).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            revisions: BTreeMap::new(),
        }
    }

    /// Append a revision and return its number.
    pub fn commit(&mut self, changes: RawChangeset) -> u64 {
        let revnum = self.latest_revnum() + 1;
        self.revisions.insert(revnum, changes);
        revnum
    }

    /// Record `changes` as revision `revnum`, replacing anything there.
    ///
    /// Revisions without an entry are treated as empty.
    pub fn insert(&mut self, revnum: u64, changes: RawChangeset) {
        self.revisions.insert(revnum, changes);
    }

    /// Latest revision number (0 for an empty history).
    #[must_use]
    pub fn latest_revnum(&self) -> u64 {
        self.revisions.keys().next_back().copied().unwrap_or(0)
    }

    /// Changes recorded at `revnum`, if any.
    #[must_use]
    pub fn changes(&self, revnum: u64) -> Option<&RawChangeset> {
        self.revisions.get(&revnum)
    }

    fn check_revnum(&self, revnum: u64) -> Result<(), HistoryError> {
        let latest = self.latest_revnum();
        if revnum > latest {
            return Err(HistoryError::NoSuchRevision { revnum, latest });
        }
        Ok(())
    }

    /// Every live path at `revnum`, root `""` included.
    ///
    /// # Errors
    /// Returns [`HistoryError`] for an unknown revision or a copy from a
    /// revision that is not older than the copy.
    pub fn tree_at(&self, revnum: u64) -> Result<BTreeSet<String>, HistoryError> {
        self.check_revnum(revnum)?;
        // Only revisions some copy reads from need their tree kept.
        let sources: BTreeSet<u64> = self
            .revisions
            .range(1..=revnum)
            .flat_map(|(_, changes)| changes.values())
            .filter_map(|record| record.copy_from.as_ref().map(|src| src.revnum))
            .collect();

        let mut tree: BTreeSet<String> = std::iter::once(String::new()).collect();
        let mut kept: BTreeMap<u64, BTreeSet<String>> = BTreeMap::new();
        if sources.contains(&0) {
            kept.insert(0, tree.clone());
        }

        for rev in 1..=revnum {
            if let Some(changes) = self.revisions.get(&rev) {
                for (path, record) in changes {
                    if record.action.removes() {
                        tree.retain(|p| p != path && !is_descendant(p, path));
                    }
                    if record.action.creates() {
                        tree.insert(path.clone());
                        if let Some(src) = &record.copy_from {
                            let src_tree = kept
                                .get(&src.revnum)
                                .filter(|_| src.revnum < rev)
                                .ok_or_else(|| HistoryError::InvalidCopySource {
                                    path: path.clone(),
                                    revnum: rev,
                                    source_revnum: src.revnum,
                                })?;
                            let copied: Vec<String> = src_tree
                                .iter()
                                .filter_map(|c| rebase_path(c, &src.path, path))
                                .collect();
                            tree.extend(copied);
                        }
                    } else if record.action == Action::Modify {
                        tree.insert(path.clone());
                    }
                }
            }
            if sources.contains(&rev) {
                kept.insert(rev, tree.clone());
            }
        }
        Ok(tree)
    }
}

impl HistoryWalker for MemoryHistory {
    fn follow_history<'a>(&'a self, branch: &str, revnum: u64) -> HistoryIter<'a> {
        if let Err(e) = self.check_revnum(revnum) {
            return Box::new(std::iter::once(Err(e)));
        }
        Box::new(FollowHistory {
            history: self,
            branch: branch.to_owned(),
            next: Some(revnum),
        })
    }

    fn find_children(&self, path: &str, revnum: u64) -> Result<Vec<String>, HistoryError> {
        Ok(self
            .tree_at(revnum)?
            .into_iter()
            .filter(|p| is_descendant(p, path))
            .collect())
    }
}

/// Lazy newest-first walk over one branch of a [`MemoryHistory`].
struct FollowHistory<'a> {
    history: &'a MemoryHistory,
    branch: String,
    next: Option<u64>,
}

impl Iterator for FollowHistory<'_> {
    type Item = Result<HistoryEntry, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rev = self.next.filter(|&r| r > 0)?;
            self.next = Some(rev - 1);
            let Some(changes) = self.history.revisions.get(&rev) else {
                continue;
            };

            let on_branch: RawChangeset = changes
                .iter()
                .filter(|(p, _)| *p == &self.branch || is_descendant(p, &self.branch))
                .map(|(p, r)| (p.clone(), r.clone()))
                .collect();

            // Creating the branch root, or the nearest directory above it,
            // ends this incarnation; a copy moves the walk onto its source.
            let origin = changes
                .iter()
                .filter(|(p, r)| {
                    r.action.creates() && (**p == self.branch || is_descendant(&self.branch, p))
                })
                .max_by_key(|(p, _)| p.len());
            let branch = self.branch.clone();
            if let Some((dir, record)) = origin {
                match &record.copy_from {
                    Some(src) if src.revnum >= rev => {
                        self.next = None;
                        return Some(Err(HistoryError::InvalidCopySource {
                            path: dir.clone(),
                            revnum: rev,
                            source_revnum: src.revnum,
                        }));
                    }
                    Some(src) => {
                        self.branch = if *dir == self.branch {
                            src.path.clone()
                        } else {
                            rebase_path(&self.branch, dir, &src.path)
                                .unwrap_or_else(|| src.path.clone())
                        };
                        self.next = Some(src.revnum);
                    }
                    None => self.next = None,
                }
            }

            if on_branch.is_empty() {
                continue;
            }
            return Some(Ok(HistoryEntry {
                branch,
                changes: on_branch,
                revnum: rev,
            }));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;
    use crate::model::ChangeRecord;

    fn changes(entries: &[(&str, ChangeRecord)]) -> RawChangeset {
        entries
            .iter()
            .map(|(p, r)| ((*p).to_owned(), r.clone()))
            .collect()
    }

    fn add(p: &str) -> (&str, ChangeRecord) {
        (p, ChangeRecord::new(Action::Add))
    }

    /// r1 trunk, r2 trunk/a + trunk/a/x, r3 branches + branches/foo (copy of
    /// trunk@2), r4 modify trunk/a/x, r5 add branches/foo/b.
    fn branched() -> MemoryHistory {
        let mut h = MemoryHistory::new();
        h.commit(changes(&[add("trunk")]));
        h.commit(changes(&[add("trunk/a"), add("trunk/a/x")]));
        h.commit(changes(&[
            add("branches"),
            ("branches/foo", ChangeRecord::copied(Action::Add, "trunk", 2)),
        ]));
        h.commit(changes(&[("trunk/a/x", ChangeRecord::new(Action::Modify))]));
        h.commit(changes(&[add("branches/foo/b")]));
        h
    }

    fn walk(h: &MemoryHistory, branch: &str, rev: u64) -> Vec<(String, u64)> {
        h.follow_history(branch, rev)
            .map(|e| e.unwrap())
            .map(|e| (e.branch, e.revnum))
            .collect()
    }

    #[test]
    fn follow_history_is_newest_first_and_branch_local() {
        let h = branched();
        assert_eq!(
            walk(&h, "trunk", 5),
            vec![("trunk".into(), 4), ("trunk".into(), 2), ("trunk".into(), 1)]
        );
    }

    #[test]
    fn follow_history_crosses_branch_copy() {
        let h = branched();
        assert_eq!(
            walk(&h, "branches/foo", 5),
            vec![
                ("branches/foo".into(), 5),
                ("branches/foo".into(), 3),
                ("trunk".into(), 2),
                ("trunk".into(), 1),
            ]
        );
    }

    #[test]
    fn follow_history_filters_other_branches() {
        let h = branched();
        let entry = h.follow_history("branches/foo", 3).next().unwrap().unwrap();
        assert_eq!(entry.changes.len(), 1);
        assert!(entry.changes.contains_key("branches/foo"));
    }

    #[test]
    fn follow_history_crosses_parent_directory_copy() {
        let mut h = MemoryHistory::new();
        h.commit(changes(&[add("proj"), add("proj/trunk")]));
        h.commit(changes(&[add("proj/trunk/f")]));
        h.commit(changes(&[("moved", ChangeRecord::copied(Action::Add, "proj", 2))]));
        h.commit(changes(&[("moved/trunk/f", ChangeRecord::new(Action::Modify))]));
        assert_eq!(
            walk(&h, "moved/trunk", 4),
            vec![
                ("moved/trunk".into(), 4),
                ("proj/trunk".into(), 2),
                ("proj/trunk".into(), 1),
            ]
        );
    }

    #[test]
    fn follow_history_stops_at_branch_creation() {
        let mut h = MemoryHistory::new();
        h.commit(changes(&[add("trunk")]));
        h.commit(changes(&[("trunk", ChangeRecord::new(Action::Delete))]));
        h.commit(changes(&[add("trunk")]));
        assert_eq!(walk(&h, "trunk", 3), vec![("trunk".into(), 3)]);
    }

    #[test]
    fn follow_history_rejects_future_revision() {
        let h = branched();
        let first = h.follow_history("trunk", 9).next().unwrap();
        assert_eq!(
            first,
            Err(HistoryError::NoSuchRevision {
                revnum: 9,
                latest: 5
            })
        );
    }

    #[test]
    fn find_children_follows_copies() {
        let h = branched();
        assert_eq!(
            h.find_children("branches/foo", 5).unwrap(),
            vec!["branches/foo/a", "branches/foo/a/x", "branches/foo/b"]
        );
        assert_eq!(h.find_children("trunk", 1).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn find_children_after_delete() {
        let mut h = branched();
        h.commit(changes(&[("trunk/a", ChangeRecord::new(Action::Delete))]));
        assert!(h.find_children("trunk", 6).unwrap().is_empty());
        assert_eq!(h.find_children("trunk", 5).unwrap().len(), 2);
    }

    #[test]
    fn follow_history_rejects_copy_from_same_revision() {
        let mut h = MemoryHistory::new();
        h.commit(changes(&[add("trunk")]));
        h.commit(changes(&[("branches/x", ChangeRecord::copied(Action::Add, "trunk", 2))]));
        let walked: Vec<_> = h.follow_history("branches/x", 2).collect();
        assert_eq!(
            walked,
            vec![Err(HistoryError::InvalidCopySource {
                path: "branches/x".into(),
                revnum: 2,
                source_revnum: 2,
            })]
        );
    }

    #[test]
    fn tree_at_rejects_forward_copy() {
        let mut h = MemoryHistory::new();
        h.commit(changes(&[("a", ChangeRecord::copied(Action::Add, "b", 1))]));
        assert!(matches!(
            h.tree_at(1),
            Err(HistoryError::InvalidCopySource { .. })
        ));
    }
}
