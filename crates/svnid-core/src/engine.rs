//! Projection engine: the path state of a branch at any revision.
//!
//! # Algorithm
//!
//! 1. Walk the branch's history newest first ([`HistoryWalker::follow_history`])
//!    until a revision with a cached snapshot is found or history runs out.
//! 2. Fold the collected changesets oldest first onto the cached snapshot
//!    (or the initial state): normalize each to branch-local paths, then
//!    [`apply_changeset`].
//! 3. Save the result under the newest folded revision, with the step
//!    before it as parent.
//!
//! # Fold step
//!
//! Paths are handled in ascending order:
//!
//! | Action | Pre-step | Post-step |
//! |--------|----------|-----------|
//! | `D` | remove path + subtree (must exist) | |
//! | `R` | remove path + subtree (must exist) | fresh entry, copy propagation |
//! | `A` | | fresh entry, copy propagation |
//! | `M` | | path must exist, last-touched advanced |
//!
//! Every change then touches its ancestors, nearest first, stopping at the
//! first one already touched by the same revision.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::cache::IdMapCache;
use crate::history::{HistoryError, HistoryWalker};
use crate::model::{
    Action, LocalChangeset, ObjectId, PathEntry, PathState, RawChangeset, ancestors, join_path,
    rebase_path,
};
use crate::normalize::{NormalizeError, local_changes};
use crate::revid::{ParseError, RevisionId};
use crate::scheme::BranchScheme;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Caller-supplied identities for objects created at known paths.
///
/// Consulted before deriving a fresh id, so objects the caller already knows
/// (e.g. recorded renames) keep their identity.
pub trait RenameOverrides {
    /// Identity to give the object created at `path` in `revision`, if any.
    fn renamed_id(&self, revision: &RevisionId, path: &str) -> Option<ObjectId>;
}

/// No overrides: every created object gets a derived id.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRenames;

impl RenameOverrides for NoRenames {
    fn renamed_id(&self, _revision: &RevisionId, _path: &str) -> Option<ObjectId> {
        None
    }
}

/// Overrides keyed by (revision, branch-local path).
#[derive(Clone, Debug, Default)]
pub struct RenameMap {
    ids: HashMap<(String, String), ObjectId>,
}

impl RenameMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the object created at `path` in `revision` the id `id`.
    pub fn insert(&mut self, revision: &RevisionId, path: impl Into<String>, id: ObjectId) {
        self.ids.insert((revision.encode(), path.into()), id);
    }

    /// Number of overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Return `true` if there are no overrides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl RenameOverrides for RenameMap {
    fn renamed_id(&self, revision: &RevisionId, path: &str) -> Option<ObjectId> {
        self.ids
            .get(&(revision.encode(), path.to_owned()))
            .cloned()
    }
}

/// Enumerates the subtree a copy brings along.
pub trait ChildFinder {
    /// Every path strictly below `path` on `revision`'s branch at
    /// `revision`, branch-local.
    ///
    /// # Errors
    /// Returns [`HistoryError`] if the history cannot be read.
    fn find_children(&self, path: &str, revision: &RevisionId) -> Result<Vec<String>, HistoryError>;
}

/// Whether copy sources can be enumerated during a fold.
#[derive(Clone, Copy)]
pub enum ChildSource<'a> {
    /// Enumerate with this finder.
    Finder(&'a dyn ChildFinder),
    /// No enumeration possible; copies only create their root entry.
    Unavailable,
}

impl fmt::Debug for ChildSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finder(_) => f.write_str("ChildSource::Finder"),
            Self::Unavailable => f.write_str("ChildSource::Unavailable"),
        }
    }
}

/// [`ChildFinder`] over a [`HistoryWalker`].
pub struct WalkerChildren<'a> {
    walker: &'a dyn HistoryWalker,
}

impl<'a> WalkerChildren<'a> {
    /// Enumerate children through `walker`.
    #[must_use]
    pub fn new(walker: &'a dyn HistoryWalker) -> Self {
        Self { walker }
    }
}

impl ChildFinder for WalkerChildren<'_> {
    fn find_children(&self, path: &str, revision: &RevisionId) -> Result<Vec<String>, HistoryError> {
        let global = join_path(revision.branch(), path);
        Ok(self
            .walker
            .find_children(&global, revision.revnum())?
            .iter()
            .filter_map(|child| rebase_path(child, &global, path))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Errors and warnings
// ---------------------------------------------------------------------------

/// How a changeset contradicts the state it is applied to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsistencyKind {
    /// `D` or `R` of a path that is not live.
    DeleteOfAbsentPath,
    /// `M` of a path that is not live.
    ModifyOfAbsentPath,
    /// A changed path's ancestor directory is not live.
    AbsentAncestor {
        /// The missing directory.
        ancestor: String,
    },
}

/// The history violates the tree-shape contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsistencyError {
    /// Revision whose changeset failed.
    pub revision: RevisionId,
    /// Changed path.
    pub path: String,
    /// What went wrong.
    pub kind: ConsistencyKind,
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            revision,
            path,
            kind,
        } = self;
        match kind {
            ConsistencyKind::DeleteOfAbsentPath => {
                write!(f, "{revision}: delete/replace of absent path '{path}'")
            }
            ConsistencyKind::ModifyOfAbsentPath => {
                write!(f, "{revision}: modify of absent path '{path}'")
            }
            ConsistencyKind::AbsentAncestor { ancestor } => write!(
                f,
                "{revision}: '{path}' changed but its ancestor '{ancestor}' is absent"
            ),
        }
    }
}

impl std::error::Error for ConsistencyError {}

/// Cache call that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOperation {
    /// Snapshot lookup.
    Load,
    /// Snapshot write.
    Save,
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => f.write_str("load"),
            Self::Save => f.write_str("save"),
        }
    }
}

/// Non-fatal problems encountered while projecting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionWarning {
    /// A copied subtree could not be enumerated; only its root got an entry.
    DegradedData {
        /// Revision containing the copy.
        revision: RevisionId,
        /// Copy destination.
        path: String,
        /// Copy source, local to its branch.
        source_path: String,
        /// Why the children are missing.
        reason: String,
    },
    /// The cache failed; the projection went on without it.
    CacheUnavailable {
        /// Revision being loaded or saved.
        revision: RevisionId,
        /// Which call failed.
        operation: CacheOperation,
        /// The cache error.
        reason: String,
    },
}

impl fmt::Display for ProjectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegradedData {
                revision,
                path,
                source_path,
                reason,
            } => write!(
                f,
                "{revision}: children of '{path}' (copied from '{source_path}') unknown: {reason}"
            ),
            Self::CacheUnavailable {
                revision,
                operation,
                reason,
            } => write!(f, "id map cache {operation} of {revision} failed: {reason}"),
        }
    }
}

/// Errors that abort a projection.
#[derive(Debug)]
pub enum ProjectionError {
    /// A changeset contradicts the state it is applied to.
    Consistency(ConsistencyError),
    /// A changed path lies outside every branch.
    OutsideBranch(NormalizeError),
    /// A stored revision id does not decode.
    Parse(ParseError),
    /// The history could not be read.
    History(HistoryError),
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consistency(e) => write!(f, "inconsistent history: {e}"),
            Self::OutsideBranch(e) => write!(f, "cannot normalize changeset: {e}"),
            Self::Parse(e) => write!(f, "malformed revision id: {e}"),
            Self::History(e) => write!(f, "history unavailable: {e}"),
        }
    }
}

impl std::error::Error for ProjectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Consistency(e) => Some(e),
            Self::OutsideBranch(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::History(e) => Some(e),
        }
    }
}

impl From<ConsistencyError> for ProjectionError {
    fn from(e: ConsistencyError) -> Self {
        Self::Consistency(e)
    }
}

impl From<NormalizeError> for ProjectionError {
    fn from(e: NormalizeError) -> Self {
        Self::OutsideBranch(e)
    }
}

impl From<ParseError> for ProjectionError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<HistoryError> for ProjectionError {
    fn from(e: HistoryError) -> Self {
        Self::History(e)
    }
}

// ---------------------------------------------------------------------------
// Fold step
// ---------------------------------------------------------------------------

/// Apply one branch-local changeset to `state`.
///
/// On error `state` may be partially updated; callers discard it.
///
/// # Errors
/// Returns [`ConsistencyError`] if a deleted, replaced or modified path is
/// absent, or if a changed path's ancestor is absent.
pub fn apply_changeset(
    state: &mut PathState,
    revision: &RevisionId,
    changes: &LocalChangeset,
    children: &ChildSource<'_>,
    renames: &dyn RenameOverrides,
) -> Result<Vec<ProjectionWarning>, ConsistencyError> {
    // Keyed by the destination path, so copied children get ids (and rename
    // lookups) of their own rather than their source's.
    let fresh_entry = |path: &str| {
        let id = renames
            .renamed_id(revision, path)
            .unwrap_or_else(|| ObjectId::derive(revision, path));
        PathEntry::new(id, revision.clone())
    };

    let mut warnings = Vec::new();
    for (path, change) in changes {
        let fail = |kind: ConsistencyKind| ConsistencyError {
            revision: revision.clone(),
            path: path.clone(),
            kind,
        };

        if change.action.removes() {
            if !state.contains(path) {
                return Err(fail(ConsistencyKind::DeleteOfAbsentPath));
            }
            state.remove_subtree(path);
        }

        if change.action.creates() {
            state.insert(path.clone(), fresh_entry(path.as_str()));
            if let Some(src) = &change.copy_from {
                let found = match children {
                    ChildSource::Finder(finder) => finder
                        .find_children(&src.path, &src.revision)
                        .map_err(|e| e.to_string()),
                    ChildSource::Unavailable => Err("child enumeration unavailable".to_owned()),
                };
                match found {
                    Ok(found) => {
                        for dest in found
                            .iter()
                            .filter_map(|child| rebase_path(child, &src.path, path))
                        {
                            let entry = fresh_entry(dest.as_str());
                            state.insert(dest, entry);
                        }
                    }
                    Err(reason) => {
                        tracing::warn!(
                            revision = %revision,
                            path = %path,
                            source = %src.path,
                            reason = %reason,
                            "copied subtree not enumerated"
                        );
                        warnings.push(ProjectionWarning::DegradedData {
                            revision: revision.clone(),
                            path: path.clone(),
                            source_path: src.path.clone(),
                            reason,
                        });
                    }
                }
            }
        } else if change.action == Action::Modify {
            let entry = state
                .get_mut(path)
                .ok_or_else(|| fail(ConsistencyKind::ModifyOfAbsentPath))?;
            entry.last_touched = revision.clone();
        }

        touch_ancestors(state, revision, path)
            .map_err(|ancestor| fail(ConsistencyKind::AbsentAncestor { ancestor }))?;
    }
    Ok(warnings)
}

/// Advance the ancestors of `path` to `revision`; `Err` names a missing one.
fn touch_ancestors(state: &mut PathState, revision: &RevisionId, path: &str) -> Result<(), String> {
    for ancestor in ancestors(path) {
        let entry = state
            .get_mut(ancestor)
            .ok_or_else(|| ancestor.to_owned())?;
        if entry.last_touched == *revision {
            break;
        }
        entry.last_touched = revision.clone();
    }
    Ok(())
}

/// Replacing a root the state does not hold starts a new incarnation of
/// the branch: the walk stopped at it, so there is nothing to remove.
fn recreate_root(changes: &mut LocalChangeset) {
    if let Some(root) = changes.get_mut("")
        && root.action == Action::Replace
    {
        root.action = Action::Add;
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Result of a projection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    /// Live paths of the branch at the target revision.
    pub state: PathState,
    /// Problems that did not stop the projection.
    pub warnings: Vec<ProjectionWarning>,
}

/// Reconstructs branch path states from history, one repository at a time.
pub struct ProjectionEngine {
    uuid: String,
    history: Arc<dyn HistoryWalker>,
    scheme: Arc<dyn BranchScheme>,
    cache: Arc<dyn IdMapCache>,
}

impl fmt::Debug for ProjectionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionEngine")
            .field("uuid", &self.uuid)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl ProjectionEngine {
    /// Build an engine for repository `uuid`.
    #[must_use]
    pub fn new(
        uuid: impl Into<String>,
        history: Arc<dyn HistoryWalker>,
        scheme: Arc<dyn BranchScheme>,
        cache: Arc<dyn IdMapCache>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            history,
            scheme,
            cache,
        }
    }

    /// Repository instance id.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Branching scheme in use.
    #[must_use]
    pub fn scheme(&self) -> &dyn BranchScheme {
        self.scheme.as_ref()
    }

    /// Revision id of `branch` at `revnum` under this engine's scheme.
    #[must_use]
    pub fn revision_id(&self, branch: &str, revnum: u64) -> RevisionId {
        RevisionId::new(&self.uuid, branch, revnum).with_scheme(self.scheme.name())
    }

    /// State before any history: the genesis root if the repository root
    /// is itself a branch, otherwise nothing.
    fn initial_state(&self) -> PathState {
        if !self.scheme.is_branch_root("") {
            return PathState::new();
        }
        let genesis = RevisionId::genesis(&self.uuid).with_scheme(self.scheme.name());
        std::iter::once((
            String::new(),
            PathEntry::new(ObjectId::derive(&genesis, ""), genesis),
        ))
        .collect()
    }

    /// Path state of `branch` at `revnum`.
    ///
    /// # Errors
    /// See [`ProjectionEngine::project_with_renames`].
    pub fn project(&self, branch: &str, revnum: u64) -> Result<Projection, ProjectionError> {
        self.project_with_renames(branch, revnum, &NoRenames)
    }

    /// Path state of `branch` at `revnum`, with caller-supplied identities
    /// for created objects.
    ///
    /// # Errors
    /// Returns [`ProjectionError`] if the history cannot be read, contains a
    /// path outside every branch, or contradicts itself. Cache failures of
    /// any kind only produce warnings.
    #[instrument(skip_all, fields(branch = branch, revnum = revnum))]
    pub fn project_with_renames(
        &self,
        branch: &str,
        revnum: u64,
        renames: &dyn RenameOverrides,
    ) -> Result<Projection, ProjectionError> {
        let mut warnings = Vec::new();
        if revnum == 0 {
            return Ok(Projection {
                state: self.initial_state(),
                warnings,
            });
        }

        // Newest first, down to (not including) the cached base.
        let mut todo: Vec<(RevisionId, RawChangeset)> = Vec::new();
        let mut base: Option<(RevisionId, PathState)> = None;
        let mut load_failed = false;
        for entry in self.history.follow_history(branch, revnum) {
            let entry = entry?;
            // A branch copied from a subdirectory is rebuilt by the copy's
            // own propagation; the source's earlier history is not ours.
            if !self.scheme.is_branch_root(&entry.branch) {
                tracing::debug!(
                    source = %entry.branch,
                    revnum = entry.revnum,
                    "history continues outside any branch root, stopping walk"
                );
                break;
            }
            let revision = self.revision_id(&entry.branch, entry.revnum);
            match self.cache.load(&revision) {
                Ok(state) if !state.is_empty() => {
                    tracing::info!(revision = %revision, paths = state.len(), "id map cache hit");
                    base = Some((revision, state));
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(revision = %revision, error = %e, "id map cache load failed");
                    if !load_failed {
                        load_failed = true;
                        warnings.push(ProjectionWarning::CacheUnavailable {
                            revision: revision.clone(),
                            operation: CacheOperation::Load,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            todo.push((revision, entry.changes));
        }

        let (mut previous, mut state) = match base {
            Some((revision, state)) => (Some(revision), state),
            None => (None, self.initial_state()),
        };
        tracing::debug!(steps = todo.len(), cached = previous.is_some(), "replaying history");

        let finder = WalkerChildren::new(self.history.as_ref());
        let children = ChildSource::Finder(&finder);
        let mut current: Option<RevisionId> = None;
        for (revision, raw) in todo.into_iter().rev() {
            let mut local = local_changes(&raw, self.scheme.as_ref(), &self.uuid)?;
            if !state.contains("") {
                recreate_root(&mut local);
            }
            tracing::debug!(revision = %revision, changes = local.len(), "applying changeset");
            warnings.extend(apply_changeset(
                &mut state, &revision, &local, &children, renames,
            )?);
            previous = current.replace(revision).or(previous);
        }

        if let Some(revision) = &current {
            let parents: Vec<RevisionId> = previous.into_iter().collect();
            match self.cache.save(revision, &parents, &state) {
                Ok(()) => {
                    tracing::info!(revision = %revision, paths = state.len(), "id map snapshot saved");
                }
                Err(e) => {
                    tracing::warn!(revision = %revision, error = %e, "id map cache save failed");
                    warnings.push(ProjectionWarning::CacheUnavailable {
                        revision: revision.clone(),
                        operation: CacheOperation::Save,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Projection { state, warnings })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
