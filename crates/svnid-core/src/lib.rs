//! svnid-core: stable object identities for path-addressed history.
//!
//! Repositories that record history as per-revision, per-path changes (with
//! copy provenance but no durable object identity) are projected onto a
//! model where every file and directory keeps one identifier for its whole
//! life, across renames and copies.
//!
//! | Module | Role |
//! |--------|------|
//! | [`revid`] | Revision-id wire encodings (v1, v2, v3) |
//! | [`model`] | Object ids, path states, changesets, path helpers |
//! | [`scheme`] | Branching schemes: which paths are branch roots |
//! | [`normalize`] | Global → branch-local changesets |
//! | [`cache`] | Path-state snapshot stores |
//! | [`history`] | History collaborator trait + in-memory history |
//! | [`engine`] | The projection engine |
//! | [`upgrade`] | Mapping-upgrade helpers |

pub mod cache;
pub mod engine;
pub mod history;
pub mod model;
pub mod normalize;
pub mod revid;
pub mod scheme;
pub mod upgrade;

pub use cache::{CacheError, FileCache, IdMapCache, MemoryCache};
pub use engine::{
    ChildSource, ConsistencyError, NoRenames, Projection, ProjectionEngine, ProjectionError,
    ProjectionWarning, RenameMap, RenameOverrides, apply_changeset,
};
pub use history::{HistoryEntry, HistoryError, HistoryWalker, MemoryHistory};
pub use model::{Action, ChangeRecord, ObjectId, PathEntry, PathState, RawChangeset};
pub use revid::{MappingVersion, ParseError, RevisionId};
pub use scheme::{BranchScheme, NoBranchingScheme, TrunkScheme};
