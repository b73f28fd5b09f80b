//! Branching schemes: which repository paths are branch roots.
//!
//! A scheme splits a repository-global path into the branch it belongs to
//! and the path local to that branch:
//!
//! ```text
//! TrunkScheme { level: 0 }
//!   trunk/src/lib.rs        → ("trunk", "src/lib.rs")
//!   branches/foo/README     → ("branches/foo", "README")
//!   tags/1.0                → ("tags/1.0", "")
//!   docs/index.html         → not in any branch
//!
//! NoBranchingScheme
//!   trunk/src/lib.rs        → ("", "trunk/src/lib.rs")
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Maps repository-global paths to (branch path, local path).
pub trait BranchScheme: Send + Sync + fmt::Debug {
    /// Name embedded in v3 revision ids (`none`, `trunk0`, ...).
    fn name(&self) -> String;

    /// Split `path` into its branch path and branch-local path.
    ///
    /// Returns `None` if `path` lies outside every branch.
    fn unprefix(&self, path: &str) -> Option<(String, String)>;

    /// Return `true` if `path` is itself the root of a branch.
    fn is_branch_root(&self, path: &str) -> bool;
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

// ---------------------------------------------------------------------------
// NoBranchingScheme
// ---------------------------------------------------------------------------

/// The whole repository is a single branch rooted at `""`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoBranchingScheme;

impl BranchScheme for NoBranchingScheme {
    fn name(&self) -> String {
        "none".to_owned()
    }

    fn unprefix(&self, path: &str) -> Option<(String, String)> {
        Some((String::new(), components(path).join("/")))
    }

    fn is_branch_root(&self, path: &str) -> bool {
        components(path).is_empty()
    }
}

// ---------------------------------------------------------------------------
// TrunkScheme
// ---------------------------------------------------------------------------

/// `trunk`, `branches/<name>` and `tags/<name>`, below `level` leading
/// project directories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrunkScheme {
    /// Number of project directories above `trunk`/`branches`/`tags`.
    pub level: usize,
}

impl TrunkScheme {
    /// Build a scheme at `level`.
    #[must_use]
    pub const fn new(level: usize) -> Self {
        Self { level }
    }

    /// Number of leading components that make up the branch path of
    /// `parts`, if they name a branch at all.
    fn branch_len(&self, parts: &[&str]) -> Option<usize> {
        match parts.get(self.level).copied() {
            Some("trunk") => Some(self.level + 1),
            Some("branches" | "tags") if parts.len() > self.level + 1 => Some(self.level + 2),
            _ => None,
        }
    }
}

impl BranchScheme for TrunkScheme {
    fn name(&self) -> String {
        format!("trunk{}", self.level)
    }

    fn unprefix(&self, path: &str) -> Option<(String, String)> {
        let parts = components(path);
        let n = self.branch_len(&parts)?;
        Some((parts[..n].join("/"), parts[n..].join("/")))
    }

    fn is_branch_root(&self, path: &str) -> bool {
        let parts = components(path);
        self.branch_len(&parts) == Some(parts.len())
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Resolve a scheme by the name it embeds in revision ids.
#[must_use]
pub fn scheme_from_name(name: &str) -> Option<Box<dyn BranchScheme>> {
    if name == "none" {
        return Some(Box::new(NoBranchingScheme));
    }
    let level = name.strip_prefix("trunk")?.parse().ok()?;
    Some(Box::new(TrunkScheme::new(level)))
}

/// Pick the scheme most likely to have produced `branch_path`.
///
/// `.../trunk` and `.../branches/<name>`, `.../tags/<name>` select a
/// [`TrunkScheme`] at the matching level; anything else is treated as a
/// repository without branches.
#[must_use]
pub fn guess_scheme_from_branch_path(branch_path: &str) -> Box<dyn BranchScheme> {
    let parts = components(branch_path);
    match parts.as_slice() {
        [.., "trunk"] => Box::new(TrunkScheme::new(parts.len() - 1)),
        [.., "branches" | "tags", _] => Box::new(TrunkScheme::new(parts.len() - 2)),
        _ => Box::new(NoBranchingScheme),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
