//! Rewrite repository-global changesets into branch-local ones.
//!
//! Each destination path loses its branch prefix. Copy sources are resolved
//! against *their own* branch, so a copy from another branch keeps pointing
//! at the right revision id.
//!
//! A copy of one branch root onto another (`branches/foo` copied from
//! `trunk`) is recorded as a plain modification of the new branch's root:
//! the branch continues the identity of its source, so no new root object
//! is created and the copy provenance is dropped at that level.

use std::fmt;

use crate::model::{Action, LocalChange, LocalChangeset, LocalCopySource, RawChangeset};
use crate::revid::RevisionId;
use crate::scheme::BranchScheme;

/// A changed path could not be placed in any branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizeError {
    /// The repository-global path.
    pub path: String,
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path '{}' is outside every branch of the branching scheme",
            self.path
        )
    }
}

impl std::error::Error for NormalizeError {}

/// Strip branch prefixes from `changes`.
///
/// Copy-source revision ids are built for `uuid` and tagged with the
/// scheme's name.
///
/// # Errors
/// Returns [`NormalizeError`] if a destination or copy-source path lies
/// outside every branch.
pub fn local_changes(
    changes: &RawChangeset,
    scheme: &dyn BranchScheme,
    uuid: &str,
) -> Result<LocalChangeset, NormalizeError> {
    let unprefix = |path: &str| {
        scheme.unprefix(path).ok_or_else(|| NormalizeError {
            path: path.to_owned(),
        })
    };

    let mut local = LocalChangeset::new();
    for (path, record) in changes {
        let (_, local_path) = unprefix(path)?;
        let change = match &record.copy_from {
            None => LocalChange {
                action: record.action,
                copy_from: None,
            },
            Some(src) => {
                let (src_branch, src_path) = unprefix(&src.path)?;
                if src_path.is_empty() && local_path.is_empty() {
                    tracing::debug!(
                        branch_copy = %path,
                        from = %src.path,
                        "whole-branch copy recorded as root modification"
                    );
                    LocalChange {
                        action: Action::Modify,
                        copy_from: None,
                    }
                } else {
                    LocalChange {
                        action: record.action,
                        copy_from: Some(LocalCopySource {
                            path: src_path,
                            revision: RevisionId::new(uuid, src_branch, src.revnum)
                                .with_scheme(scheme.name()),
                        }),
                    }
                }
            }
        };
        local.insert(local_path, change);
    }
    Ok(local)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
