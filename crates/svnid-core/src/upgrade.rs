//! Mapping upgrades: moving revision ids from older encodings to the
//! current one.
//!
//! These are the pure inputs of a history rewrite. The rewrite itself
//! (replaying revisions under their new ids) happens elsewhere; this module
//! decides *which* ids change, *what* they become, and whether an upgraded
//! revision still describes the same commit.
//!
//! | Legacy form | Upgraded to |
//! |-------------|-------------|
//! | `svn-v1:<rev>@<uuid>-<branch>` | v3, scheme guessed from branch |
//! | `svn-v2:<rev>@<uuid>-<branch>` | v3, scheme guessed from branch |
//! | `svn-v3-undefined:...` | v3, scheme guessed from branch |
//! | `svn-v3-<scheme>:...` | unchanged |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::revid::{MappingVersion, RevisionId};
use crate::scheme::guess_scheme_from_branch_path;

/// Id for a locally rewritten copy of `revid`.
///
/// Appends `-svn<N>-upgrade`; an id that already carries an upgrade suffix
/// has it replaced rather than stacked.
#[must_use]
pub fn upgraded_revision_id(revid: &str) -> String {
    let suffix = format!("-svn{}-upgrade", MappingVersion::CURRENT.number());
    let base = if revid.ends_with("-upgrade") {
        revid.rfind("-svn").map_or(revid, |i| &revid[..i])
    } else {
        revid
    };
    format!("{base}{suffix}")
}

/// Map every legacy revision id in `revids` to its current-version form.
///
/// Ids that do not decode are not ours and are skipped, as are ids that
/// are already current and name their scheme.
#[must_use]
pub fn generate_upgrade_map<I, S>(revids: I) -> BTreeMap<String, RevisionId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = BTreeMap::new();
    for revid in revids {
        let revid = revid.as_ref();
        let Ok(old) = RevisionId::decode(revid) else {
            tracing::debug!(revid, "not a mapped revision id, skipping");
            continue;
        };
        if old.version() == MappingVersion::CURRENT && old.scheme().is_some() {
            continue;
        }
        let scheme = match old.scheme() {
            Some(name) => name.to_owned(),
            None => guess_scheme_from_branch_path(old.branch()).name(),
        };
        let new = RevisionId::new(old.uuid(), old.branch(), old.revnum()).with_scheme(scheme);
        map.insert(revid.to_owned(), new);
    }
    map
}

// ---------------------------------------------------------------------------
// Content check
// ---------------------------------------------------------------------------

/// Commit metadata compared when a revision is re-mapped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevisionMetadata {
    /// Revision id (ignored by [`check_revision_changed`]).
    pub revision_id: String,
    /// SHA-1 of the revision's tree inventory.
    #[serde(default)]
    pub inventory_sha1: Option<String>,
    /// Commit time, seconds since the epoch.
    pub timestamp: i64,
    /// Committer's UTC offset in seconds.
    #[serde(default)]
    pub timezone: i32,
    /// Commit message.
    #[serde(default)]
    pub message: String,
    /// Committer.
    #[serde(default)]
    pub committer: String,
    /// Revision properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Errors from upgrade checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpgradeError {
    /// The upgraded revision differs from the original in more than its id.
    ChangesContent {
        /// Id of the original revision.
        revision_id: String,
        /// Metadata fields that differ.
        fields: Vec<&'static str>,
    },
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangesContent {
                revision_id,
                fields,
            } => write!(
                f,
                "upgrade will change contents in revision {revision_id} ({})",
                fields.join(", ")
            ),
        }
    }
}

impl std::error::Error for UpgradeError {}

/// Verify that `new` describes the same commit as `old`, ignoring ids.
///
/// # Errors
/// Returns [`UpgradeError::ChangesContent`] naming every differing field.
pub fn check_revision_changed(
    old: &RevisionMetadata,
    new: &RevisionMetadata,
) -> Result<(), UpgradeError> {
    let checks = [
        ("inventory_sha1", old.inventory_sha1 == new.inventory_sha1),
        ("timestamp", old.timestamp == new.timestamp),
        ("timezone", old.timezone == new.timezone),
        ("message", old.message == new.message),
        ("committer", old.committer == new.committer),
        ("properties", old.properties == new.properties),
    ];
    let fields: Vec<&'static str> = checks
        .iter()
        .filter(|(_, same)| !same)
        .map(|(name, _)| *name)
        .collect();
    if fields.is_empty() {
        Ok(())
    } else {
        Err(UpgradeError::ChangesContent {
            revision_id: old.revision_id.clone(),
            fields,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;

    #[test]
    fn upgraded_id_appends_suffix_once() {
        assert_eq!(upgraded_revision_id("jelmer@x-1"), "jelmer@x-1-svn3-upgrade");
        assert_eq!(
            upgraded_revision_id("jelmer@x-1-svn1-upgrade"),
            "jelmer@x-1-svn3-upgrade"
        );
        assert_eq!(
            upgraded_revision_id(&upgraded_revision_id("a")),
            "a-svn3-upgrade"
        );
    }

    #[test]
    fn upgraded_id_without_svn_marker_keeps_body() {
        assert_eq!(upgraded_revision_id("my-upgrade"), "my-upgrade-svn3-upgrade");
    }

    #[test]
    fn upgrade_map_covers_legacy_versions() {
        let v1 = "svn-v1:4@uuid-trunk";
        let v2 = "svn-v2:5@uuid-branches%2dx/foo";
        let v3_undefined = "svn-v3-undefined:6@uuid-proj/trunk";
        let map = generate_upgrade_map([v1, v2, v3_undefined]);
        assert_eq!(map.len(), 3);

        let up = &map[v1];
        assert_eq!(up.version(), MappingVersion::CURRENT);
        assert_eq!(up.scheme(), Some("trunk0"));
        assert_eq!((up.uuid(), up.branch(), up.revnum()), ("uuid", "trunk", 4));

        assert_eq!(map[v2].branch(), "branches-x/foo");
        assert_eq!(map[v2].scheme(), Some("none"));
        assert_eq!(map[v3_undefined].scheme(), Some("trunk1"));
    }

    #[test]
    fn upgrade_map_skips_foreign_and_current_ids() {
        let current = RevisionId::new("uuid", "trunk", 2).with_scheme("trunk0").encode();
        let map = generate_upgrade_map(vec![
            "someone@example.com-20070101-abc".to_owned(),
            current,
        ]);
        assert!(map.is_empty());
    }

    #[test]
    fn upgrade_map_guesses_tag_scheme() {
        let map = generate_upgrade_map(["svn-v1:1@u-tags/1.0"]);
        assert_eq!(map["svn-v1:1@u-tags/1.0"].encode(), "svn-v3-trunk0:1@u-tags/1.0");
    }

    fn meta() -> RevisionMetadata {
        RevisionMetadata {
            revision_id: "svn-v1:1@u-trunk".into(),
            inventory_sha1: Some("abc".into()),
            timestamp: 1_200_000_000,
            timezone: 3600,
            message: "initial import".into(),
            committer: "jelmer".into(),
            properties: BTreeMap::from([("svn:log".into(), "x".into())]),
        }
    }

    #[test]
    fn unchanged_metadata_passes() {
        let mut new = meta();
        new.revision_id = "svn-v3-trunk0:1@u-trunk".into();
        assert_eq!(check_revision_changed(&meta(), &new), Ok(()));
    }

    #[test]
    fn changed_metadata_names_fields() {
        let mut new = meta();
        new.message = "rewritten".into();
        new.properties.clear();
        let err = check_revision_changed(&meta(), &new).unwrap_err();
        assert_eq!(
            err,
            UpgradeError::ChangesContent {
                revision_id: "svn-v1:1@u-trunk".into(),
                fields: vec!["message", "properties"],
            }
        );
        assert!(err.to_string().contains("svn-v1:1@u-trunk"));
    }

    #[test]
    fn metadata_parses_with_defaults() {
        let parsed: RevisionMetadata =
            serde_json::from_str(r#"{"revision_id": "r", "timestamp": 5}"#).unwrap();
        assert_eq!(parsed.timestamp, 5);
        assert!(parsed.properties.is_empty());
        assert!(serde_json::from_str::<RevisionMetadata>(r#"{"revision_id": "r", "timestamp": 5, "x": 1}"#).is_err());
    }
}
