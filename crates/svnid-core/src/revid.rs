//! Revision identifiers: opaque, reversible keys for one revision of one branch.
//!
//! A [`RevisionId`] names revision `revnum` of branch `branch` in the
//! repository instance `uuid`. It is the foreign key every other component
//! uses to refer to a revision, so it must survive a text round trip.
//!
//! # Wire forms
//!
//! | Version | Form |
//! |---------|------|
//! | v1 | `svn-v1:<revnum>@<uuid>-<branch>` |
//! | v2 | `svn-v2:<revnum>@<uuid>-<branch>` |
//! | v3 (current) | `svn-v3-<scheme>:<revnum>@<uuid>-<branch>` |
//!
//! `<branch>` (and `<scheme>`) are escaped with [`escape_path`] so that the
//! last `-` in the body always separates the uuid from the branch path. A
//! v3 id without a known branching scheme spells the scheme `undefined`.
//!
//! Legacy ids are decoded for compatibility; new ids are always produced at
//! [`MappingVersion::CURRENT`].

use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scheme placeholder used by v3 ids that carry no branching scheme.
pub const UNDEFINED_SCHEME: &str = "undefined";

// ---------------------------------------------------------------------------
// MappingVersion
// ---------------------------------------------------------------------------

/// Generation of the revision-id encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MappingVersion {
    /// `svn-v1:` ids.
    V1,
    /// `svn-v2:` ids.
    V2,
    /// `svn-v3-<scheme>:` ids.
    V3,
}

impl MappingVersion {
    /// The version every newly produced id is encoded with.
    pub const CURRENT: Self = Self::V3;

    /// Every version [`RevisionId::decode`] understands.
    pub const ALL: [Self; 3] = [Self::V1, Self::V2, Self::V3];

    /// Numeric form (`1`, `2`, `3`).
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    /// Inverse of [`number`](Self::number).
    #[must_use]
    pub const fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }
}

impl fmt::Display for MappingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// A string could not be decoded as a [`RevisionId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl ParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid revision id '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// RevisionId
// ---------------------------------------------------------------------------

/// One revision of one branch in one repository instance.
///
/// Immutable once built. The optional branching-scheme name only survives
/// the v3 encoding; v1 and v2 ids never carry one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId {
    uuid: String,
    branch: String,
    revnum: u64,
    version: MappingVersion,
    scheme: Option<String>,
}

impl RevisionId {
    /// Build an id at the current mapping version with no scheme.
    #[must_use]
    pub fn new(uuid: impl Into<String>, branch: impl Into<String>, revnum: u64) -> Self {
        Self {
            uuid: uuid.into(),
            branch: branch.into(),
            revnum,
            version: MappingVersion::CURRENT,
            scheme: None,
        }
    }

    /// The synthetic id of revision 0 of the repository root.
    #[must_use]
    pub fn genesis(uuid: impl Into<String>) -> Self {
        Self::new(uuid, "", 0)
    }

    /// Same revision, different encoding generation.
    ///
    /// Dropping to v1 or v2 discards the scheme.
    #[must_use]
    pub fn with_version(mut self, version: MappingVersion) -> Self {
        if version != MappingVersion::V3 {
            self.scheme = None;
        }
        self.version = version;
        self
    }

    /// Attach a branching-scheme name (only meaningful for v3).
    ///
    /// The name `undefined` is the encoding of "no scheme" and clears it.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        if self.version == MappingVersion::V3 {
            let scheme = scheme.into();
            self.scheme = (scheme != UNDEFINED_SCHEME).then_some(scheme);
        }
        self
    }

    /// Another revision of the same branch.
    #[must_use]
    pub fn at_revnum(&self, revnum: u64) -> Self {
        Self {
            revnum,
            ..self.clone()
        }
    }

    /// Repository instance id.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Branch path, `""` for the repository root.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Revision number.
    #[must_use]
    pub const fn revnum(&self) -> u64 {
        self.revnum
    }

    /// Encoding generation.
    #[must_use]
    pub const fn version(&self) -> MappingVersion {
        self.version
    }

    /// Branching-scheme name, if the id carries one.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Order two revisions of the same branch by revision number.
    ///
    /// Returns `None` for ids of different repositories or branches; no
    /// cross-branch order is defined.
    #[must_use]
    pub fn revision_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.uuid == other.uuid && self.branch == other.branch)
            .then(|| self.revnum.cmp(&other.revnum))
    }

    /// Render the wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        let tag = match self.version {
            MappingVersion::V1 => "svn-v1".to_owned(),
            MappingVersion::V2 => "svn-v2".to_owned(),
            MappingVersion::V3 => format!(
                "svn-v3-{}",
                escape_path(self.scheme.as_deref().unwrap_or(UNDEFINED_SCHEME))
            ),
        };
        format!(
            "{tag}:{}@{}-{}",
            self.revnum,
            self.uuid,
            escape_path(&self.branch)
        )
    }

    /// Parse any supported wire form.
    ///
    /// # Errors
    /// Returns [`ParseError`] for an unrecognized prefix or a malformed body.
    pub fn decode(s: &str) -> Result<Self, ParseError> {
        let (version, scheme, body) = if let Some(body) = s.strip_prefix("svn-v1:") {
            (MappingVersion::V1, None, body)
        } else if let Some(body) = s.strip_prefix("svn-v2:") {
            (MappingVersion::V2, None, body)
        } else if let Some(rest) = s.strip_prefix("svn-v3-") {
            let (raw_scheme, body) = rest
                .split_once(':')
                .ok_or_else(|| ParseError::new(s, "missing ':' after scheme"))?;
            let scheme = unescape(raw_scheme).map_err(|reason| ParseError::new(s, reason))?;
            let scheme = (scheme != UNDEFINED_SCHEME).then_some(scheme);
            (MappingVersion::V3, scheme, body)
        } else {
            return Err(ParseError::new(s, "unrecognized prefix"));
        };

        let at = body
            .find('@')
            .ok_or_else(|| ParseError::new(s, "missing '@' after revision number"))?;
        let dash = body
            .rfind('-')
            .filter(|&d| d > at)
            .ok_or_else(|| ParseError::new(s, "missing '-' before branch path"))?;

        let digits = &body[..at];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::new(s, format!("bad revision number '{digits}'")));
        }
        let revnum = digits
            .parse::<u64>()
            .map_err(|e| ParseError::new(s, format!("bad revision number '{digits}': {e}")))?;

        let uuid = &body[at + 1..dash];
        if uuid.is_empty() {
            return Err(ParseError::new(s, "empty repository uuid"));
        }
        let branch = unescape(&body[dash + 1..]).map_err(|reason| ParseError::new(s, reason))?;

        Ok(Self {
            uuid: uuid.to_owned(),
            branch,
            revnum,
            version,
            scheme,
        })
    }
}

/// Encode `(uuid, branch, revnum)` at `version`.
#[must_use]
pub fn encode(uuid: &str, branch: &str, revnum: u64, version: MappingVersion) -> String {
    RevisionId::new(uuid, branch, revnum)
        .with_version(version)
        .encode()
}

/// Decode a wire-form revision id.
///
/// # Errors
/// See [`RevisionId::decode`].
pub fn decode(s: &str) -> Result<RevisionId, ParseError> {
    RevisionId::decode(s)
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for RevisionId {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl TryFrom<String> for RevisionId {
    type Error = ParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::decode(&s)
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.encode()
    }
}

// ---------------------------------------------------------------------------
// Path escaping
// ---------------------------------------------------------------------------

/// Percent-escape the characters the id encodings use as separators
/// (`%`, `-`, `:`, `@`) plus ASCII whitespace and control characters.
#[must_use]
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '%' | '-' | ':' | '@') || c.is_ascii_whitespace() || c.is_ascii_control()
        {
            // Writing to a String cannot fail.
            let _ = write!(out, "%{:02X}", u32::from(c));
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverse of [`escape_path`].
///
/// # Errors
/// Returns [`ParseError`] for a truncated or non-hex escape, or one that
/// decodes to invalid UTF-8.
pub fn unescape_path(s: &str) -> Result<String, ParseError> {
    unescape(s).map_err(|reason| ParseError::new(s, reason))
}

fn unescape(s: &str) -> Result<String, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                .ok_or_else(|| format!("bad escape at offset {i}"))?;
            let hi = hex_value(hex[0]);
            let lo = hex_value(hex[1]);
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| "escaped path is not valid UTF-8".to_owned())
}

const fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
