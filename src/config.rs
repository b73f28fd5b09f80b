//! Projection configuration (`.svnid.toml`).
//!
//! ```toml
//! [scheme]
//! kind = "trunk"   # "trunk" | "none"
//! level = 0
//!
//! [cache]
//! enabled = true
//! dir = ".svnid/idmap"
//! ```
//!
//! Every field is optional; a missing file means all defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use svnid_core::scheme::{BranchScheme, NoBranchingScheme, TrunkScheme};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".svnid.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvnidConfig {
    /// Branching scheme.
    #[serde(default)]
    pub scheme: SchemeConfig,

    /// Identifier-map cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

// ---------------------------------------------------------------------------
// SchemeConfig
// ---------------------------------------------------------------------------

/// Which branching scheme the repository follows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemeConfig {
    /// Scheme family (default: `trunk`).
    #[serde(default)]
    pub kind: SchemeKind,

    /// Leading project directories for the `trunk` family (default: 0).
    #[serde(default)]
    pub level: usize,
}

impl SchemeConfig {
    /// Build the configured scheme.
    #[must_use]
    pub fn build(&self) -> Arc<dyn BranchScheme> {
        match self.kind {
            SchemeKind::Trunk => Arc::new(TrunkScheme::new(self.level)),
            SchemeKind::None => Arc::new(NoBranchingScheme),
        }
    }
}

/// Scheme family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    /// `trunk`, `branches/*`, `tags/*`.
    #[default]
    Trunk,
    /// The whole repository is one branch.
    None,
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trunk => write!(f, "trunk"),
            Self::None => write!(f, "none"),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// On-disk identifier-map cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Persist snapshots between runs (default: true).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Snapshot directory, relative to the working directory
    /// (default: `.svnid/idmap`).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: default_cache_dir(),
        }
    }
}

const fn default_cache_enabled() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".svnid/idmap")
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading or parsing a config file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl SvnidConfig {
    /// Load configuration from a TOML file; a missing file yields defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found), invalid
    /// TOML, or unknown fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
