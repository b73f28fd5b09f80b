use std::io::BufRead as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use svnid::config::{CONFIG_FILE, SchemeConfig, SchemeKind, SvnidConfig};
use svnid::dump::HistoryDump;
use svnid::svnid_core::cache::{FileCache, IdMapCache, MemoryCache};
use svnid::svnid_core::engine::ProjectionEngine;
use svnid::svnid_core::revid::{MappingVersion, RevisionId};
use svnid::svnid_core::upgrade::{
    RevisionMetadata, check_revision_changed, generate_upgrade_map, upgraded_revision_id,
};
use svnid::telemetry;

/// Stable object identities for path-addressed revision history
///
/// Replays a repository's changed-path log and reports, for every live path
/// of a branch at a revision, the stable identifier of the object there and
/// the revision that last touched it.
///
/// QUICK START:
///
///   svnid project --history dump.json --branch trunk --revision 42
///   svnid decode svn-v3-trunk0:42@<uuid>-trunk
///
/// Settings are read from .svnid.toml in the working directory; flags
/// override them. Set SVNID_LOG=json for machine-readable logs.
#[derive(Parser)]
#[command(name = "svnid")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'svnid <command> --help' for more information on a specific command.")]
struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project the path state of a branch at a revision
    Project(ProjectArgs),

    /// Encode a revision id
    Encode(EncodeArgs),

    /// Decode a revision id
    Decode {
        /// Encoded revision id
        id: String,
    },

    /// Map legacy revision ids to the current mapping version
    ///
    /// Reads ids from the arguments, or one per line from stdin if none are
    /// given. Ids that are not revision ids, or are already current, are
    /// left out of the map.
    UpgradeMap {
        /// Revision ids to upgrade
        ids: Vec<String>,
    },

    /// Check that an upgraded revision describes the same commit
    ///
    /// Compares two revision metadata JSON files, ignoring revision ids.
    CheckUpgrade {
        /// Metadata of the original revision
        old: PathBuf,
        /// Metadata of the upgraded revision
        new: PathBuf,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// JSON history dump
    #[arg(long)]
    history: PathBuf,

    /// Branch path (e.g. trunk, branches/foo; empty for the repository root)
    #[arg(long, default_value = "")]
    branch: String,

    /// Target revision
    #[arg(long)]
    revision: u64,

    /// Branching scheme (overrides config)
    #[arg(long, value_enum)]
    scheme: Option<SchemeKind>,

    /// Project directories above trunk/branches/tags (overrides config)
    #[arg(long)]
    level: Option<usize>,

    /// Snapshot cache directory (overrides config)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Do not read or write the snapshot cache
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct EncodeArgs {
    /// Repository uuid
    #[arg(long)]
    uuid: String,

    /// Branch path
    #[arg(long, default_value = "")]
    branch: String,

    /// Revision number
    #[arg(long)]
    revision: u64,

    /// Mapping version (1, 2 or 3)
    #[arg(long, default_value_t = MappingVersion::CURRENT.number())]
    mapping_version: u32,

    /// Branching-scheme name to embed (v3 only)
    #[arg(long)]
    scheme_name: Option<String>,
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Project(args) => {
            let config = SvnidConfig::load(&cli.config)?;
            project(&args, &config)
        }
        Commands::Encode(args) => encode(&args),
        Commands::Decode { id } => decode(&id),
        Commands::UpgradeMap { ids } => upgrade_map(ids),
        Commands::CheckUpgrade { old, new } => check_upgrade(&old, &new),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn project(args: &ProjectArgs, config: &SvnidConfig) -> Result<()> {
    let dump = HistoryDump::load(&args.history)?;
    let history = dump.to_history()?;

    let scheme = SchemeConfig {
        kind: args.scheme.unwrap_or(config.scheme.kind),
        level: args.level.unwrap_or(config.scheme.level),
    }
    .build();
    let branch = args.branch.trim_matches('/');
    if !scheme.is_branch_root(branch) {
        bail!(
            "'{branch}' is not a branch root under scheme {}",
            scheme.name()
        );
    }

    let cache: Arc<dyn IdMapCache> =
        if args.no_cache || !(config.cache.enabled || args.cache_dir.is_some()) {
            Arc::new(MemoryCache::new())
        } else {
            let dir = args.cache_dir.as_ref().unwrap_or(&config.cache.dir);
            Arc::new(FileCache::new(dir))
        };

    let engine = ProjectionEngine::new(dump.uuid.as_str(), Arc::new(history), scheme, cache);
    let projection = engine
        .project(branch, args.revision)
        .with_context(|| format!("projecting '{branch}' at r{}", args.revision))?;

    print_json(&json!({
        "revision": engine.revision_id(branch, args.revision),
        "paths": projection.state,
        "warnings": projection.warnings,
    }))
}

fn encode(args: &EncodeArgs) -> Result<()> {
    let version = MappingVersion::from_number(args.mapping_version)
        .ok_or_else(|| anyhow!("unknown mapping version {}", args.mapping_version))?;
    let mut id =
        RevisionId::new(args.uuid.as_str(), args.branch.as_str(), args.revision).with_version(version);
    if let Some(name) = &args.scheme_name {
        if version != MappingVersion::V3 {
            bail!("scheme names are only encoded by mapping version 3");
        }
        id = id.with_scheme(name.as_str());
    }
    print_json(&json!({ "revision_id": id.encode() }))
}

fn decode(encoded: &str) -> Result<()> {
    let id = RevisionId::decode(encoded)?;
    print_json(&json!({
        "uuid": id.uuid(),
        "branch": id.branch(),
        "revnum": id.revnum(),
        "version": id.version().number(),
        "scheme": id.scheme(),
    }))
}

fn upgrade_map(ids: Vec<String>) -> Result<()> {
    let ids = if ids.is_empty() {
        std::io::stdin()
            .lock()
            .lines()
            .map(|line| line.map(|l| l.trim().to_owned()))
            .filter(|line| !matches!(line, Ok(l) if l.is_empty()))
            .collect::<Result<Vec<_>, _>>()
            .context("reading revision ids from stdin")?
    } else {
        ids
    };

    let map: serde_json::Map<String, serde_json::Value> = generate_upgrade_map(&ids)
        .into_iter()
        .map(|(old, new)| {
            let entry = json!({
                "mapped": new,
                "rewritten": upgraded_revision_id(&old),
            });
            (old, entry)
        })
        .collect();
    print_json(&serde_json::Value::Object(map))
}

fn check_upgrade(old: &Path, new: &Path) -> Result<()> {
    let read = |path: &Path| -> Result<RevisionMetadata> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    };
    check_revision_changed(&read(old)?, &read(new)?)?;
    print_json(&json!({ "unchanged": true }))
}
