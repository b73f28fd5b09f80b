//! Telemetry initialization.
//!
//! Controlled by `SVNID_LOG`:
//! - unset or empty → human-readable events to stderr
//! - `"json"` → JSON spans/events to stderr
//! - `"off"` → no subscriber installed
//!
//! The level filter comes from `RUST_LOG` (default `warn`).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the output format.
pub const LOG_ENV: &str = "SVNID_LOG";

/// Output format picked from [`LOG_ENV`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
    /// Nothing.
    Off,
}

impl LogFormat {
    /// Interpret a [`LOG_ENV`] value. Unknown values fall back to `Pretty`.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("json") => Self::Json,
            Some("off") => Self::Off,
            _ => Self::Pretty,
        }
    }
}

/// Initialize telemetry from the environment.
///
/// Call once, early in `main`.
pub fn init() {
    let value = std::env::var(LOG_ENV).ok();
    match LogFormat::from_env_value(value.as_deref()) {
        LogFormat::Off => {}
        LogFormat::Pretty => init_pretty(),
        LogFormat::Json => init_json(),
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_pretty() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// JSON spans/events to stderr via tracing-subscriber's JSON formatter.
fn init_json() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .init();
}
