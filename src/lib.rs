//! svnid library crate: configuration, history dumps and telemetry for the
//! `svnid` binary.
//!
//! The projection engine itself lives in [`svnid_core`], re-exported here so
//! integration tests and benches can reach everything through one crate.

pub mod config;
pub mod dump;
pub mod telemetry;

pub use svnid_core;
