//! Shared test helpers for svnid CLI tests.
//!
//! Every test runs the binary inside its own temp directory, so config files
//! and snapshot caches never leak between tests.

#![allow(dead_code)]

use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

/// Repository uuid used by [`SAMPLE_DUMP`].
pub const UUID: &str = "6f1a3c2e-9b7d-4e55-a0c1-1d2e3f405162";

/// trunk with two entries, a branch copied from trunk, a delete on trunk.
pub const SAMPLE_DUMP: &str = r#"{
  "uuid": "6f1a3c2e-9b7d-4e55-a0c1-1d2e3f405162",
  "revisions": [
    {"revnum": 1, "changes": {"trunk": {"action": "A"}, "branches": {"action": "A"}}},
    {"revnum": 2, "changes": {"trunk/lib.rs": {"action": "A"}, "trunk/doc": {"action": "A"}}},
    {"revnum": 3, "changes": {"branches/stable": {"action": "A", "copyfrom_path": "trunk", "copyfrom_rev": 2}}},
    {"revnum": 4, "changes": {"trunk/doc": {"action": "D"}}}
  ]
}"#;

/// Temp directory holding `history.json` with [`SAMPLE_DUMP`].
pub fn setup_dump() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    std::fs::write(dir.path().join("history.json"), SAMPLE_DUMP).unwrap();
    dir
}

/// Run svnid with the given args in the given directory.
pub fn svnid_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_svnid"))
        .args(args)
        .current_dir(dir)
        .env("SVNID_LOG", "off")
        .output()
        .expect("failed to execute svnid")
}

/// Run svnid with `input` on stdin.
pub fn svnid_with_stdin(dir: &Path, args: &[&str], input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_svnid"))
        .args(args)
        .current_dir(dir)
        .env("SVNID_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn svnid");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().expect("failed to wait for svnid")
}

/// Parse successful svnid output as JSON.
pub fn parse_ok(args: &[&str], out: &Output) -> serde_json::Value {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "svnid {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    serde_json::from_str(&stdout).unwrap_or_else(|e| {
        panic!(
            "svnid {} printed invalid JSON ({e}):\n{stdout}",
            args.join(" ")
        )
    })
}

/// Run svnid and assert it succeeds. Returns stdout parsed as JSON.
pub fn svnid_json(dir: &Path, args: &[&str]) -> serde_json::Value {
    parse_ok(args, &svnid_in(dir, args))
}

/// Run svnid and assert it fails. Returns stderr as string.
pub fn svnid_fails(dir: &Path, args: &[&str]) -> String {
    let out = svnid_in(dir, args);
    assert!(
        !out.status.success(),
        "Expected svnid {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}
