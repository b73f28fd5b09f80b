//! Integration tests for the `svnid` binary.

mod common;

use common::{UUID, parse_ok, setup_dump, svnid_fails, svnid_in, svnid_json, svnid_with_stdin};

fn project(dir: &std::path::Path, extra: &[&str]) -> serde_json::Value {
    let mut args = vec!["project", "--history", "history.json"];
    args.extend_from_slice(extra);
    svnid_json(dir, &args)
}

fn path_keys(out: &serde_json::Value) -> Vec<String> {
    out["paths"].as_object().unwrap().keys().cloned().collect()
}

// ---------------------------------------------------------------------------
// project
// ---------------------------------------------------------------------------

#[test]
fn project_trunk_after_delete() {
    let dir = setup_dump();
    let out = project(dir.path(), &["--branch", "trunk", "--revision", "4"]);

    assert_eq!(
        out["revision"].as_str().unwrap(),
        format!("svn-v3-trunk0:4@{UUID}-trunk")
    );
    assert_eq!(path_keys(&out), vec!["", "lib.rs"]);
    assert_eq!(
        out["paths"][""]["last_touched"].as_str().unwrap(),
        format!("svn-v3-trunk0:4@{UUID}-trunk")
    );
    assert!(out["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn branch_inherits_trunk_identities() {
    let dir = setup_dump();
    let trunk = project(dir.path(), &["--branch", "trunk", "--revision", "4"]);
    let stable = project(dir.path(), &["--branch", "branches/stable", "--revision", "4"]);

    assert_eq!(path_keys(&stable), vec!["", "doc", "lib.rs"]);
    assert_eq!(
        stable["paths"]["lib.rs"]["object_id"],
        trunk["paths"]["lib.rs"]["object_id"]
    );
    assert_eq!(stable["paths"][""]["object_id"], trunk["paths"][""]["object_id"]);
}

#[test]
fn whole_repository_scheme_copies_get_new_identities() {
    let dir = setup_dump();
    let out = project(
        dir.path(),
        &["--scheme", "none", "--branch", "", "--revision", "4"],
    );
    let keys = path_keys(&out);
    assert!(keys.contains(&"branches/stable/doc".to_owned()));
    assert!(!keys.contains(&"trunk/doc".to_owned()));
    assert_ne!(
        out["paths"]["branches/stable/lib.rs"]["object_id"],
        out["paths"]["trunk/lib.rs"]["object_id"]
    );
}

#[test]
fn project_writes_snapshot_cache() {
    let dir = setup_dump();
    project(dir.path(), &["--branch", "trunk", "--revision", "2"]);
    let cache_dir = dir.path().join(".svnid").join("idmap");
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 1);

    let first = project(dir.path(), &["--branch", "trunk", "--revision", "4"]);
    let again = project(dir.path(), &["--branch", "trunk", "--revision", "4"]);
    assert_eq!(first, again);
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 2);
}

#[test]
fn no_cache_leaves_no_files() {
    let dir = setup_dump();
    project(
        dir.path(),
        &["--branch", "trunk", "--revision", "4", "--no-cache"],
    );
    assert!(!dir.path().join(".svnid").exists());
}

#[test]
fn custom_cache_dir() {
    let dir = setup_dump();
    project(
        dir.path(),
        &["--branch", "trunk", "--revision", "4", "--cache-dir", "ids"],
    );
    assert!(dir.path().join("ids").is_dir());
}

#[test]
fn config_file_selects_scheme() {
    let dir = setup_dump();
    std::fs::write(
        dir.path().join(".svnid.toml"),
        "[scheme]\nkind = \"none\"\n\n[cache]\nenabled = false\n",
    )
    .unwrap();
    let out = project(dir.path(), &["--revision", "1"]);
    assert_eq!(path_keys(&out), vec!["", "branches", "trunk"]);
    assert!(!dir.path().join(".svnid").exists());
}

#[test]
fn invalid_config_fails() {
    let dir = setup_dump();
    std::fs::write(dir.path().join(".svnid.toml"), "[scheme]\nflavor = 1\n").unwrap();
    let stderr = svnid_fails(
        dir.path(),
        &["project", "--history", "history.json", "--branch", "trunk", "--revision", "1"],
    );
    assert!(stderr.contains(".svnid.toml"), "{stderr}");
}

#[test]
fn non_branch_path_is_rejected() {
    let dir = setup_dump();
    let stderr = svnid_fails(
        dir.path(),
        &["project", "--history", "history.json", "--branch", "docs", "--revision", "1"],
    );
    assert!(stderr.contains("not a branch root"), "{stderr}");
}

#[test]
fn future_revision_fails() {
    let dir = setup_dump();
    let stderr = svnid_fails(
        dir.path(),
        &["project", "--history", "history.json", "--branch", "trunk", "--revision", "9"],
    );
    assert!(stderr.contains("r9"), "{stderr}");
}

#[test]
fn inconsistent_history_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("history.json"),
        r#"{"uuid": "u", "revisions": [
            {"revnum": 1, "changes": {"trunk": {"action": "A"}}},
            {"revnum": 2, "changes": {"trunk/ghost": {"action": "M"}}}
        ]}"#,
    )
    .unwrap();
    let stderr = svnid_fails(
        dir.path(),
        &["project", "--history", "history.json", "--branch", "trunk", "--revision", "2"],
    );
    assert!(stderr.contains("modify of absent path"), "{stderr}");
}

#[test]
fn missing_dump_fails() {
    let dir = tempfile::tempdir().unwrap();
    let stderr = svnid_fails(
        dir.path(),
        &["project", "--history", "nope.json", "--revision", "1"],
    );
    assert!(stderr.contains("nope.json"), "{stderr}");
}

// ---------------------------------------------------------------------------
// encode / decode
// ---------------------------------------------------------------------------

#[test]
fn encode_all_versions() {
    let dir = tempfile::tempdir().unwrap();
    let base = ["encode", "--uuid", "u", "--branch", "trunk", "--revision", "5"];
    let cases = [
        (vec![], "svn-v3-undefined:5@u-trunk"),
        (vec!["--scheme-name", "trunk0"], "svn-v3-trunk0:5@u-trunk"),
        (vec!["--mapping-version", "2"], "svn-v2:5@u-trunk"),
        (vec!["--mapping-version", "1"], "svn-v1:5@u-trunk"),
    ];
    for (extra, expected) in cases {
        let mut args = base.to_vec();
        args.extend(extra);
        let out = svnid_json(dir.path(), &args);
        assert_eq!(out["revision_id"].as_str().unwrap(), expected);
    }
}

#[test]
fn encode_rejects_scheme_on_legacy_version() {
    let dir = tempfile::tempdir().unwrap();
    svnid_fails(
        dir.path(),
        &[
            "encode", "--uuid", "u", "--revision", "1", "--mapping-version", "1",
            "--scheme-name", "trunk0",
        ],
    );
    svnid_fails(
        dir.path(),
        &["encode", "--uuid", "u", "--revision", "1", "--mapping-version", "7"],
    );
}

#[test]
fn decode_reports_fields() {
    let dir = tempfile::tempdir().unwrap();
    let out = svnid_json(dir.path(), &["decode", "svn-v3-trunk1:12@u-proj/branches/a%2Db"]);
    assert_eq!(out["uuid"], "u");
    assert_eq!(out["branch"], "proj/branches/a-b");
    assert_eq!(out["revnum"], 12);
    assert_eq!(out["version"], 3);
    assert_eq!(out["scheme"], "trunk1");

    let legacy = svnid_json(dir.path(), &["decode", "svn-v1:3@u-trunk"]);
    assert!(legacy["scheme"].is_null());
}

#[test]
fn decode_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let stderr = svnid_fails(dir.path(), &["decode", "svn-v1:x@u-trunk"]);
    assert!(stderr.contains("revision number"), "{stderr}");
}

// ---------------------------------------------------------------------------
// upgrade-map / check-upgrade
// ---------------------------------------------------------------------------

#[test]
fn upgrade_map_from_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let out = svnid_json(
        dir.path(),
        &["upgrade-map", "svn-v1:5@u-trunk", "not-a-revision-id"],
    );
    let map = out.as_object().unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map["svn-v1:5@u-trunk"]["mapped"], "svn-v3-trunk0:5@u-trunk");
    assert_eq!(
        map["svn-v1:5@u-trunk"]["rewritten"],
        "svn-v1:5@u-trunk-svn3-upgrade"
    );
}

#[test]
fn upgrade_map_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let args = ["upgrade-map"];
    let out = svnid_with_stdin(
        dir.path(),
        &args,
        "svn-v2:1@u-branches/x\n\nsvn-v3-undefined:2@u-\n",
    );
    let out = parse_ok(&args, &out);
    assert_eq!(out["svn-v2:1@u-branches/x"]["mapped"], "svn-v3-trunk0:1@u-branches/x");
    assert_eq!(out["svn-v3-undefined:2@u-"]["mapped"], "svn-v3-none:2@u-");
}

#[test]
fn check_upgrade_compares_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let old = r#"{"revision_id": "svn-v1:1@u-trunk", "timestamp": 10, "message": "m"}"#;
    let same = r#"{"revision_id": "svn-v3-trunk0:1@u-trunk", "timestamp": 10, "message": "m"}"#;
    let changed = r#"{"revision_id": "svn-v3-trunk0:1@u-trunk", "timestamp": 11, "message": "m"}"#;
    std::fs::write(dir.path().join("old.json"), old).unwrap();
    std::fs::write(dir.path().join("same.json"), same).unwrap();
    std::fs::write(dir.path().join("changed.json"), changed).unwrap();

    let out = svnid_json(dir.path(), &["check-upgrade", "old.json", "same.json"]);
    assert_eq!(out["unchanged"], true);

    let stderr = svnid_fails(dir.path(), &["check-upgrade", "old.json", "changed.json"]);
    assert!(stderr.contains("timestamp"), "{stderr}");
}

#[test]
fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let out = svnid_in(dir.path(), &["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for cmd in ["project", "encode", "decode", "upgrade-map", "check-upgrade"] {
        assert!(stdout.contains(cmd), "missing {cmd}");
    }
}
