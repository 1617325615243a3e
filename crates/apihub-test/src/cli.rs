//! CLI regression tests for the `apihub-ingest` binary.
//!
//! These tests invoke the binary as a subprocess to catch regressions in flag
//! names, exit codes and output formats.
//!
//! Run with: `cargo test -p apihub-test`
//! Requires the `apihub-ingest` binary to be built first (`cargo build -p apihub-cli`).

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

use crate::fixture::{BuildFixture, FixtureFiles};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns an assert_cmd Command wrapping the `apihub-ingest` binary.
fn apihub() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("apihub-ingest")
        .expect("apihub-ingest binary not found, run `cargo build -p apihub-cli` first");
    cmd.env_remove("RUST_LOG").env("APIHUB_LOG_LEVEL", "warn");
    cmd
}

fn written(fixture: BuildFixture) -> FixtureFiles {
    fixture.write().expect("fixture")
}

/// `<subcommand> --config .. --result .. [--catalog ..]`
fn with_inputs(subcommand: &str, files: &FixtureFiles) -> Command {
    let mut cmd = apihub();
    cmd.arg(subcommand)
        .arg("--config")
        .arg(&files.config)
        .arg("--result")
        .arg(&files.result);
    if let Some(catalog) = &files.catalog {
        cmd.arg("--catalog").arg(catalog);
    }
    cmd
}

// ---------------------------------------------------------------------------
// apihub-ingest validate
// ---------------------------------------------------------------------------

#[test]
fn validate_valid_build_exits_zero() {
    let files = written(BuildFixture::rest_release());
    with_inputs("validate", &files)
        .assert()
        .success()
        .stdout(contains("\"valid\": true"))
        .stdout(contains("\"buildType\": \"build\""));
}

#[test]
fn validate_with_sources_exits_zero() {
    let files = written(BuildFixture::rest_release());
    with_inputs("validate", &files)
        .arg("--sources")
        .arg(&files.sources)
        .assert()
        .success()
        .stdout(contains("\"sourcesChecked\": true"));
}

#[test]
fn validate_unexpected_source_file_exits_one() {
    let files = written(BuildFixture::rest_release().with_extra_source("notes.txt"));
    with_inputs("validate", &files)
        .arg("--sources")
        .arg(&files.sources)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("FileRedundant"))
        .stderr(contains("notes.txt"));
}

#[test]
fn validate_group_with_documents_exits_one() {
    let files = written(BuildFixture::rest_release().with_info(|info| {
        info.kind = "group".to_string();
    }));
    with_inputs("validate", &files)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("InvalidPackagedFile"));
}

#[test]
fn validate_config_file_missing_from_package_exits_one() {
    let files = written(BuildFixture::rest_release().with_config(|config| {
        config.files.push(apihub_ingest::BuildConfigFile {
            file_id: "asyncapi.yaml".to_string(),
            ..Default::default()
        });
    }));
    with_inputs("validate", &files)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("DocumentMissingFromPackage"))
        .stderr(contains("asyncapi.yaml"));
}

#[test]
fn validate_status_discrepancy_exits_one() {
    let files = written(BuildFixture::rest_release().with_config(|config| {
        config.status = "draft".to_string();
    }));
    with_inputs("validate", &files)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("PackageForBuildConfigDiscrepancy"));
}

#[test]
fn validate_without_previous_version_in_catalog_exits_one() {
    let files = written(BuildFixture::rest_release().without_catalog());
    with_inputs("validate", &files)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("PublishedVersionRevisionNotFound"));
}

#[test]
fn validate_unknown_build_type_exits_one() {
    let files = written(BuildFixture::rest_release().with_info(|info| {
        info.build_type = "deploy".to_string();
    }));
    with_inputs("validate", &files)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("deploy"));
}

#[test]
fn validate_missing_config_exits_three() {
    let files = written(BuildFixture::rest_release());
    apihub()
        .args(["validate", "--config"])
        .arg(files.dir().join("nope.json"))
        .arg("--result")
        .arg(&files.result)
        .assert()
        .failure()
        .code(3)
        .stderr(contains("failed to read build config"));
}

#[test]
fn validate_malformed_catalog_exits_two() {
    let files = written(BuildFixture::rest_release());
    let catalog = files.dir().join("broken-catalog.json");
    std::fs::write(&catalog, "{ not json").expect("write catalog");

    apihub()
        .args(["validate", "--config"])
        .arg(&files.config)
        .arg("--result")
        .arg(&files.result)
        .arg("--catalog")
        .arg(&catalog)
        .assert()
        .failure()
        .code(2)
        .stderr(contains("catalog lookup failed"));
}

#[test]
fn validate_missing_required_args_fails() {
    apihub().arg("validate").assert().failure();
}

// ---------------------------------------------------------------------------
// apihub-ingest ingest
// ---------------------------------------------------------------------------

#[test]
fn ingest_prints_entities_to_stdout() {
    let files = written(BuildFixture::rest_release());
    with_inputs("ingest", &files)
        .assert()
        .success()
        .stdout(contains("\"packageId\": \"pets\""))
        .stdout(contains("\"operationId\": \"get-pets\""))
        .stdout(contains("\"buildId\": \"publish-42\""));
}

#[test]
fn ingest_writes_output_file() {
    let files = written(BuildFixture::rest_release());
    let out = TempDir::new().expect("temp dir");
    let output = out.path().join("entities.json");

    with_inputs("ingest", &files)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(contains("ingested 1 document(s), 1 operation(s), 1 comparison(s)"));

    let content = std::fs::read_to_string(&output).expect("output file");
    let value: serde_json::Value = serde_json::from_str(&content).expect("entities JSON");
    assert_eq!(value["documents"][0]["slug"], "openapi-yaml");
    assert_eq!(value["versionComparisons"][0]["previousVersion"], "1.0");
}

#[test]
fn ingest_is_deterministic() {
    let files = written(BuildFixture::rest_release());
    let first = with_inputs("ingest", &files).output().expect("run apihub-ingest");
    let second = with_inputs("ingest", &files).output().expect("run apihub-ingest");
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn ingest_rejects_oversized_entries() {
    let files = written(BuildFixture::rest_release());
    with_inputs("ingest", &files)
        .args(["--max-entry-size", "8"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn ingest_empty_package_exits_one() {
    let files = written(BuildFixture::rest_release().without_documents());
    with_inputs("ingest", &files)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("EmptyDataForPublish"));
}

// ---------------------------------------------------------------------------
// apihub-ingest inspect
// ---------------------------------------------------------------------------

#[test]
fn inspect_lists_slots_and_buckets() {
    let files = written(BuildFixture::rest_release());
    apihub()
        .args(["inspect", "--result"])
        .arg(&files.result)
        .assert()
        .success()
        .stdout(contains("info.json"))
        .stdout(contains("openapi.yaml"))
        .stdout(contains("get-pets"))
        .stdout(contains("pets-2.0.json"));
}

#[test]
fn inspect_non_zip_exits_one() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("garbage.zip");
    std::fs::write(&path, b"definitely not a zip archive").expect("write garbage");

    apihub()
        .args(["inspect", "--result"])
        .arg(&path)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_log_format_exits_three() {
    let files = written(BuildFixture::rest_release());
    apihub()
        .args(["--log-format", "xml", "inspect", "--result"])
        .arg(&files.result)
        .assert()
        .failure()
        .code(3)
        .stderr(contains("invalid log format"));
}
