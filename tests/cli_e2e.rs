//! End-to-end CLI tests for the docsync binary.

use assert_cmd::Command;
use predicates::prelude::*;

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("docsync").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Retrieve documents"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("docsync").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("docsync"));
}

/// Test that a missing configuration directory fails fast with a
/// readable error instead of hanging or panicking.
#[test]
fn test_binary_missing_config_fails_with_readable_error() {
    let temp = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("docsync").unwrap();
    cmd.current_dir(temp.path())
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("settings.json"));
}

/// Test that an invalid site config is rejected at startup.
#[test]
fn test_binary_rejects_invalid_site_config() {
    let temp = tempfile::tempdir().unwrap();
    let config_dir = temp.path().join("config");
    std::fs::create_dir_all(config_dir.join("sites")).unwrap();

    std::fs::write(
        config_dir.join("settings.json"),
        r#"{
            "cloud_storage": {
                "default_provider": "drive",
                "credentials_path": "credentials.json",
                "root_folder_name": "Docs"
            },
            "download": {}
        }"#,
    )
    .unwrap();
    std::fs::write(
        config_dir.join("departments.json"),
        r#"{ "departments": [] }"#,
    )
    .unwrap();
    // min_size above max_size violates the validation invariant
    std::fs::write(
        config_dir.join("sites").join("bad_site.json"),
        r#"{
            "site_info": { "name": "bad_site", "base_url": "https://example.com" },
            "navigation": { "start_url": "/docs/", "document_list_selector": "a" },
            "extraction": { "selectors": { "document_links": "a" } },
            "download": {
                "button_selector": "a.export",
                "expected_file_types": [".docx"],
                "validation": { "min_size": 100, "max_size": 50 }
            }
        }"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("docsync").unwrap();
    cmd.current_dir(temp.path())
        .args(["--quiet", "--site", "bad_site"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_size"));
}
