//! Config command tests.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

/// Test: config path honors VIGIL_HOME.
#[test]
fn test_config_path_uses_home() {
    let temp = tempdir().unwrap();

    Command::cargo_bin("vigil")
        .unwrap()
        .env("VIGIL_HOME", temp.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(temp.path().to_str().unwrap()))
        .stdout(predicate::str::contains("config.toml"));
}

/// Test: config init creates the template once and refuses to overwrite.
#[test]
fn test_config_init_creates_file() {
    let temp = tempdir().unwrap();

    Command::cargo_bin("vigil")
        .unwrap()
        .env("VIGIL_HOME", temp.path())
        .args(["config", "init"])
        .assert()
        .success();

    let config_path = temp.path().join("config.toml");
    assert!(config_path.exists());
    let contents = std::fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("# Vigil Configuration"));
    assert!(contents.contains("server_url"));

    Command::cargo_bin("vigil")
        .unwrap()
        .env("VIGIL_HOME", temp.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
