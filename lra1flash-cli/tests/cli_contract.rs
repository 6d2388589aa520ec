//! End-to-end contract tests for the `lra1flash` binary.
//!
//! These run the compiled binary and check argument handling and error
//! surfaces that need no serial hardware.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn lra1flash() -> Command {
    Command::cargo_bin("lra1flash").expect("binary should build")
}

#[test]
fn help_prints_usage() {
    lra1flash()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn version_prints_and_exits_zero() {
    lra1flash()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lra1flash"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    lra1flash().arg("frobnicate").assert().code(2);
}

#[test]
fn update_requires_a_firmware_path() {
    lra1flash().arg("update").assert().code(2);
}

#[test]
fn update_with_missing_file_fails_before_opening_the_port() {
    lra1flash()
        .args(["update", "/nonexistent/firmware.bin", "--port", "/dev/null"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("firmware"));
}

#[test]
fn undersized_firmware_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 100]).unwrap();
    file.flush().unwrap();

    lra1flash()
        .args(["update"])
        .arg(file.path())
        .args(["--port", "/dev/null"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("size"));
}

#[test]
fn init_without_a_port_names_the_flag() {
    lra1flash()
        .arg("init")
        .env_remove("LRA1FLASH_PORT")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--port"));
}

#[test]
fn list_ports_json_emits_a_json_array() {
    let output = lra1flash()
        .args(["list-ports", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value =
        serde_json::from_slice(&output).expect("output should be valid JSON");
    assert!(parsed.is_array());
}

#[test]
fn completions_generate_a_bash_script() {
    lra1flash()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lra1flash"));
}
