//! Binary smoke tests. None of these reach the network.

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("lab-decoder").unwrap();
    cmd.env_remove("GROQ_API_KEY")
        .env_remove("LAB_DECODER_PROVIDER")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_describes_tool() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("lab report"))
        .stdout(contains("--api-key"))
        .stdout(contains("GROQ_API_KEY"));
}

#[test]
fn no_arguments_prints_usage() {
    cmd().assert().failure().stderr(contains("Usage"));
}

#[test]
fn missing_key_names_variable() {
    cmd()
        .arg("report.pdf")
        .assert()
        .failure()
        .stderr(contains("API key missing"))
        .stderr(contains("GROQ_API_KEY"));
}

#[test]
fn unsupported_extension_rejected_before_network() {
    cmd()
        .env("GROQ_API_KEY", "gsk_test")
        .arg("notes.txt")
        .assert()
        .failure()
        .stderr(contains("Unsupported file type 'notes.txt'"));
}

#[test]
fn missing_file_reported() {
    cmd()
        .env("GROQ_API_KEY", "gsk_test")
        .arg("/definitely/not/here/cbc.png")
        .assert()
        .failure()
        .stderr(contains("not found"));
}

#[test]
fn json_mode_skips_disclaimer() {
    cmd()
        .args(["--json", "report.pdf"])
        .assert()
        .failure()
        .stderr(contains("Medical Disclaimer").not());
}

#[test]
fn max_pixels_range_enforced() {
    cmd()
        .args(["--max-pixels", "5", "report.pdf"])
        .assert()
        .failure()
        .stderr(contains("max-pixels"));
}
