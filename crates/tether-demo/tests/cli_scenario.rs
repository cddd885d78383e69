//! Runs the demo binary end to end.

use assert_cmd::Command;
use predicates::prelude::*;

fn demo() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tether-demo"));
    cmd.env("TETHER_LOG", "off");
    cmd
}

fn json_report(args: &[&str]) -> serde_json::Value {
    let output = demo()
        .args(args)
        .arg("--json")
        .output()
        .expect("binary runs");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("stdout is a JSON report")
}

#[test]
fn confirmed_tagline_edit() {
    let report = json_report(&["--tagline", "Poet of numbers"]);
    assert_eq!(report["outcome"]["status"], "confirmed");
    assert_eq!(report["settled"]["tagline"], "Poet of numbers");
    assert_eq!(report["settled"]["editing"], false);
    assert_eq!(report["phase"], "confirmed");
    assert_eq!(report["description"], "Update tagline");
}

#[test]
fn fail_in_watched_field_is_reverted() {
    let report = json_report(&["--tagline", "fail"]);
    assert_eq!(report["outcome"]["status"], "rejected");
    assert_eq!(report["speculative"]["tagline"], "fail");
    assert_eq!(report["settled"]["tagline"], "Analyst of engines");
    assert_eq!(report["phase"], "failed");
    assert!(report["persisted"].is_null());
}

#[test]
fn fail_in_other_field_is_accepted() {
    let report = json_report(&["--name", "fail", "--reject-field", "bio"]);
    assert_eq!(report["outcome"]["status"], "confirmed");
    assert_eq!(report["settled"]["name"], "fail");
}

#[test]
fn destroyed_scope_is_not_mutated() {
    let report = json_report(&["--bio", "Late", "--destroy-before-settle"]);
    assert_eq!(report["outcome"]["status"], "detached");
    assert!(report["settled"].is_null());
    assert_eq!(report["persisted"]["bio"], "Late");
}

#[test]
fn fail_on_reject_sets_exit_code() {
    demo()
        .args(["--tagline", "fail", "--fail-on-reject"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("rejected"));
}

#[test]
fn empty_patch_is_usage_error() {
    demo()
        .assert()
        .code(64)
        .stderr(predicate::str::contains("nothing to submit"));
}

#[test]
fn text_report_lists_renders() {
    demo()
        .args(["--tagline", "Poet of numbers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("confirmed"))
        .stdout(predicate::str::contains("render:      Ada Lovelace: Poet of numbers (saving)"));
}

#[test]
fn json_logs_go_to_stderr() {
    demo()
        .env("TETHER_LOG", "info")
        .args(["--tagline", "fail", "--log-format", "json", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("update.rejected"))
        .stdout(predicate::str::contains("\"status\": \"rejected\""));
}
