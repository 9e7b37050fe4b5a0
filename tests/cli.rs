//! CLI tests for the trace-shaper binary
//!
//! Everything runs with `--dry-run`, so tc commands are logged to stdout
//! instead of executed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Helper function to create a command instance for the trace-shaper binary
fn cli_command() -> Command {
    let mut cmd = Command::cargo_bin("trace-shaper").expect("Failed to find trace-shaper binary");
    cmd.env("RUST_LOG", "info");
    cmd.timeout(Duration::from_secs(20));
    cmd
}

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[test]
fn test_cli_help_and_version() {
    let mut cmd = cli_command();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Trace-driven tc link shaping"))
        .stdout(predicate::str::contains("--bandwidth"))
        .stdout(predicate::str::contains("--trace"))
        .stdout(predicate::str::contains("--isolated"));

    let mut cmd = cli_command();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("trace-shaper"));
}

#[test]
fn test_cli_rejects_unknown_flag() {
    let mut cmd = cli_command();
    cmd.arg("--jitter");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_cli_static_bandwidth_dry_run() {
    let mut cmd = cli_command();
    cmd.args(["--dry-run", "-d", "10", "-b", "5"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("/sbin/tc qdisc del dev lo root"))
        .stdout(predicate::str::contains(
            "/sbin/tc qdisc add dev lo root handle 1: prio",
        ))
        .stdout(predicate::str::contains(
            "/sbin/tc qdisc add dev lo parent 1:3 handle 30: tbf rate 5.000mbit latency 10ms burst 20000",
        ))
        .stdout(predicate::str::contains(
            "/sbin/tc filter add dev lo protocol ip parent 1:0 prio 3 u32 match ip sport 6212 0xffff flowid 1:3",
        ))
        .stdout(predicate::str::contains("qdisc change").not());
}

#[test]
fn test_cli_without_bandwidth_does_nothing() {
    let mut cmd = cli_command();
    cmd.arg("--dry-run");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("/sbin/tc").not());

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "-d", "0", "-b", "5"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("/sbin/tc").not());
}

#[test]
fn test_cli_trace_replay_inline() {
    let trace = temp_file("0 5\n0.05\t2.5\n");

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "-d", "20", "-t"]).arg(trace.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "qdisc add dev lo parent 1:3 handle 30: tbf rate 5.000mbit latency 20ms",
        ))
        .stdout(predicate::str::contains(
            "qdisc change dev lo parent 1:3 handle 30: tbf rate 2.500mbit latency 20ms",
        ));
}

#[test]
fn test_cli_malformed_trace_fails_before_tc() {
    let trace = temp_file("0 5\nnot a number\n");

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "-t"]).arg(trace.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Malformed trace line 2"))
        .stdout(predicate::str::contains("/sbin/tc").not());
}

#[test]
fn test_cli_isolated_child_replays_trace() {
    let trace = temp_file("0 6\n0.05 3\n");

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "--isolated", "-d", "15", "-t"])
        .arg(trace.path());
    cmd.assert()
        .success()
        // Parent installs the baseline
        .stdout(predicate::str::contains(
            "qdisc add dev lo parent 1:3 handle 30: tbf rate 6.000mbit latency 15ms",
        ))
        .stdout(predicate::str::contains("Running schedule in child"))
        // Child only changes the rate
        .stdout(predicate::str::contains(
            "qdisc change dev lo parent 1:3 handle 30: tbf rate 3.000mbit latency 15ms",
        ));
}

#[test]
fn test_cli_isolated_child_accepts_negative_bandwidth() {
    let trace = temp_file("0 6\n0.05 3\n");
    let config = temp_file(&format!(
        r#"{{ "bandwidth_mbit": -5, "trace_path": {:?} }}"#,
        trace.path()
    ));

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "--isolated", "-c"]).arg(config.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Running schedule in child"))
        .stdout(predicate::str::contains(
            "qdisc change dev lo parent 1:3 handle 30: tbf rate 3.000mbit",
        ));
}

#[test]
fn test_cli_skip_only_changes() {
    let trace = temp_file("0 4\n");

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "--skip", "-t"]).arg(trace.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("qdisc change"))
        .stdout(predicate::str::contains("qdisc del").not())
        .stdout(predicate::str::contains("filter add").not());
}

#[test]
fn test_cli_config_file_with_flag_override() {
    let config = temp_file(
        r#"{ "delay_ms": 25, "bandwidth_mbit": 3, "interface": "veth7", "port": 7000 }"#,
    );

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "-p", "9000", "--tc", "/usr/local/sbin/tc", "-c"])
        .arg(config.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "/usr/local/sbin/tc qdisc add dev veth7 parent 1:3 handle 30: tbf rate 3.000mbit latency 25ms",
        ))
        .stdout(predicate::str::contains("sport 9000"));
}

#[test]
fn test_cli_invalid_config_file() {
    let config = temp_file(r#"{ "delay": 25 }"#);

    let mut cmd = cli_command();
    cmd.args(["--dry-run", "-c"]).arg(config.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config file"));
}
