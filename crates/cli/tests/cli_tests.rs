//! CLI integration tests

use std::process::Command;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "alertctl", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Alert Analyzer"), "Should show app name");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("analyze"), "Should show analyze command");
    assert!(stdout.contains("send"), "Should show send command");
    assert!(stdout.contains("test-alert"), "Should show test-alert command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("alertctl"), "Should show binary name");
}

/// Test test-alert subcommand help
#[test]
fn test_test_alert_help() {
    let output = run_cli(&["test-alert", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Test-alert help should succeed");
    assert!(stdout.contains("--node"), "Should show node option");
    assert!(stdout.contains("--alertname"), "Should show alertname option");
    assert!(stdout.contains("--severity"), "Should show severity option");
    assert!(stdout.contains("HighCPU"), "Should show default alert name");
}

/// Test analyze subcommand help
#[test]
fn test_analyze_help() {
    let output = run_cli(&["analyze", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Analyze help should succeed");
    assert!(stdout.contains("<NODE>"), "Should show node argument");
}

/// Test format and api-url options
#[test]
fn test_global_options() {
    let output = run_cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("ALERTCTL_API_URL"), "Should show env var");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = run_cli(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = run_cli(&["test-alert"]);

    assert!(!output.status.success(), "Missing --node should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}

/// Test that a missing webhook file fails before any request is made
#[test]
fn test_send_missing_file() {
    let output = run_cli(&[
        "--api-url",
        "http://127.0.0.1:9",
        "send",
        "/nonexistent/alert-analyzer/webhook.json",
    ]);

    assert!(!output.status.success(), "Missing file should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read"), "Should report the unreadable file");
}
