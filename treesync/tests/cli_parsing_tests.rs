//! CLI Argument Parsing Tests
//!
//! These tests verify that command-line arguments are parsed correctly: option names, mapping
//! syntax and subcommands. Breaking changes here indicate potential issues for existing
//! scripts.

use assert_cmd::Command;

/// Test that --help output is generated without errors
#[test]
fn test_help_runs() {
    Command::cargo_bin("treesync")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

/// Test --version flag works
#[test]
fn test_version_runs() {
    Command::cargo_bin("treesync")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("treesync"));
}

/// Every subcommand has its own help
#[test]
fn test_subcommand_help_runs() {
    for subcommand in ["discover", "sync", "backup", "get"] {
        Command::cargo_bin("treesync")
            .unwrap()
            .args(["--remote-root", "/", subcommand, "--help"])
            .assert()
            .success();
    }
}

/// A subcommand is required
#[test]
fn test_missing_subcommand_rejected() {
    Command::cargo_bin("treesync")
        .unwrap()
        .args(["--remote-root", "/"])
        .assert()
        .failure();
}

/// --remote-root is required
#[test]
fn test_missing_remote_root_rejected() {
    Command::cargo_bin("treesync")
        .unwrap()
        .args(["discover", "/var/www"])
        .assert()
        .failure();
}

/// discover needs at least one root
#[test]
fn test_discover_requires_root() {
    Command::cargo_bin("treesync")
        .unwrap()
        .args(["--remote-root", "/", "discover"])
        .assert()
        .failure();
}

// ============================================================================
// Mapping Argument Parsing Tests
// ============================================================================

/// Both mapping forms are accepted
#[test]
fn test_map_formats_accepted() {
    for mapping in ["build=/var/www", "build=/var/www:public", "/abs/src=/dst"] {
        Command::cargo_bin("treesync")
            .unwrap()
            .args(["--remote-root", "/", "sync", "--map", mapping, "--help"])
            .assert()
            .success();
    }
}

/// Malformed mappings are rejected by the parser (exit code 2)
#[test]
fn test_map_malformed_rejected() {
    for mapping in ["build", "build=relative", "build=/var/www:../up", "=/var/www"] {
        Command::cargo_bin("treesync")
            .unwrap()
            .args(["--remote-root", "/", "sync", "--map", mapping])
            .assert()
            .code(2);
    }
}

/// --map can be repeated
#[test]
fn test_map_repeated() {
    Command::cargo_bin("treesync")
        .unwrap()
        .args([
            "--remote-root",
            "/",
            "sync",
            "--map",
            "a=/x",
            "--map",
            "b=/y:z",
            "--fail-early",
            "--help",
        ])
        .assert()
        .success();
}

// ============================================================================
// Output Options Tests
// ============================================================================

/// Verbosity can be stacked and combined with the other output options
#[test]
fn test_output_options_accepted() {
    Command::cargo_bin("treesync")
        .unwrap()
        .args([
            "--remote-root",
            "/",
            "-vvv",
            "--summary",
            "--progress",
            "--progress-delay",
            "500ms",
            "--max-workers",
            "2",
            "--max-blocking-threads",
            "4",
            "discover",
            "--help",
        ])
        .assert()
        .success();
}

/// --max-workers only takes numbers
#[test]
fn test_max_workers_rejects_garbage() {
    Command::cargo_bin("treesync")
        .unwrap()
        .args(["--remote-root", "/", "--max-workers", "many", "discover", "/"])
        .assert()
        .code(2);
}
