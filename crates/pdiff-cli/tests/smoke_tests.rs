//! Smoke tests for the pdiff CLI
//!
//! Everything here runs without a browser.

#![allow(deprecated)] // Command::cargo_bin
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the pdiff binary
fn pdiff() -> Command {
    Command::cargo_bin("pdiff").expect("pdiff binary should exist")
}

fn suite() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("test_home.yaml"),
        r"
base_url: example.com
classes:
  - name: Home
    tests:
      - name: index
        url: /
      - name: about_us
        url: /about
        doc: About page
",
    )
    .unwrap();
    fs::write(
        dir.path().join("test_search.yml"),
        r"
classes:
  - name: Search
    base_url: search.example.com
    tests:
      - name: results
",
    )
    .unwrap();
    // Not a test module
    fs::write(dir.path().join("helpers.yaml"), "classes: []").unwrap();
    dir
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    pdiff()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    pdiff()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("interactive"));
}

#[test]
fn test_proxy_is_hidden() {
    pdiff()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("proxy").not());
}

#[test]
fn test_no_args_fails() {
    pdiff().assert().failure();
}

#[test]
fn test_test_subcommand_help() {
    pdiff()
        .args(["test", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--image-dir"))
        .stdout(predicate::str::contains("--no-proxy"));
}

// ============================================================================
// List
// ============================================================================

#[test]
fn test_list_all() {
    let dir = suite();
    pdiff()
        .arg("list")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("All matched tests:"))
        .stdout(predicate::str::contains(" Home: 2 tests"))
        .stdout(predicate::str::contains("   home_about-us"))
        .stdout(predicate::str::contains("   home_index"))
        .stdout(predicate::str::contains(" Search: 1 tests"));
}

#[test]
fn test_list_name_filter() {
    let dir = suite();
    pdiff()
        .args(["list", "-f", "ABOUT"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("home_about-us"))
        .stdout(predicate::str::contains("home_index").not())
        .stdout(predicate::str::contains("Search").not());
}

#[test]
fn test_list_class_filter() {
    let dir = suite();
    pdiff()
        .args(["list", "-c", "search,nothing"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("search_results"))
        .stdout(predicate::str::contains("Home").not());
}

#[test]
fn test_list_verbose_shows_docs() {
    let dir = suite();
    pdiff()
        .args(["list", "-v"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("About page"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_invalid_filter() {
    let dir = suite();
    pdiff()
        .args(["list", "-f", "("])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_missing_directory() {
    pdiff()
        .args(["list", "/nonexistent/pdiff-suite"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("test directory not found"));
}

#[test]
fn test_duplicate_names_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("test_dup.yaml"),
        r"
classes:
  - name: Home
    tests:
      - name: a_b
      - name: a-b
",
    )
    .unwrap();
    pdiff()
        .arg("list")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("home_a-b"));
}

#[test]
fn test_malformed_suite_names_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("test_bad.yaml"), "classes: [").unwrap();
    pdiff()
        .arg("list")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("test_bad.yaml"));
}

#[test]
fn test_unknown_browser() {
    let dir = suite();
    pdiff()
        .args(["test", "--browser", "lynx"])
        .arg(dir.path())
        .assert()
        .failure();
}
