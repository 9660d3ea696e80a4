//! Integration tests for the sql-grader binary.

use std::fs;

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary isolated from user config files and ambient credentials.
fn cmd(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("sql-grader");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("LLM_API_KEY")
        .env_remove("LLM_PROVIDER")
        .env_remove("RUST_LOG");
    cmd
}

fn corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    let quest = dir.path().join("quests/table-basics");
    fs::create_dir_all(&quest).unwrap();
    fs::write(
        quest.join("01-create.sql"),
        "-- PURPOSE: Create a table\n-- DIFFICULTY: Beginner\n-- CONCEPTS: DDL\n\
         CREATE TABLE t (id INT PRIMARY KEY);\nSELECT id FROM t;\n"
    )
    .unwrap();
    fs::write(quest.join("02-insert.sql"), "INSERT INTO t VALUES (1);\n").unwrap();
    dir
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("evaluate"))
        .stdout(predicate::str::contains("check-db"));
}

#[test]
fn test_patterns_command() {
    let dir = corpus();
    cmd(&dir)
        .args(["patterns", "quests/table-basics/01-create.sql"])
        .assert()
        .success()
        .stdout(predicate::str::contains("table_creation"))
        .stdout(predicate::str::contains("primary_key"));
}

#[test]
fn test_patterns_missing_file() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .args(["patterns", "nope.sql"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_intent_command_json() {
    let dir = corpus();
    cmd(&dir)
        .args(["intent", "quests/table-basics/01-create.sql"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"purpose\": \"Create a table\""));
}

#[test]
fn test_evaluate_unreachable_database() {
    let dir = corpus();
    cmd(&dir)
        .env("PGHOST", "127.0.0.1")
        .env("PGPORT", "1")
        .args([
            "evaluate",
            "table-basics",
            "--no-llm",
            "--no-color",
            "--format",
            "json"
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"execution_failures\": 2"))
        .stdout(predicate::str::contains("\"passed\": 0"));

    let report = fs::read_to_string(dir.path().join("ai-evaluations/table-basics/01-create.json"))
        .unwrap();
    assert!(report.contains("\"overall_assessment\": \"FAIL\""));
    assert!(report.contains("LLM analysis not available"));
}

#[test]
fn test_evaluate_unknown_target() {
    let dir = corpus();
    cmd(&dir)
        .args(["evaluate", "no-such-quest", "--no-llm"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_evaluate_custom_output_dir() {
    let dir = corpus();
    cmd(&dir)
        .env("PGHOST", "127.0.0.1")
        .env("PGPORT", "1")
        .args([
            "evaluate",
            "quests/table-basics/02-insert.sql",
            "--no-llm",
            "--output-dir",
            "reports"
        ])
        .assert()
        .code(2);
    assert!(
        dir.path()
            .join("reports/table-basics/02-insert.json")
            .exists()
    );
}

#[test]
fn test_check_db_unreachable() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .env("PGHOST", "127.0.0.1")
        .env("PGPORT", "1")
        .arg("check-db")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Database unreachable"));
}
