use std::path::Path;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use sql_exercise_grader::{
    exercise::ExerciseFile,
    intent::extract_intent,
    patterns::detect_patterns,
    report::{
        Assessment, EvaluationCriteria, EvaluationReport, LLM_UNAVAILABLE, LlmAnalysis,
        assemble, write_report
    },
    sandbox::ExecutionResult
};
use tempfile::TempDir;

const TABLE_EXERCISE: &str = "\
-- PURPOSE: Demonstrate fundamental table creation concepts
-- DIFFICULTY: Beginner (5-10 min)
-- CONCEPTS: Table creation, data types, primary keys

CREATE TABLE books (id INT PRIMARY KEY, title TEXT);
INSERT INTO books VALUES (1, 'Dune');
SELECT title FROM books;
";

fn clean_execution() -> ExecutionResult {
    ExecutionResult {
        success:           true,
        output_line_count: 12,
        error_count:       0,
        warning_count:     0,
        result_set_count:  3,
        raw_output:        String::from(
            "BEGIN\nCREATE TABLE\nINSERT 0 1\n(1 row)\n(1 row)\n(1 row)\nROLLBACK"
        ),
        neutralized:       Vec::new()
    }
}

fn file() -> ExerciseFile {
    ExerciseFile::locate(
        Path::new("quests/table-basics/01-create.sql"),
        Path::new("quests")
    )
}

fn build(execution: &ExecutionResult, llm: Option<Value>) -> EvaluationReport {
    assemble(
        &file(),
        &extract_intent(TABLE_EXERCISE),
        execution,
        &detect_patterns(TABLE_EXERCISE),
        llm,
        &EvaluationCriteria::default(),
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap()
    )
}

#[test]
fn test_end_to_end_pass() {
    let report = build(&clean_execution(), None);
    let value: Value = serde_json::from_str(&report.to_json()).unwrap();

    assert_eq!(value["execution"]["success"], true);
    assert_eq!(value["execution"]["errors"], 0);
    assert_eq!(value["execution"]["result_sets"], 3);
    assert_eq!(value["evaluation"]["overall_assessment"], "PASS");
    assert!(
        value["intent"]["sql_patterns"]
            .as_array()
            .unwrap()
            .contains(&json!("table_creation"))
    );
    assert_eq!(
        value["intent"]["purpose"],
        "Demonstrate fundamental table creation concepts"
    );
}

#[test]
fn test_metadata() {
    let report = build(&clean_execution(), None);
    assert_eq!(report.metadata.file, "01-create.sql");
    assert_eq!(report.metadata.quest, "table-basics");
    assert_eq!(report.metadata.generated, "2025-01-15T09:30:00Z");
    assert_eq!(report.metadata.full_path, "quests/table-basics/01-create.sql");
}

#[test]
fn test_placeholder_without_llm() {
    let report = build(&clean_execution(), None);
    assert_eq!(report.llm_analysis, LlmAnalysis::unavailable());
    let value: Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(value["llm_analysis"], LLM_UNAVAILABLE);
}

#[test]
fn test_llm_error_object_is_embedded() {
    let report = build(
        &clean_execution(),
        Some(json!({"error": "Empty response from LLM"}))
    );
    assert!(report.llm_analysis.is_present());
    let value: Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(value["llm_analysis"]["error"], "Empty response from LLM");
}

#[test]
fn test_failed_execution_fails_with_issues() {
    let report = build(
        &ExecutionResult::failure("psql: error: connection refused"),
        None
    );
    assert_eq!(report.evaluation.overall_assessment, Assessment::Fail);
    assert!(report.evaluation.score <= 4);
    assert!(!report.evaluation.issues.is_empty());
    assert!(!report.evaluation.recommendations.is_empty());
}

#[test]
fn test_sql_patterns_sorted() {
    let report = build(&clean_execution(), None);
    let mut sorted = report.intent.sql_patterns.clone();
    sorted.sort();
    assert_eq!(report.intent.sql_patterns, sorted);
}

#[test]
fn test_write_report_creates_directories_and_overwrites() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("table-basics/nested/01-create.json");

    write_report(&build(&clean_execution(), None), &path).unwrap();
    write_report(
        &build(&clean_execution(), Some(json!({"score": 9}))),
        &path
    )
    .unwrap();

    let stored: EvaluationReport =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored.llm_analysis, LlmAnalysis::Present(json!({"score": 9})));
}
