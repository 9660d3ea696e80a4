// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::path::Path;

use sql_exercise_grader::{
    app::{FileOutcome, FileStage, RunSummary, Target},
    exercise::ExerciseFile,
    intent::extract_intent,
    output::{OutputFormat, OutputOptions, format_intent, format_patterns, format_summary},
    patterns::detect_patterns,
    report::Assessment
};

fn plain(format: OutputFormat) -> OutputOptions {
    OutputOptions {
        format,
        colored: false,
        verbose: false
    }
}

fn outcome(path: &str, assessment: Assessment) -> FileOutcome {
    let file = ExerciseFile::locate(Path::new(path), Path::new("quests"));
    let mut outcome = FileOutcome::pending(&file);
    outcome.assessment = Some(assessment);
    outcome.score = Some(7);
    outcome.advance(FileStage::Terminal);
    outcome
}

fn sample_summary() -> RunSummary {
    let mut summary = RunSummary::new(&Target::All, "sequential", 3);
    summary.record(outcome("quests/joins/01.sql", Assessment::Pass));
    summary.record(outcome("quests/joins/02.sql", Assessment::NeedsReview));
    summary.record(outcome("quests/windows/01.sql", Assessment::Fail));
    summary
}

#[test]
fn test_output_format_default() {
    assert!(matches!(OutputFormat::default(), OutputFormat::Text));
}

#[test]
fn test_output_options_default() {
    let opts = OutputOptions::default();
    assert!(matches!(opts.format, OutputFormat::Text));
    assert!(opts.colored);
    assert!(!opts.verbose);
}

#[test]
fn test_format_summary_text() {
    let output = format_summary(&sample_summary(), &plain(OutputFormat::Text));
    assert!(output.contains("=== SQL Exercise Evaluation ==="));
    assert!(output.contains("Processed: 3/3"));
    assert!(output.contains("PASS 1"));
    assert!(output.contains("FAIL 1"));
    assert!(output.contains("NEEDS_REVIEW 1"));
    assert!(output.contains("joins"));
    assert!(output.contains("LLM: disabled"));
    assert!(!output.contains("Files:"));
}

#[test]
fn test_format_summary_text_verbose_lists_files() {
    let opts = OutputOptions {
        verbose: true,
        ..plain(OutputFormat::Text)
    };
    let output = format_summary(&sample_summary(), &opts);
    assert!(output.contains("Files:"));
    assert!(output.contains("quests/windows/01.sql"));
    assert!(output.contains("score 7"));
}

#[test]
fn test_format_summary_json() {
    let output = format_summary(&sample_summary(), &plain(OutputFormat::Json));
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["processed"], 3);
    assert_eq!(value["quests"]["joins"]["passed"], 1);
    assert_eq!(value["outcomes"][2]["assessment"], "FAIL");
    assert_eq!(value["outcomes"][0]["stage"], "terminal");
}

#[test]
fn test_format_summary_yaml() {
    let output = format_summary(&sample_summary(), &plain(OutputFormat::Yaml));
    assert!(output.contains("processed: 3"));
    assert!(output.contains("strategy: sequential"));
}

#[test]
fn test_format_patterns_text() {
    let patterns = detect_patterns("SELECT a FROM t ORDER BY a;");
    let output = format_patterns(&patterns, &plain(OutputFormat::Text));
    assert!(output.starts_with("2 pattern(s):"));
    assert!(output.contains("  data_querying\n"));
    assert!(output.contains("  ordering\n"));
}

#[test]
fn test_format_patterns_json() {
    let patterns = detect_patterns("SELECT a FROM t ORDER BY a;");
    let output = format_patterns(&patterns, &plain(OutputFormat::Json));
    let value: Vec<String> = serde_json::from_str(&output).unwrap();
    assert_eq!(value, vec!["data_querying", "ordering"]);
}

#[test]
fn test_format_intent_text() {
    let intent = extract_intent("-- PURPOSE: Learn joins\n");
    let output = format_intent(&intent, &plain(OutputFormat::Text));
    assert!(output.contains("Purpose: Learn joins"));
    assert!(output.contains("Difficulty: -"));
}
