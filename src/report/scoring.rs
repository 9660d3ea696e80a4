//! Rule-based evaluation that needs no LLM.
//!
//! The assessment is a pure function of execution metrics and pattern
//! coverage:
//!
//! - `FAIL` when the run failed or reported any error
//! - `PASS` when at least `min_patterns` patterns were detected
//! - `NEEDS_REVIEW` otherwise
//!
//! The 0-10 score adds up pattern coverage (at most 6), a clean run without
//! warnings (2), at least one result set (1) and an error-free run (1).
//! Failed files are capped at 4.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{intent::IntentRecord, sandbox::ExecutionResult};

const MAX_COVERAGE_POINTS: usize = 6;
const FAIL_SCORE_CAP: u8 = 4;
const MAX_LISTED_ERRORS: usize = 5;

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assessment {
    Pass,
    Fail,
    NeedsReview
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::NeedsReview => write!(f, "NEEDS_REVIEW")
        }
    }
}

/// Thresholds for the basic evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationCriteria {
    pub min_patterns: usize
}

impl Default for EvaluationCriteria {
    fn default() -> Self {
        Self {
            min_patterns: 2
        }
    }
}

/// `evaluation` section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicEvaluation {
    pub overall_assessment: Assessment,
    pub score:              u8,
    pub pattern_analysis:   String,
    pub issues:             Vec<String>,
    pub recommendations:    Vec<String>
}

/// Evaluate an exercise from its intent (patterns filled in) and execution.
pub fn evaluate(
    intent: &IntentRecord,
    execution: &ExecutionResult,
    criteria: &EvaluationCriteria
) -> BasicEvaluation {
    let pattern_count = intent.sql_patterns.len();
    let overall_assessment = assess(execution, pattern_count, criteria);
    BasicEvaluation {
        overall_assessment,
        score: score(execution, pattern_count, overall_assessment),
        pattern_analysis: pattern_analysis(&intent.sql_patterns),
        issues: issues(intent, execution, criteria),
        recommendations: recommendations(intent, execution)
    }
}

pub fn assess(
    execution: &ExecutionResult,
    pattern_count: usize,
    criteria: &EvaluationCriteria
) -> Assessment {
    if !execution.success || execution.error_count > 0 {
        Assessment::Fail
    } else if pattern_count >= criteria.min_patterns {
        Assessment::Pass
    } else {
        Assessment::NeedsReview
    }
}

pub fn score(execution: &ExecutionResult, pattern_count: usize, assessment: Assessment) -> u8 {
    let coverage = pattern_count.min(MAX_COVERAGE_POINTS) as u8;
    let clean = if execution.warning_count == 0 { 2 } else { 0 };
    let results = if execution.result_set_count > 0 { 1 } else { 0 };
    let error_free = if execution.success && execution.error_count == 0 {
        1
    } else {
        0
    };
    let total = (coverage + clean + results + error_free).min(10);
    if assessment == Assessment::Fail {
        total.min(FAIL_SCORE_CAP)
    } else {
        total
    }
}

fn pattern_analysis(patterns: &[String]) -> String {
    if patterns.is_empty() {
        String::from("No recognized SQL patterns detected")
    } else {
        format!(
            "Detected {} SQL pattern(s): {}",
            patterns.len(),
            patterns.join(", ")
        )
    }
}

fn issues(
    intent: &IntentRecord,
    execution: &ExecutionResult,
    criteria: &EvaluationCriteria
) -> Vec<String> {
    let mut issues = Vec::new();
    if !execution.success {
        issues.push(String::from("Execution did not complete successfully"));
    }
    let error_lines: Vec<&str> = execution
        .raw_output
        .lines()
        .filter(|l| l.contains("ERROR:") || l.contains("FATAL:"))
        .map(str::trim)
        .collect();
    for line in error_lines.iter().take(MAX_LISTED_ERRORS) {
        issues.push(format!("Execution error: {}", line));
    }
    if error_lines.len() > MAX_LISTED_ERRORS {
        issues.push(format!(
            "... and {} more error(s)",
            error_lines.len() - MAX_LISTED_ERRORS
        ));
    }
    if execution.warning_count > 0 {
        issues.push(format!(
            "{} warning(s) reported during execution",
            execution.warning_count
        ));
    }
    for statement in &execution.neutralized {
        issues.push(format!(
            "Statement neutralized by the sandbox: {}",
            statement
        ));
    }
    for key in intent.missing_headers() {
        issues.push(format!("Missing {} header", key));
    }
    if intent.sql_patterns.len() < criteria.min_patterns {
        issues.push(format!(
            "Only {} SQL pattern(s) detected (expected at least {})",
            intent.sql_patterns.len(),
            criteria.min_patterns
        ));
    }
    issues
}

fn recommendations(intent: &IntentRecord, execution: &ExecutionResult) -> Vec<String> {
    let mut recommendations = Vec::new();
    if execution.error_count > 0 || !execution.success {
        recommendations
            .push(String::from("Fix the SQL errors so the exercise runs cleanly from top to bottom"));
    }
    if execution.warning_count > 0 {
        recommendations.push(String::from(
            "Resolve the warnings; exercises should run without warnings"
        ));
    }
    if !execution.neutralized.is_empty() {
        recommendations.push(String::from(
            "Remove explicit transaction control and psql meta-commands; each exercise already \
             runs in its own transaction"
        ));
    }
    let missing = intent.missing_headers();
    if !missing.is_empty() {
        let headers: Vec<String> = missing.iter().map(|k| format!("-- {}:", k)).collect();
        recommendations.push(format!("Add header comments: {}", headers.join(", ")));
    }
    if execution.success && execution.error_count == 0 && execution.result_set_count == 0 {
        recommendations.push(String::from(
            "Add a query that displays the outcome so learners can verify the result"
        ));
    }
    if intent.expected_results.is_empty() {
        recommendations.push(String::from("Document the expected results in a comment"));
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_run(result_sets: usize) -> ExecutionResult {
        ExecutionResult {
            success:           true,
            output_line_count: 4,
            error_count:       0,
            warning_count:     0,
            result_set_count:  result_sets,
            raw_output:        String::from("BEGIN\nCREATE TABLE\n(1 row)\nROLLBACK"),
            neutralized:       Vec::new()
        }
    }

    #[test]
    fn test_assess_fail_on_errors_even_if_success() {
        let mut execution = clean_run(1);
        execution.error_count = 1;
        assert_eq!(
            assess(&execution, 10, &EvaluationCriteria::default()),
            Assessment::Fail
        );
    }

    #[test]
    fn test_assess_needs_review_below_threshold() {
        assert_eq!(
            assess(&clean_run(1), 1, &EvaluationCriteria::default()),
            Assessment::NeedsReview
        );
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(score(&clean_run(3), 40, Assessment::Pass), 10);
        assert_eq!(score(&clean_run(0), 0, Assessment::NeedsReview), 3);
        let failed = ExecutionResult::failure("ERROR: boom");
        assert_eq!(score(&failed, 6, Assessment::Fail), FAIL_SCORE_CAP);
    }

    #[test]
    fn test_assessment_display_matches_serde() {
        for assessment in [Assessment::Pass, Assessment::Fail, Assessment::NeedsReview] {
            let json = serde_json::to_value(assessment).unwrap();
            assert_eq!(json, serde_json::Value::String(assessment.to_string()));
        }
    }

    #[test]
    fn test_pattern_analysis_empty() {
        assert_eq!(pattern_analysis(&[]), "No recognized SQL patterns detected");
    }
}
