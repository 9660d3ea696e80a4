//! Per-file evaluation report.
//!
//! The report merges intent, execution metrics, detected patterns, the basic
//! rule-based evaluation and the optional LLM analysis into one JSON
//! document:
//!
//! ```text
//! {
//!   "metadata":     { "generated", "file", "quest", "full_path" },
//!   "intent":       { "purpose", "difficulty", "concepts", "expected_results",
//!                     "learning_outcomes", "sql_patterns" },
//!   "execution":    { "success", "output_lines", "errors", "warnings",
//!                     "result_sets", "raw_output" },
//!   "evaluation":   { "overall_assessment", "score", "pattern_analysis",
//!                     "issues", "recommendations" },
//!   "llm_analysis": { ... } | "LLM analysis not available (...)"
//! }
//! ```
//!
//! `llm_analysis` is always present so consumers see a stable schema.

mod scoring;

use std::{fs, path::Path};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::scoring::{Assessment, BasicEvaluation, EvaluationCriteria, evaluate};
use crate::{
    error::{AppResult, file_write_error},
    exercise::ExerciseFile,
    intent::IntentRecord,
    patterns::PatternSet,
    sandbox::ExecutionResult
};

/// Placeholder used when no LLM client is configured.
pub const LLM_UNAVAILABLE: &str = "LLM analysis not available (missing credentials or client)";

/// Report header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated: String,
    pub file:      String,
    pub quest:     String,
    pub full_path: String
}

/// LLM section of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmAnalysis {
    /// Reason the analysis was not run
    Unavailable(String),
    /// Parsed model output or an error object
    Present(Value)
}

impl LlmAnalysis {
    pub fn unavailable() -> Self {
        Self::Unavailable(LLM_UNAVAILABLE.to_string())
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

/// Complete evaluation of one exercise file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metadata:     ReportMetadata,
    pub intent:       IntentRecord,
    pub execution:    ExecutionResult,
    pub evaluation:   BasicEvaluation,
    pub llm_analysis: LlmAnalysis
}

impl EvaluationReport {
    /// Replace the LLM section.
    #[must_use]
    pub fn with_llm_analysis(mut self, analysis: LlmAnalysis) -> Self {
        self.llm_analysis = analysis;
        self
    }

    pub fn to_json(&self) -> String {
        let mut json = serde_json::to_string_pretty(self).unwrap_or_default();
        json.push('\n');
        json
    }
}

/// Merge all per-file results into a report.
///
/// Without an LLM result the report carries the [`LLM_UNAVAILABLE`]
/// placeholder.
pub fn assemble(
    file: &ExerciseFile,
    intent: &IntentRecord,
    execution: &ExecutionResult,
    patterns: &PatternSet,
    llm_result: Option<Value>,
    criteria: &EvaluationCriteria,
    generated: DateTime<Utc>
) -> EvaluationReport {
    let mut intent = intent.clone();
    intent.sql_patterns = patterns.iter().cloned().collect();

    let evaluation = evaluate(&intent, execution, criteria);
    let llm_analysis = match llm_result {
        Some(value) => LlmAnalysis::Present(value),
        None => LlmAnalysis::unavailable()
    };

    EvaluationReport {
        metadata: ReportMetadata {
            generated: generated.to_rfc3339_opts(SecondsFormat::Secs, true),
            file:      file.file_name(),
            quest:     file.quest.clone(),
            full_path: file.path.display().to_string()
        },
        intent,
        execution: execution.clone(),
        evaluation,
        llm_analysis
    }
}

/// Write a report, creating parent directories. Existing files are replaced.
pub fn write_report(report: &EvaluationReport, path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| file_write_error(&parent.display().to_string(), e))?;
    }
    fs::write(path, report.to_json()).map_err(|e| file_write_error(&path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_placeholder_serializes_as_string() {
        let value = serde_json::to_value(LlmAnalysis::unavailable()).unwrap();
        assert_eq!(value, Value::String(LLM_UNAVAILABLE.to_string()));
    }

    #[test]
    fn test_llm_present_serializes_inline() {
        let value =
            serde_json::to_value(LlmAnalysis::Present(serde_json::json!({"score": 8}))).unwrap();
        assert_eq!(value["score"], 8);
    }
}
