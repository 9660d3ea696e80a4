//! Orchestration types.
//!
//! This module defines evaluation targets, the per-file stage machine, the
//! per-file outcome and the aggregate run summary.

use std::{fmt, path::PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    exercise::ExerciseFile,
    llm::{AnalysisMode, LlmStats},
    report::{Assessment, EvaluationCriteria}
};

/// What a run evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single exercise file
    File(PathBuf),
    /// Every exercise below a directory
    Directory(PathBuf),
    /// A quest directory under the quests root, by name
    Quest(String),
    /// Every quest
    All
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Directory(path) => write!(f, "directory {}", path.display()),
            Self::Quest(name) => write!(f, "quest {}", name),
            Self::All => write!(f, "all quests")
        }
    }
}

/// Stages a file moves through, in order.
///
/// `Pending → Executed → Classified → Analyzed → Assembled → Written →
/// Terminal`. `Analyzed` is skipped when no LLM client is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Pending,
    Executed,
    Classified,
    Analyzed,
    Assembled,
    Written,
    Terminal
}

/// Result of processing one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path:             PathBuf,
    pub quest:            String,
    /// Last stage reached before terminating
    pub stage:            FileStage,
    pub assessment:       Option<Assessment>,
    pub score:            Option<u8>,
    pub execution_failed: bool,
    /// The script could not be read; it never reached the sandbox
    pub unreadable:       bool,
    pub report_path:      Option<PathBuf>,
    pub error:            Option<String>
}

impl FileOutcome {
    pub fn pending(file: &ExerciseFile) -> Self {
        Self {
            path:             file.path.clone(),
            quest:            file.quest.clone(),
            stage:            FileStage::Pending,
            assessment:       None,
            score:            None,
            execution_failed: false,
            unreadable:       false,
            report_path:      None,
            error:            None
        }
    }

    /// Move forward; stages never go backwards.
    pub fn advance(&mut self, stage: FileStage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    /// Terminate early with an error.
    pub fn abort(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.stage = FileStage::Terminal;
    }

    /// Assessment used for counting; aborted files count as failed.
    pub fn verdict(&self) -> Assessment {
        match (self.error.as_ref(), self.assessment) {
            (None, Some(assessment)) => assessment,
            _ => Assessment::Fail
        }
    }
}

/// Pass/fail/needs-review counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub passed:       usize,
    pub failed:       usize,
    pub needs_review: usize
}

impl Tally {
    pub fn record(&mut self, assessment: Assessment) {
        match assessment {
            Assessment::Pass => self.passed += 1,
            Assessment::Fail => self.failed += 1,
            Assessment::NeedsReview => self.needs_review += 1
        }
    }

    pub fn processed(&self) -> usize {
        self.passed + self.failed + self.needs_review
    }
}

/// Aggregate result of a run.
///
/// `processed == passed + failed + needs_review` and
/// `processed <= total_files` hold after every [`record`](Self::record).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub target:             String,
    pub strategy:           String,
    pub total_files:        usize,
    pub processed:          usize,
    pub passed:             usize,
    pub failed:             usize,
    pub needs_review:       usize,
    pub execution_failures: usize,
    pub unreadable_files:   usize,
    pub database_reachable: bool,
    pub llm_enabled:        bool,
    pub llm:                LlmStats,
    pub quests:             IndexMap<String, Tally>,
    pub elapsed_secs:       f64,
    pub outcomes:           Vec<FileOutcome>
}

impl RunSummary {
    pub fn new(target: &Target, strategy: &str, total_files: usize) -> Self {
        Self {
            target: target.to_string(),
            strategy: strategy.to_string(),
            total_files,
            processed: 0,
            passed: 0,
            failed: 0,
            needs_review: 0,
            execution_failures: 0,
            unreadable_files: 0,
            database_reachable: true,
            llm_enabled: false,
            llm: LlmStats::default(),
            quests: IndexMap::new(),
            elapsed_secs: 0.0,
            outcomes: Vec::new()
        }
    }

    /// Count a file that reached `Terminal`.
    pub fn record(&mut self, outcome: FileOutcome) {
        let verdict = outcome.verdict();
        let mut tally = Tally {
            passed:       self.passed,
            failed:       self.failed,
            needs_review: self.needs_review
        };
        tally.record(verdict);
        self.passed = tally.passed;
        self.failed = tally.failed;
        self.needs_review = tally.needs_review;
        self.processed = tally.processed();

        self.quests
            .entry(outcome.quest.clone())
            .or_default()
            .record(verdict);
        if outcome.execution_failed {
            self.execution_failures += 1;
        }
        if outcome.unreadable {
            self.unreadable_files += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Settings shared by every file in a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub quests_root:       PathBuf,
    pub output_root:       PathBuf,
    pub criteria:          EvaluationCriteria,
    pub analysis_mode:     AnalysisMode,
    /// Files between progress messages for per-file strategies
    pub progress_interval: usize,
    /// Draw a progress bar on the terminal
    pub show_progress:     bool
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            quests_root:       PathBuf::from("quests"),
            output_root:       PathBuf::from("ai-evaluations"),
            criteria:          EvaluationCriteria::default(),
            analysis_mode:     AnalysisMode::default(),
            progress_interval: 5,
            show_progress:     false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn outcome(quest: &str, assessment: Option<Assessment>, error: Option<&str>) -> FileOutcome {
        let file = ExerciseFile::locate(
            Path::new(&format!("quests/{}/a.sql", quest)),
            Path::new("quests")
        );
        let mut outcome = FileOutcome::pending(&file);
        outcome.assessment = assessment;
        match error {
            Some(e) => outcome.abort(e),
            None => outcome.advance(FileStage::Terminal)
        }
        outcome
    }

    #[test]
    fn test_stage_never_regresses() {
        let mut o = outcome("q", Some(Assessment::Pass), None);
        o.advance(FileStage::Executed);
        assert_eq!(o.stage, FileStage::Terminal);
    }

    #[test]
    fn test_aborted_file_counts_as_failed() {
        assert_eq!(
            outcome("q", Some(Assessment::Pass), Some("disk full")).verdict(),
            Assessment::Fail
        );
    }

    #[test]
    fn test_summary_invariant_and_quest_order() {
        let mut summary = RunSummary::new(&Target::All, "sequential", 3);
        summary.record(outcome("b", Some(Assessment::Pass), None));
        summary.record(outcome("a", Some(Assessment::NeedsReview), None));
        let mut unreadable = outcome("b", None, Some("permission denied"));
        unreadable.unreadable = true;
        summary.record(unreadable);
        assert_eq!(summary.processed, 3);
        assert_eq!(
            summary.processed,
            summary.passed + summary.failed + summary.needs_review
        );
        assert_eq!(summary.unreadable_files, 1);
        let quests: Vec<&String> = summary.quests.keys().collect();
        assert_eq!(quests, vec!["b", "a"]);
        assert_eq!(summary.quests["b"].failed, 1);
    }
}
