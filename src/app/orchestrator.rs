//! Batch evaluation of exercise files.
//!
//! Files are processed strictly one at a time. Each file walks the
//! [`FileStage`] machine to `Terminal`, and a failure at any stage only
//! affects that file.

use std::{path::PathBuf, time::Instant};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{Instrument, debug, info, info_span, warn};

use super::{
    helpers::resolve_files,
    strategy::{ExecutionStrategy, Sequential},
    types::{FileOutcome, FileStage, RunSettings, RunSummary, Target}
};
use crate::{
    error::AppResult,
    exercise::ExerciseFile,
    intent::extract_intent,
    llm::{ChatTransport, HttpTransport, LlmClient},
    patterns::PatternDetector,
    report::{LlmAnalysis, assemble, write_report},
    sandbox::{Sandbox, SqlEngine}
};

/// Drives a whole run.
pub struct Orchestrator<E, T = HttpTransport> {
    sandbox:  Sandbox<E>,
    llm:      Option<LlmClient<T>>,
    detector: PatternDetector,
    strategy: Box<dyn ExecutionStrategy>,
    settings: RunSettings
}

impl<E: SqlEngine> Orchestrator<E, HttpTransport> {
    /// Sequential orchestrator without an LLM client.
    pub fn new(sandbox: Sandbox<E>, settings: RunSettings) -> Self {
        Self {
            sandbox,
            llm: None,
            detector: PatternDetector::new(),
            strategy: Box::new(Sequential),
            settings
        }
    }
}

impl<E: SqlEngine, T: ChatTransport> Orchestrator<E, T> {
    /// Attach an LLM client; every report then carries its analysis.
    pub fn with_llm<U: ChatTransport>(self, client: LlmClient<U>) -> Orchestrator<E, U> {
        Orchestrator {
            sandbox:  self.sandbox,
            llm:      Some(client),
            detector: self.detector,
            strategy: self.strategy,
            settings: self.settings
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Box<dyn ExecutionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: PatternDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn llm(&self) -> Option<&LlmClient<T>> {
        self.llm.as_ref()
    }

    /// Evaluate every file the target resolves to.
    ///
    /// Only target resolution fails the run as a whole; per-file problems
    /// are counted in the summary.
    pub async fn run(&self, target: &Target) -> AppResult<RunSummary> {
        let started = Instant::now();
        let files = resolve_files(target, &self.settings.quests_root)?;
        let mut summary = RunSummary::new(target, self.strategy.name(), files.len());
        summary.llm_enabled = self.llm.is_some();

        summary.database_reachable = self.sandbox.probe().await;
        if !summary.database_reachable {
            warn!("database unreachable; every exercise will fail execution");
        }

        info!(
            target = %target,
            files = files.len(),
            strategy = self.strategy.name(),
            llm = summary.llm_enabled,
            "starting evaluation"
        );

        let progress = self.progress_bar(files.len());
        let interval = self.settings.progress_interval.max(1);
        let batches = self.strategy.partition(&files);
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            for file in batch {
                let span = info_span!("exercise", path = %file.path.display());
                let outcome = self.process_file(file).instrument(span).await;
                summary.record(outcome);
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                if self.strategy.per_file_progress() && summary.processed % interval == 0 {
                    info!(
                        processed = summary.processed,
                        total = summary.total_files,
                        "progress"
                    );
                }
            }
            if !self.strategy.per_file_progress() {
                info!(
                    batch = index + 1,
                    batches = batch_count,
                    processed = summary.processed,
                    total = summary.total_files,
                    "batch complete"
                );
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        if let Some(client) = &self.llm {
            summary.llm = client.stats();
        }
        summary.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            processed = summary.processed,
            passed = summary.passed,
            failed = summary.failed,
            needs_review = summary.needs_review,
            execution_failures = summary.execution_failures,
            "evaluation complete"
        );
        Ok(summary)
    }

    /// Take one file from `Pending` to `Terminal`.
    pub async fn process_file(&self, file: &ExerciseFile) -> FileOutcome {
        let mut outcome = FileOutcome::pending(file);

        let sql = match file.read() {
            Ok(sql) => sql,
            Err(e) => {
                warn!(error = %e, "cannot read exercise");
                outcome.unreadable = true;
                outcome.abort(e.to_string());
                return outcome;
            }
        };

        let execution = self.sandbox.execute_sql(&sql).await;
        outcome.execution_failed = !execution.success;
        outcome.advance(FileStage::Executed);

        let intent = extract_intent(&sql);
        let patterns = self.detector.detect(&sql);
        debug!(patterns = patterns.len(), "classified");
        outcome.advance(FileStage::Classified);

        let mut report = assemble(
            file,
            &intent,
            &execution,
            &patterns,
            None,
            &self.settings.criteria,
            Utc::now()
        );
        if let Some(client) = &self.llm {
            let analysis = client
                .analyze_exercise(&sql, &report, self.settings.analysis_mode)
                .await;
            report = report.with_llm_analysis(LlmAnalysis::Present(analysis));
            outcome.advance(FileStage::Analyzed);
        }
        outcome.advance(FileStage::Assembled);

        let path: PathBuf = file.report_path(&self.settings.output_root);
        if let Err(e) = write_report(&report, &path) {
            warn!(error = %e, "cannot write report");
            outcome.abort(e.to_string());
            return outcome;
        }
        outcome.advance(FileStage::Written);
        debug!(report = %path.display(), assessment = %report.evaluation.overall_assessment, "report written");

        outcome.assessment = Some(report.evaluation.overall_assessment);
        outcome.score = Some(report.evaluation.score);
        outcome.report_path = Some(path);
        outcome.advance(FileStage::Terminal);
        outcome
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.settings.show_progress || total == 0 {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:30}] {pos}/{len} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(self.strategy.name());
        Some(pb)
    }
}
