//! Marker counting over captured engine output.

use std::sync::LazyLock;

use regex::Regex;

static RESULT_SET_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*\(\d+ rows?\)\s*$").ok());

/// Counts derived from engine output text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputMetrics {
    pub lines:       usize,
    pub errors:      usize,
    pub warnings:    usize,
    pub result_sets: usize
}

/// Count lines, error/warning markers and `(N rows)` footers.
pub fn count_markers(output: &str) -> OutputMetrics {
    let mut metrics = OutputMetrics::default();
    for line in output.lines() {
        metrics.lines += 1;
        if line.contains("ERROR:") || line.contains("FATAL:") {
            metrics.errors += 1;
        }
        if line.contains("WARNING:") {
            metrics.warnings += 1;
        }
        if RESULT_SET_RE.as_ref().is_some_and(|re| re.is_match(line)) {
            metrics.result_sets += 1;
        }
    }
    metrics
}
