use colored::Colorize;
use serde::Serialize;

use crate::{
    app::RunSummary,
    intent::IntentRecord,
    patterns::PatternSet,
    report::Assessment
};

/// Output format for results
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    /// List every file in text summaries
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

fn serialize<T: Serialize>(value: &T, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).ok(),
        OutputFormat::Yaml => serde_yaml::to_string(value).ok(),
        OutputFormat::Text => None
    }
}

/// Format a run summary
pub fn format_summary(summary: &RunSummary, opts: &OutputOptions) -> String {
    match serialize(summary, opts.format) {
        Some(output) => output,
        None => format_text_summary(summary, opts)
    }
}

/// Format detected pattern tags
pub fn format_patterns(patterns: &PatternSet, opts: &OutputOptions) -> String {
    if let Some(output) = serialize(patterns, opts.format) {
        return output;
    }
    if patterns.is_empty() {
        return String::from("No SQL patterns detected");
    }
    let mut output = format!("{} pattern(s):\n", patterns.len());
    for tag in patterns {
        if opts.colored {
            output.push_str(&format!("  {}\n", tag.cyan()));
        } else {
            output.push_str(&format!("  {}\n", tag));
        }
    }
    output
}

/// Format extracted intent
pub fn format_intent(intent: &IntentRecord, opts: &OutputOptions) -> String {
    if let Some(output) = serialize(intent, opts.format) {
        return output;
    }
    let mut output = String::new();
    let fields = [
        ("Purpose", &intent.purpose),
        ("Difficulty", &intent.difficulty),
        ("Concepts", &intent.concepts),
        ("Expected results", &intent.expected_results),
        ("Learning outcomes", &intent.learning_outcomes)
    ];
    for (label, value) in fields {
        let value = if value.is_empty() { "-" } else { value.as_str() };
        output.push_str(&format!("{}: {}\n", label, value));
    }
    output.push_str(&format!("Patterns: {}\n", intent.sql_patterns.join(", ")));
    output
}

fn paint(text: String, assessment: Assessment, colored: bool) -> String {
    if !colored {
        return text;
    }
    match assessment {
        Assessment::Pass => text.green().to_string(),
        Assessment::Fail => text.red().to_string(),
        Assessment::NeedsReview => text.yellow().to_string()
    }
}

fn format_text_summary(summary: &RunSummary, opts: &OutputOptions) -> String {
    let mut output = String::new();

    let header = "=== SQL Exercise Evaluation ===";
    if opts.colored {
        output.push_str(&header.bold().to_string());
    } else {
        output.push_str(header);
    }
    output.push_str("\n\n");

    output.push_str(&format!("Target:    {}\n", summary.target));
    output.push_str(&format!("Strategy:  {}\n", summary.strategy));
    output.push_str(&format!(
        "Processed: {}/{} in {:.1}s\n",
        summary.processed, summary.total_files, summary.elapsed_secs
    ));
    output.push_str(&format!(
        "{}  {}  {}\n",
        paint(format!("PASS {}", summary.passed), Assessment::Pass, opts.colored),
        paint(format!("FAIL {}", summary.failed), Assessment::Fail, opts.colored),
        paint(
            format!("NEEDS_REVIEW {}", summary.needs_review),
            Assessment::NeedsReview,
            opts.colored
        )
    ));
    output.push_str(&format!(
        "Execution failures: {}\n",
        summary.execution_failures
    ));
    if summary.unreadable_files > 0 {
        output.push_str(&format!("Unreadable files: {}\n", summary.unreadable_files));
    }

    if !summary.database_reachable {
        let warning = "Database unreachable: every exercise failed execution";
        if opts.colored {
            output.push_str(&warning.red().bold().to_string());
        } else {
            output.push_str(warning);
        }
        output.push('\n');
    }

    if summary.llm_enabled {
        output.push_str(&format!(
            "LLM: {} network call(s), {} cache hit(s)\n",
            summary.llm.network_calls, summary.llm.cache_hits
        ));
    } else {
        output.push_str("LLM: disabled\n");
    }

    if !summary.quests.is_empty() {
        output.push_str("\nBy quest:\n");
        for (quest, tally) in &summary.quests {
            output.push_str(&format!(
                "  {:<30} {:>4} pass {:>4} fail {:>4} review\n",
                quest, tally.passed, tally.failed, tally.needs_review
            ));
        }
    }

    if opts.verbose && !summary.outcomes.is_empty() {
        output.push_str("\nFiles:\n");
        for outcome in &summary.outcomes {
            let verdict = outcome.verdict();
            let label = paint(format!("{:<12}", verdict.to_string()), verdict, opts.colored);
            let detail = match (&outcome.error, outcome.score) {
                (Some(error), _) => error.clone(),
                (None, Some(score)) => format!("score {}", score),
                (None, None) => String::new()
            };
            output.push_str(&format!(
                "  {} {} {}\n",
                label,
                outcome.path.display(),
                detail
            ));
        }
    }

    output
}
