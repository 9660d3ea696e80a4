//! Role and task specific prompts.

use super::TaskType;
use crate::{intent::IntentRecord, report::EvaluationReport, sandbox::ExecutionResult};

/// Characters of SQL included in a prompt.
pub const MAX_SQL_CHARS: usize = 8000;
/// Characters of engine output included in a prompt.
pub const MAX_OUTPUT_CHARS: usize = 4000;

const JSON_ONLY: &str = "Respond with a single JSON object and nothing else. You may wrap it in a \
                         ```json code block.";

/// System prompt for a task.
pub fn system_prompt(task: TaskType) -> String {
    let role = match task {
        TaskType::Intent => {
            "You are an experienced PostgreSQL instructor. You read SQL exercise files and \
             explain what the author intended learners to practise."
        }
        TaskType::Validation => {
            "You are a meticulous PostgreSQL reviewer. You compare an exercise's SQL with the \
             output it produced and judge whether it runs correctly and demonstrates what it \
             claims to."
        }
        TaskType::Difficulty => {
            "You are a curriculum designer for SQL courses. You calibrate exercise difficulty \
             for learners and estimate how long an exercise takes."
        }
        TaskType::Comprehensive => {
            "You are a senior PostgreSQL educator grading SQL learning exercises. You assess \
             intent, technical correctness and educational value, and give concrete \
             recommendations."
        }
    };
    format!("{}\n{}", role, JSON_ONLY)
}

/// Truncate on a char boundary, marking the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
        None => text.to_string()
    }
}

fn header_block(intent: &IntentRecord) -> String {
    let or_missing = |v: &str| {
        if v.is_empty() {
            "(not stated)".to_string()
        } else {
            v.to_string()
        }
    };
    format!(
        "Declared purpose: {}\nDeclared difficulty: {}\nDeclared concepts: {}",
        or_missing(&intent.purpose),
        or_missing(&intent.difficulty),
        or_missing(&intent.concepts)
    )
}

fn execution_block(execution: &ExecutionResult) -> String {
    format!(
        "Execution success: {}\nErrors: {}\nWarnings: {}\nResult sets: {}\nOutput:\n{}",
        execution.success,
        execution.error_count,
        execution.warning_count,
        execution.result_set_count,
        truncate(&execution.raw_output, MAX_OUTPUT_CHARS)
    )
}

/// What was the author trying to teach?
pub fn intent_prompt(sql: &str, intent: &IntentRecord) -> String {
    format!(
        "Analyze the intent of this SQL exercise.\n\n{header}\n\nSQL:\n```sql\n{sql}\n```\n\n\
         Return JSON with keys:\n\
         \"primary_purpose\" (string), \"learning_objectives\" (array of strings), \
         \"target_audience\" (string), \"sql_concepts\" (array of strings), \
         \"header_alignment\" (string: how well the declared header matches the SQL).",
        header = header_block(intent),
        sql = truncate(sql, MAX_SQL_CHARS)
    )
}

/// Does the script run and show what it claims?
pub fn validation_prompt(sql: &str, intent: &IntentRecord, execution: &ExecutionResult) -> String {
    format!(
        "Validate this SQL exercise against its execution output. The script ran inside a \
         transaction that was rolled back.\n\n{header}\n\nSQL:\n```sql\n{sql}\n```\n\n{exec}\n\n\
         Return JSON with keys:\n\
         \"executes_correctly\" (bool), \"output_matches_intent\" (bool), \
         \"issues\" (array of strings), \"suggestions\" (array of strings).",
        header = header_block(intent),
        sql = truncate(sql, MAX_SQL_CHARS),
        exec = execution_block(execution)
    )
}

/// Is the declared difficulty right?
pub fn difficulty_prompt(sql: &str, intent: &IntentRecord) -> String {
    format!(
        "Assess the difficulty of this SQL exercise.\n\n{header}\nDetected patterns: {patterns}\n\n\
         SQL:\n```sql\n{sql}\n```\n\n\
         Return JSON with keys:\n\
         \"assessed_difficulty\" (one of \"Beginner\", \"Intermediate\", \"Advanced\", \"Expert\"), \
         \"declared_difficulty_accurate\" (bool), \"estimated_minutes\" (integer), \
         \"reasoning\" (string).",
        header = header_block(intent),
        patterns = intent.sql_patterns.join(", "),
        sql = truncate(sql, MAX_SQL_CHARS)
    )
}

/// Full review built from the partial report.
pub fn comprehensive_prompt(sql: &str, partial: &EvaluationReport) -> String {
    format!(
        "Grade this SQL learning exercise.\n\nFile: {file}\nQuest: {quest}\n{header}\n\
         Detected patterns: {patterns}\n\
         Basic assessment: {assessment} (score {score}/10)\n\n\
         SQL:\n```sql\n{sql}\n```\n\n{exec}\n\n\
         Return JSON with keys:\n\
         \"overall_assessment\" (\"PASS\", \"FAIL\" or \"NEEDS_REVIEW\"), \
         \"score\" (integer 0-10), \
         \"intent_analysis\" (object: \"purpose_clarity\", \"header_alignment\"), \
         \"technical_review\" (object: \"correctness\", \"best_practices\", \"issues\" array), \
         \"educational_value\" (object: \"clarity\", \"difficulty_fit\", \"concepts_covered\" array), \
         \"recommendations\" (array of strings).",
        file = partial.metadata.file,
        quest = partial.metadata.quest,
        header = header_block(&partial.intent),
        patterns = partial.intent.sql_patterns.join(", "),
        assessment = partial.evaluation.overall_assessment,
        score = partial.evaluation.score,
        sql = truncate(sql, MAX_SQL_CHARS),
        exec = execution_block(&partial.execution)
    )
}
