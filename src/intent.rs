//! Header-comment parsing for exercise files.
//!
//! Exercise files open with single-line comments such as
//!
//! ```sql
//! -- PURPOSE: Demonstrate fundamental table creation concepts
//! -- DIFFICULTY: Beginner (5-10 min)
//! -- CONCEPTS: Table creation, data types, primary keys
//! ```
//!
//! Parsing is line-oriented and never fails: missing keys become empty
//! strings, duplicated keys keep their first value, malformed lines are
//! skipped.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Number of leading lines searched for `KEY: value` headers.
pub const HEADER_SCAN_LINES: usize = 30;

static HEADER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*--\s*(PURPOSE|DIFFICULTY|CONCEPTS)\s*:\s*(.*?)\s*$").ok()
});

static EXPECTED_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*--\s*expected\s+(?:results?|outputs?)\b\s*:?\s*(.*?)\s*$").ok()
});

static OUTCOMES_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*--\s*learning\s+outcomes?\b\s*:?\s*(.*?)\s*$").ok()
});

/// Parsed exercise intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub purpose:           String,
    pub difficulty:        String,
    pub concepts:          String,
    pub expected_results:  String,
    pub learning_outcomes: String,
    /// Filled in by the report assembler from the pattern detector.
    pub sql_patterns:      Vec<String>
}

impl IntentRecord {
    /// Concepts split on commas, empty entries dropped.
    pub fn concept_list(&self) -> Vec<&str> {
        self.concepts
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Header keys that were not found in the file.
    pub fn missing_headers(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.purpose.is_empty() {
            missing.push("PURPOSE");
        }
        if self.difficulty.is_empty() {
            missing.push("DIFFICULTY");
        }
        if self.concepts.is_empty() {
            missing.push("CONCEPTS");
        }
        missing
    }
}

/// Extract the intent record from raw exercise text.
pub fn extract_intent(sql: &str) -> IntentRecord {
    let lines: Vec<&str> = sql.lines().collect();
    let mut record = IntentRecord::default();

    for line in lines.iter().take(HEADER_SCAN_LINES) {
        let Some((key, value)) = parse_header(line) else {
            continue;
        };
        let slot = match key.as_str() {
            "PURPOSE" => &mut record.purpose,
            "DIFFICULTY" => &mut record.difficulty,
            "CONCEPTS" => &mut record.concepts,
            _ => continue
        };
        if slot.is_empty() {
            *slot = value;
        }
    }

    record.expected_results = find_section(&lines, &EXPECTED_RE).unwrap_or_default();
    record.learning_outcomes = find_section(&lines, &OUTCOMES_RE).unwrap_or_default();
    record
}

fn parse_header(line: &str) -> Option<(String, String)> {
    let caps = HEADER_RE.as_ref()?.captures(line)?;
    let key = caps.get(1)?.as_str().to_ascii_uppercase();
    let value = caps.get(2)?.as_str().to_string();
    Some((key, value))
}

/// First section header matching `re`, with its inline value or the block
/// of comment lines that follows it.
fn find_section(lines: &[&str], re: &Option<Regex>) -> Option<String> {
    let re = re.as_ref()?;
    let (index, caps) = lines
        .iter()
        .enumerate()
        .find_map(|(i, line)| re.captures(line).map(|c| (i, c)))?;

    let inline = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    if !inline.is_empty() {
        return Some(inline.to_string());
    }

    let block: Vec<String> = lines[index + 1..]
        .iter()
        .map_while(|line| comment_text(line))
        .take_while(|text| !text.is_empty())
        .map(|text| strip_bullet(&text).to_string())
        .collect();
    Some(block.join("; "))
}

fn comment_text(line: &str) -> Option<String> {
    line.trim_start()
        .strip_prefix("--")
        .map(|rest| rest.trim().to_string())
}

fn strip_bullet(text: &str) -> &str {
    let trimmed = text.trim_start_matches(['-', '*', '•']).trim_start();
    match trimmed.split_once(". ") {
        Some((number, rest)) if number.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_case_insensitive_key() {
        assert_eq!(
            parse_header("-- purpose: Learn joins"),
            Some(("PURPOSE".to_string(), "Learn joins".to_string()))
        );
    }

    #[test]
    fn test_parse_header_rejects_plain_comment() {
        assert_eq!(parse_header("-- just a comment"), None);
    }

    #[test]
    fn test_strip_bullet() {
        assert_eq!(strip_bullet("- Learn CTEs"), "Learn CTEs");
        assert_eq!(strip_bullet("2. Use OVER"), "Use OVER");
        assert_eq!(strip_bullet("Plain"), "Plain");
    }

    #[test]
    fn test_missing_headers() {
        let record = IntentRecord {
            purpose: "x".into(),
            ..Default::default()
        };
        assert_eq!(record.missing_headers(), vec!["DIFFICULTY", "CONCEPTS"]);
    }
}
