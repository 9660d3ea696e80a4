// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use sql_exercise_grader::patterns::{PatternDetector, PatternSet, Signature, detect_patterns};

const TABLE_BASICS: &str = "\
CREATE TABLE users (
    id INT PRIMARY KEY,
    email TEXT UNIQUE
);
INSERT INTO users (id, email) VALUES (1, 'ada@example.com');
SELECT email FROM users;
";

fn set(tags: &[&str]) -> PatternSet {
    tags.iter().map(|t| t.to_string()).collect()
}

#[test]
fn test_detects_exact_table_basics_set() {
    assert_eq!(
        detect_patterns(TABLE_BASICS),
        set(&[
            "table_creation",
            "data_insertion",
            "data_querying",
            "primary_key",
            "unique_constraint"
        ])
    );
}

#[test]
fn test_detection_is_pure() {
    let first = detect_patterns(TABLE_BASICS);
    for _ in 0..5 {
        assert_eq!(detect_patterns(TABLE_BASICS), first);
    }
}

#[test]
fn test_empty_text_has_no_patterns() {
    assert!(detect_patterns("").is_empty());
    assert!(detect_patterns("-- just a comment\n").is_empty());
}

#[test]
fn test_window_and_cte() {
    let sql = "WITH ranked AS (\n  SELECT name, RANK() OVER (ORDER BY score DESC) AS r FROM players\n)\nSELECT * FROM ranked WHERE r <= 3;";
    let tags = detect_patterns(sql);
    assert!(tags.contains("common_table_expressions"));
    assert!(tags.contains("window_functions"));
    assert!(tags.contains("ordering"));
    assert!(tags.contains("data_querying"));
}

#[test]
fn test_json_operations() {
    let tags = detect_patterns("SELECT data->>'name' FROM events WHERE data ? 'name';");
    assert!(tags.contains("json_operations"));
}

#[test]
fn test_joins_and_aggregation() {
    let sql = "SELECT c.name, COUNT(o.id) FROM customers c LEFT JOIN orders o ON o.customer_id = c.id GROUP BY c.name HAVING COUNT(o.id) > 2;";
    let tags = detect_patterns(sql);
    for tag in ["joins", "aggregation", "grouping", "having_clause"] {
        assert!(tags.contains(tag), "missing {}", tag);
    }
}

#[test]
fn test_keyword_case_convention() {
    assert!(!detect_patterns("create table t (id int);").contains("table_creation"));
}

#[test]
fn test_custom_registry() {
    let detector = PatternDetector::empty().with_signature("upsert", Signature::Literal("ON CONFLICT"));
    assert_eq!(
        detector.detect("INSERT INTO t VALUES (1) ON CONFLICT DO NOTHING;"),
        set(&["upsert"])
    );
    assert_eq!(detector.tags().count(), 1);
}

#[test]
fn test_with_signature_replaces_existing_tag() {
    let detector = PatternDetector::new()
        .with_signature("joins", Signature::Literal("NEVER MATCHES THIS"));
    assert!(!detector.detect("SELECT * FROM a JOIN b ON a.id = b.id;").contains("joins"));
}
