//! Lexical classification of SQL text into pattern tags.
//!
//! Every tag in the registry is backed by exactly one signature, either a
//! literal substring or a regular expression. Signatures are tested
//! independently and case-sensitively against the raw text, so they follow
//! the upper-case keyword convention used by the exercise corpus (function
//! names such as `jsonb_build_object` stay lower-case).
//!
//! This is a best-effort classifier, not a parser: a keyword inside a string
//! literal or comment still counts.
//!
//! # Example
//!
//! ```
//! use sql_exercise_grader::patterns::detect_patterns;
//!
//! let tags = detect_patterns("CREATE TABLE t (id INT PRIMARY KEY);");
//! assert!(tags.contains("table_creation"));
//! assert!(tags.contains("primary_key"));
//! ```

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;

/// Ordered set of detected tags.
pub type PatternSet = BTreeSet<String>;

/// How a tag is recognized in raw SQL text.
#[derive(Debug, Clone)]
pub enum Signature {
    /// Plain substring match
    Literal(&'static str),
    /// Regular expression match
    Pattern(Regex)
}

impl Signature {
    fn matches(&self, sql: &str) -> bool {
        match self {
            Self::Literal(needle) => sql.contains(needle),
            Self::Pattern(re) => re.is_match(sql)
        }
    }
}

/// A single registry entry.
#[derive(Debug, Clone)]
pub struct PatternSignature {
    pub tag:       String,
    pub signature: Signature
}

/// Registry-driven pattern detector.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    signatures: Vec<PatternSignature>
}

static DEFAULT_DETECTOR: LazyLock<PatternDetector> = LazyLock::new(PatternDetector::new);

/// Literal signatures from the default registry.
const LITERAL_SIGNATURES: &[(&str, &str)] = &[
    ("table_creation", "CREATE TABLE"),
    ("table_alteration", "ALTER TABLE"),
    ("data_insertion", "INSERT INTO"),
    ("data_deletion", "DELETE FROM"),
    ("primary_key", "PRIMARY KEY"),
    ("unique_constraint", "UNIQUE"),
    ("not_null_constraint", "NOT NULL"),
    ("grouping", "GROUP BY"),
    ("having_clause", "HAVING"),
    ("ordering", "ORDER BY"),
    ("recursive_cte", "WITH RECURSIVE"),
    ("upsert", "ON CONFLICT")
];

/// Regular-expression signatures from the default registry.
const REGEX_SIGNATURES: &[(&str, &str)] = &[
    ("data_querying", r"(?s)\bSELECT\b.*?\bFROM\b"),
    ("data_update", r"(?s)\bUPDATE\s+\w+.*?\bSET\b"),
    ("foreign_key", r"FOREIGN KEY|\bREFERENCES\s+\w+"),
    ("check_constraint", r"\bCHECK\s*\("),
    ("default_values", r"\bDEFAULT\b"),
    ("index_creation", r"CREATE\s+(UNIQUE\s+)?INDEX"),
    (
        "view_creation",
        r"CREATE\s+(OR\s+REPLACE\s+)?(MATERIALIZED\s+)?VIEW"
    ),
    ("function_creation", r"CREATE\s+(OR\s+REPLACE\s+)?(FUNCTION|PROCEDURE)"),
    ("trigger_creation", r"CREATE\s+(OR\s+REPLACE\s+)?TRIGGER"),
    ("joins", r"\bJOIN\b"),
    ("aggregation", r"\b(COUNT|SUM|AVG|MIN|MAX)\s*\("),
    ("subqueries", r"\(\s*SELECT\b"),
    ("common_table_expressions", r"\bWITH\s+\w+\s+AS\s*\("),
    ("window_functions", r"\bOVER\s*\("),
    ("json_operations", r"\bJSONB?\b|->>?|#>>?|\bjsonb?_[a-z_]+\s*\("),
    ("array_operations", r"\bARRAY\[|\bANY\s*\(|\bunnest\s*\("),
    ("set_operations", r"\b(UNION|INTERSECT|EXCEPT)\b"),
    ("conditional_logic", r"(?s)\bCASE\b.*?\bWHEN\b"),
    ("null_handling", r"\b(COALESCE|NULLIF)\s*\(|\bIS\s+(NOT\s+)?NULL\b"),
    ("pagination", r"\bLIMIT\s+\d+|\bOFFSET\s+\d+|\bFETCH\s+(FIRST|NEXT)\b"),
    ("returning_clause", r"\bRETURNING\b"),
    ("full_text_search", r"\bto_tsvector\s*\(|\bto_tsquery\s*\(|@@"),
    (
        "date_time_operations",
        r"\b(CURRENT_DATE|CURRENT_TIMESTAMP|INTERVAL|NOW\(\)|DATE_TRUNC|EXTRACT\s*\()|\bdate_trunc\s*\("
    ),
    (
        "transaction_control",
        r"(?m)^\s*(BEGIN|START TRANSACTION|COMMIT|ROLLBACK|SAVEPOINT)\b"
    )
];

impl PatternDetector {
    /// Detector loaded with the default registry.
    pub fn new() -> Self {
        let mut signatures = Vec::with_capacity(LITERAL_SIGNATURES.len() + REGEX_SIGNATURES.len());
        for (tag, needle) in LITERAL_SIGNATURES {
            signatures.push(PatternSignature {
                tag:       (*tag).to_string(),
                signature: Signature::Literal(needle)
            });
        }
        for (tag, pattern) in REGEX_SIGNATURES {
            // Registry patterns are compile-time constants covered by tests.
            if let Ok(re) = Regex::new(pattern) {
                signatures.push(PatternSignature {
                    tag:       (*tag).to_string(),
                    signature: Signature::Pattern(re)
                });
            }
        }
        Self {
            signatures
        }
    }

    /// Detector with no signatures at all.
    pub fn empty() -> Self {
        Self {
            signatures: Vec::new()
        }
    }

    /// Register an additional tag, replacing any existing signature for it.
    #[must_use]
    pub fn with_signature(mut self, tag: impl Into<String>, signature: Signature) -> Self {
        let tag = tag.into();
        self.signatures.retain(|s| s.tag != tag);
        self.signatures.push(PatternSignature {
            tag,
            signature
        });
        self
    }

    /// Registered tag names in registry order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(|s| s.tag.as_str())
    }

    /// Classify SQL text. Pure: identical input yields an identical set.
    pub fn detect(&self, sql: &str) -> PatternSet {
        self.signatures
            .iter()
            .filter(|s| s.signature.matches(sql))
            .map(|s| s.tag.clone())
            .collect()
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify SQL text with the default registry.
pub fn detect_patterns(sql: &str) -> PatternSet {
    DEFAULT_DETECTOR.detect(sql)
}
