//! Rolled-back execution of exercise scripts.
//!
//! The sandbox wraps a script as `BEGIN; <script>; ROLLBACK;` and hands the
//! whole unit to a [`SqlEngine`] over a single connection. Everything the
//! engine prints, errors included, is captured as text and summarized into
//! an [`ExecutionResult`]. The sandbox never returns an error: unreadable
//! files, missing client binaries, refused connections and timeouts all
//! become a failed result.
//!
//! # Idempotence
//!
//! PostgreSQL DDL is transactional, so the trailing `ROLLBACK` undoes table
//! creation as well as data changes. Two holes remain and are handled here:
//!
//! - An exercise that issues its own `COMMIT` (or `ABORT`, `PREPARE
//!   TRANSACTION`, a psql `\c` reconnect, ...) would end the wrapping
//!   transaction early. Such statements are neutralized before wrapping
//!   (see [`neutralize_transaction_control`]).
//! - A script that ends inside an unterminated string or dollar quote
//!   swallows the `ROLLBACK`. psql then hits end of input and disconnects,
//!   and the server aborts the open transaction.
//!
//! Engines that auto-commit DDL would still break the guarantee; this
//! module only targets PostgreSQL.

mod metrics;
mod psql;

use std::{future::Future, path::Path, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::{
    metrics::{OutputMetrics, count_markers},
    psql::PsqlEngine
};
use crate::error::AppResult;

/// Raw output of one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Process exit code; `None` when killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout:    String,
    pub stderr:    String
}

impl EngineOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr.
    ///
    /// The streams are captured separately, so diagnostics are not
    /// interleaved with result sets. Each psql diagnostic carries its script
    /// line (`psql:<stdin>:12: ERROR: ...`) and, with `-b`, the failed
    /// statement, which is what ties an error back to its source.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Something that can run a SQL script over one connection.
///
/// `Err` means the engine could not be driven at all (client missing,
/// timeout); SQL-level failures are reported through [`EngineOutput`].
pub trait SqlEngine {
    fn run_script(&self, script: &str) -> impl Future<Output = AppResult<EngineOutput>> + Send;
}

/// Summary of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success:           bool,
    #[serde(rename = "output_lines")]
    pub output_line_count: usize,
    #[serde(rename = "errors")]
    pub error_count:       usize,
    #[serde(rename = "warnings")]
    pub warning_count:     usize,
    #[serde(rename = "result_sets")]
    pub result_set_count:  usize,
    pub raw_output:        String,
    /// Transaction-control statements removed before execution.
    #[serde(skip)]
    pub neutralized:       Vec<String>
}

impl ExecutionResult {
    /// Failed result for a run that never produced engine output.
    pub fn failure(message: impl Into<String>) -> Self {
        let raw_output = message.into();
        let metrics = count_markers(&raw_output);
        Self {
            success:           false,
            output_line_count: metrics.lines,
            error_count:       metrics.errors.max(1),
            warning_count:     metrics.warnings,
            result_set_count:  metrics.result_sets,
            raw_output,
            neutralized:       Vec::new()
        }
    }

    fn from_engine(output: &EngineOutput, neutralized: Vec<String>) -> Self {
        let raw_output = output.combined();
        let metrics = count_markers(&raw_output);
        let success = output.succeeded();
        let error_count = if success {
            metrics.errors
        } else {
            metrics.errors.max(1)
        };
        Self {
            success,
            output_line_count: metrics.lines,
            error_count,
            warning_count: metrics.warnings,
            result_set_count: metrics.result_sets,
            raw_output,
            neutralized
        }
    }
}

static TX_CONTROL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?isx)^(?:
            (?:BEGIN|START\s+TRANSACTION)(?:\s.*)?
          | (?:COMMIT|END|ABORT|ROLLBACK)(?:\s+(?:WORK|TRANSACTION))?(?:\s+AND\s+(?:NO\s+)?CHAIN)?
          | PREPARE\s+TRANSACTION\s.*
          | (?:COMMIT|ROLLBACK)\s+PREPARED\s.*
        )$"
    )
    .ok()
});

static DOLLAR_TAG_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\$(?:[A-Za-z_][A-Za-z0-9_]*)?\$").ok());

/// Script after transaction-control neutralization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedScript {
    pub sql:         String,
    pub neutralized: Vec<String>
}

/// Whether a top-level statement (comments stripped) would end, split off or
/// restart the wrapping transaction.
pub fn is_transaction_control(statement: &str) -> bool {
    let statement = statement.trim().trim_end_matches(';').trim_end();
    TX_CONTROL_RE
        .as_ref()
        .is_some_and(|re| re.is_match(statement))
}

/// Comment out everything that could escape the wrapping transaction.
///
/// The script is split into statements the way psql splits it: semicolons
/// inside quotes, dollar-quoted bodies, comments and `BEGIN ATOMIC ... END`
/// routine bodies do not end a statement. Top-level transaction control
/// (`BEGIN`, `COMMIT [AND CHAIN]`, `ABORT`, `PREPARE TRANSACTION`, ...) is
/// replaced by a block comment, and psql meta-commands (`\c`, `\i`, ...) are
/// commented out up to the end of their line. Line numbering is preserved.
pub fn neutralize_transaction_control(sql: &str) -> PreparedScript {
    Neutralizer::new(sql).run()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    Code,
    LineComment,
    BlockComment(usize),
    Quoted { escapes: bool },
    QuotedIdent,
    Dollar(String)
}

struct Neutralizer<'a> {
    sql:         &'a str,
    chars:       Vec<(usize, char)>,
    out:         String,
    copied:      usize,
    neutralized: Vec<String>,
    start:       Option<usize>,
    code:        String,
    head:        Vec<String>,
    parens:      usize,
    begin_depth: usize,
    last_word:   Option<(usize, String)>
}

impl<'a> Neutralizer<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            sql,
            chars: sql.char_indices().collect(),
            out: String::with_capacity(sql.len()),
            copied: 0,
            neutralized: Vec::new(),
            start: None,
            code: String::new(),
            head: Vec::new(),
            parens: 0,
            begin_depth: 0,
            last_word: None
        }
    }

    fn run(mut self) -> PreparedScript {
        let mut state = ScanState::Code;
        let mut i = 0;
        while i < self.chars.len() {
            let (pos, c) = self.chars[i];
            let next = self.chars.get(i + 1).map(|&(_, n)| n);
            match state {
                ScanState::Code => {
                    i = self.scan_code(i, pos, c, next, &mut state);
                }
                ScanState::LineComment => {
                    if c == '\n' {
                        state = ScanState::Code;
                    }
                    i += 1;
                }
                ScanState::BlockComment(depth) => {
                    if c == '/' && next == Some('*') {
                        state = ScanState::BlockComment(depth + 1);
                        i += 2;
                    } else if c == '*' && next == Some('/') {
                        state = if depth > 1 {
                            ScanState::BlockComment(depth - 1)
                        } else {
                            ScanState::Code
                        };
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                ScanState::Quoted {
                    escapes
                } => {
                    self.code.push(c);
                    if escapes && c == '\\' {
                        if let Some(n) = next {
                            self.code.push(n);
                        }
                        i += 2;
                    } else if c == '\'' && next == Some('\'') {
                        self.code.push('\'');
                        i += 2;
                    } else {
                        if c == '\'' {
                            state = ScanState::Code;
                        }
                        i += 1;
                    }
                }
                ScanState::QuotedIdent => {
                    self.code.push(c);
                    if c == '"' && next == Some('"') {
                        self.code.push('"');
                        i += 2;
                    } else {
                        if c == '"' {
                            state = ScanState::Code;
                        }
                        i += 1;
                    }
                }
                ScanState::Dollar(ref tag) => {
                    if self.sql[pos..].starts_with(tag.as_str()) {
                        self.code.push_str(tag);
                        i += tag.chars().count();
                        state = ScanState::Code;
                    } else {
                        self.code.push(c);
                        i += 1;
                    }
                }
            }
        }
        self.finish_statement(self.sql.len());
        self.out.push_str(&self.sql[self.copied..]);

        PreparedScript {
            sql:         self.out,
            neutralized: self.neutralized
        }
    }

    /// Handle one character outside quotes and comments; returns the next
    /// character index.
    fn scan_code(
        &mut self,
        i: usize,
        pos: usize,
        c: char,
        next: Option<char>,
        state: &mut ScanState
    ) -> usize {
        match c {
            '-' if next == Some('-') => {
                self.push_separator();
                *state = ScanState::LineComment;
                i + 2
            }
            '/' if next == Some('*') => {
                self.push_separator();
                *state = ScanState::BlockComment(1);
                i + 2
            }
            '\'' => {
                let escapes = self
                    .last_word
                    .as_ref()
                    .is_some_and(|(end, word)| *end == pos && word.eq_ignore_ascii_case("e"));
                self.push_code(pos, c);
                *state = ScanState::Quoted {
                    escapes
                };
                i + 1
            }
            '"' => {
                self.push_code(pos, c);
                *state = ScanState::QuotedIdent;
                i + 1
            }
            '$' => {
                let tag = DOLLAR_TAG_RE
                    .as_ref()
                    .and_then(|re| re.find(&self.sql[pos..]))
                    .map(|m| m.as_str().to_string());
                self.push_code(pos, c);
                match tag {
                    Some(tag) => {
                        self.code.push_str(&tag[1..]);
                        let skip = tag.chars().count();
                        *state = ScanState::Dollar(tag);
                        i + skip
                    }
                    None => i + 1
                }
            }
            '\\' => self.neutralize_meta_command(i, pos),
            ';' => {
                self.push_code(pos, c);
                if self.begin_depth == 0 {
                    self.finish_statement(pos + 1);
                }
                i + 1
            }
            '(' => {
                self.parens += 1;
                self.push_code(pos, c);
                i + 1
            }
            ')' => {
                self.parens = self.parens.saturating_sub(1);
                self.push_code(pos, c);
                i + 1
            }
            c if c.is_alphabetic() || c == '_' => self.scan_word(i, pos),
            c if c.is_whitespace() => {
                if self.start.is_some() {
                    self.code.push(c);
                }
                i + 1
            }
            c => {
                self.push_code(pos, c);
                i + 1
            }
        }
    }

    fn scan_word(&mut self, i: usize, pos: usize) -> usize {
        let mut j = i;
        while let Some(&(_, c)) = self.chars.get(j) {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                j += 1;
            } else {
                break;
            }
        }
        let end = self.chars.get(j).map_or(self.sql.len(), |&(p, _)| p);
        let word = self.sql[pos..end].to_string();
        if self.start.is_none() {
            self.start = Some(pos);
        }
        self.code.push_str(&word);
        self.track_routine_body(&word);
        self.last_word = Some((end, word));
        j
    }

    /// Follow `BEGIN ... END` nesting inside `CREATE [OR REPLACE]
    /// FUNCTION|PROCEDURE` so semicolons in SQL-standard bodies stay inside
    /// the statement.
    fn track_routine_body(&mut self, word: &str) {
        let lower = word.to_ascii_lowercase();
        if self.head.len() < 4 {
            self.head.push(lower.clone());
        }

        let head: Vec<&str> = self.head.iter().map(String::as_str).collect();
        let routine = matches!(
            head.as_slice(),
            ["create", "function" | "procedure", ..]
                | ["create", "or", "replace", "function" | "procedure", ..]
        );
        if !routine || self.parens > 0 {
            return;
        }
        match lower.as_str() {
            "begin" => self.begin_depth += 1,
            "case" if self.begin_depth > 0 => self.begin_depth += 1,
            "end" => self.begin_depth = self.begin_depth.saturating_sub(1),
            _ => {}
        }
    }

    /// psql runs the pending statement before a meta-command, so the
    /// statement is checked first; the command itself extends to the end of
    /// the line.
    fn neutralize_meta_command(&mut self, i: usize, pos: usize) -> usize {
        self.finish_statement(pos);
        let eol = self.sql[pos..].find('\n').map_or(self.sql.len(), |n| pos + n);
        let command = self.sql[pos..eol].trim_end().to_string();

        self.out.push_str(&self.sql[self.copied..pos]);
        self.out.push_str("-- [sandbox] removed: ");
        self.out.push_str(&command);
        self.copied = eol;
        self.neutralized.push(command);

        let mut j = i;
        while self.chars.get(j).is_some_and(|&(p, _)| p < eol) {
            j += 1;
        }
        j
    }

    fn push_code(&mut self, pos: usize, c: char) {
        if self.start.is_none() {
            self.start = Some(pos);
        }
        self.code.push(c);
    }

    fn push_separator(&mut self) {
        if self.start.is_some() {
            self.code.push(' ');
        }
    }

    fn finish_statement(&mut self, end: usize) {
        if let Some(start) = self.start.take() {
            let statement = self.code.split_whitespace().collect::<Vec<_>>().join(" ");
            if is_transaction_control(&statement) {
                self.out.push_str(&self.sql[self.copied..start]);
                self.out.push_str("/* [sandbox] removed: ");
                self.out.push_str(&statement.replace("*/", "* /"));
                self.out.push_str(" */");
                for _ in self.sql[start..end].matches('\n') {
                    self.out.push('\n');
                }
                self.copied = end;
                self.neutralized.push(statement);
            }
        }
        self.code.clear();
        self.head.clear();
        self.parens = 0;
        self.begin_depth = 0;
        self.last_word = None;
    }
}

/// Wrap a prepared script in a transaction that is always rolled back.
pub fn wrap_in_rollback(sql: &str) -> String {
    format!("BEGIN;\n{}\n;\nROLLBACK;\n", sql.trim_end())
}

/// Executes exercise scripts inside a rolled-back transaction.
#[derive(Debug, Clone)]
pub struct Sandbox<E> {
    engine: E
}

impl<E: SqlEngine> Sandbox<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Read and execute an exercise file.
    pub async fn execute(&self, path: &Path) -> ExecutionResult {
        match std::fs::read_to_string(path) {
            Ok(sql) => self.execute_sql(&sql).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read exercise");
                ExecutionResult::failure(format!(
                    "ERROR: cannot read '{}': {}",
                    path.display(),
                    e
                ))
            }
        }
    }

    /// Execute already-loaded exercise text.
    pub async fn execute_sql(&self, sql: &str) -> ExecutionResult {
        let prepared = neutralize_transaction_control(sql);
        if !prepared.neutralized.is_empty() {
            debug!(statements = ?prepared.neutralized, "neutralized transaction control");
        }
        let script = wrap_in_rollback(&prepared.sql);
        match self.engine.run_script(&script).await {
            Ok(output) => {
                let result = ExecutionResult::from_engine(&output, prepared.neutralized);
                debug!(
                    success = result.success,
                    errors = result.error_count,
                    warnings = result.warning_count,
                    result_sets = result.result_set_count,
                    "sandboxed run finished"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "engine invocation failed");
                let mut result = ExecutionResult::failure(format!("ERROR: {}", e));
                result.neutralized = prepared.neutralized;
                result
            }
        }
    }

    /// Whether the database accepts a trivial query at all.
    pub async fn probe(&self) -> bool {
        match self.engine.run_script("SELECT 1;\n").await {
            Ok(output) if output.succeeded() && count_markers(&output.combined()).errors == 0 => {
                true
            }
            Ok(output) => {
                warn!(output = %output.combined().trim(), "database probe failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "database probe failed");
                false
            }
        }
    }
}
