// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use sql_exercise_grader::error::{
    config_error, database_error, file_read_error, file_write_error, llm_api_error, target_error
};

#[test]
fn test_file_read_error() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error = file_read_error("/path/to/file.sql", io_error);
    assert!(error.to_string().contains("/path/to/file.sql"));
}

#[test]
fn test_file_write_error() {
    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error = file_write_error("/out/report.json", io_error);
    assert!(error.to_string().contains("/out/report.json"));
}

#[test]
fn test_database_error_keeps_first_line_and_position() {
    let error = database_error(
        "psql:<stdin>:7: ERROR:  syntax error at or near \"SELEC\"\nLINE 1: SELEC 1;\n        ^"
    );
    let msg = error.to_string();
    assert!(msg.contains("script line 7"));
    assert!(!msg.contains("LINE 1"));
}

#[test]
fn test_database_error_without_position() {
    let msg = database_error("\n\npsql: error: connection refused").to_string();
    assert!(msg.contains("connection refused"));
}

#[test]
fn test_llm_api_error() {
    let error = llm_api_error("Empty response from LLM");
    assert!(error.to_string().contains("Empty response"));
}

#[test]
fn test_config_error() {
    let error = config_error("API key required");
    let _msg = error.to_string();
}

#[test]
fn test_target_error() {
    let error = target_error("'nope' is not a quest");
    let _msg = error.to_string();
}
