pub use masterror::{AppError, AppResult};

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create file write error
pub fn file_write_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to write file '{}': {}", path, source))
}

/// Create database error (probe failures, engine spawn problems)
pub fn database_error(message: impl Into<String>) -> AppError {
    AppError::service(format_database_error(&message.into()))
}

/// Create LLM API error
pub fn llm_api_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create HTTP error
pub fn http_error(err: reqwest::Error) -> AppError {
    let msg = if err.is_timeout() {
        format!("Request timeout: {}", err)
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else if err.is_status() {
        format!("HTTP error {}: {}", err.status().unwrap_or_default(), err)
    } else {
        err.to_string()
    };
    AppError::service(msg)
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create error for an evaluation target that cannot be resolved
pub fn target_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Keep only the first engine diagnostic line, prefixed with its position.
///
/// psql reports problems as `psql:<stdin>:12: ERROR:  ...` followed by
/// `LINE 1:` context lines that are noise in a one-line error message.
fn format_database_error(message: &str) -> String {
    let first = message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("unknown database error");

    match extract_script_line(first) {
        Some(line) => format!("Database error at script line {}: {}", line, first),
        None => format!("Database error: {}", first)
    }
}

fn extract_script_line(message: &str) -> Option<usize> {
    // "psql:<stdin>:12: ERROR: ..."
    let rest = message.strip_prefix("psql:")?;
    let mut parts = rest.splitn(3, ':');
    let _source = parts.next()?;
    parts.next()?.trim().parse().ok()
}
