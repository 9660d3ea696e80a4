//! Helper functions for CLI operations.
//!
//! This module resolves evaluation targets into exercise files, computes the
//! process exit code and builds the LLM client from CLI flags and
//! configuration.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use super::types::{RunSummary, Target};
use crate::{
    cache::build_cache,
    cli::Provider,
    config::Config,
    error::{AppResult, config_error, target_error},
    exercise::ExerciseFile,
    llm::{FixedWindowLimiter, HttpTransport, LlmClient, LlmProvider}
};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Calculates the process exit code for a finished run.
///
/// - `2` - The database was unreachable
/// - `1` - `fail_on_error` is set and at least one file failed
/// - `0` - Otherwise
///
/// # Example
///
/// ```
/// use sql_exercise_grader::app::{RunSummary, Target, calculate_exit_code};
///
/// let summary = RunSummary::new(&Target::All, "sequential", 0);
/// assert_eq!(calculate_exit_code(&summary, true), 0);
/// ```
pub fn calculate_exit_code(summary: &RunSummary, fail_on_error: bool) -> i32 {
    if !summary.database_reachable {
        2
    } else if fail_on_error && summary.failed > 0 {
        1
    } else {
        0
    }
}

/// Interprets a target argument.
///
/// `all` selects every quest. Existing files and directories are taken as
/// paths; anything else must name a quest directory under `quests_root`.
///
/// # Errors
///
/// Returns an error if the argument matches none of the above.
pub fn parse_target(raw: &str, quests_root: &Path) -> AppResult<Target> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(Target::All);
    }
    let path = Path::new(raw);
    if path.is_file() {
        return Ok(Target::File(path.to_path_buf()));
    }
    if path.is_dir() {
        return Ok(Target::Directory(path.to_path_buf()));
    }
    if quests_root.join(raw).is_dir() {
        return Ok(Target::Quest(raw.to_string()));
    }
    Err(target_error(format!(
        "'{}' is not a file, a directory or a quest under {}",
        raw,
        quests_root.display()
    )))
}

/// Exercise files a target covers, in deterministic order.
///
/// # Errors
///
/// Returns an error if the file or directory the target names is missing.
pub fn resolve_files(target: &Target, quests_root: &Path) -> AppResult<Vec<ExerciseFile>> {
    let paths = match target {
        Target::File(path) => {
            if !path.is_file() {
                return Err(target_error(format!("No such file: {}", path.display())));
            }
            vec![path.clone()]
        }
        Target::Directory(path) => discover_sql_files(path)?,
        Target::Quest(name) => discover_sql_files(&quests_root.join(name))?,
        Target::All => discover_sql_files(quests_root)?
    };
    Ok(paths
        .iter()
        .map(|path| ExerciseFile::locate(path, quests_root))
        .collect())
}

/// All `.sql` files below `root`, sorted by path.
///
/// Entries that cannot be listed are logged and skipped.
///
/// # Errors
///
/// Returns an error if `root` is not a directory.
pub fn discover_sql_files(root: &Path) -> AppResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(target_error(format!("No such directory: {}", root.display())));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                let is_sql = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
                if entry.file_type().is_file() && is_sql {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!(error = %e, "skipping unreadable directory entry")
        }
    }
    files.sort();
    Ok(files)
}

/// Builds an LLM provider configuration from CLI parameters.
///
/// Cloud providers (OpenAI, Anthropic) require an API key.
///
/// # Errors
///
/// Returns an error if a cloud provider is selected without an API key.
pub fn build_llm_provider(
    provider: Provider,
    api_key: Option<String>,
    base_url: Option<String>,
    ollama_url: Option<String>
) -> AppResult<LlmProvider> {
    match provider {
        Provider::OpenAI => {
            let key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
                config_error("API key required for OpenAI (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::OpenAI {
                api_key:  key,
                base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
            })
        }
        Provider::Anthropic => {
            let key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
                config_error("API key required for Anthropic (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::Anthropic {
                api_key: key
            })
        }
        Provider::Ollama => Ok(LlmProvider::Ollama {
            base_url: ollama_url.unwrap_or_else(|| String::from("http://localhost:11434"))
        })
    }
}

/// Checks if LLM access is available.
///
/// Ollama needs no API key; cloud providers need a non-empty one.
pub fn has_llm_access(api_key: &Option<String>, provider: &Provider) -> bool {
    api_key.as_ref().is_some_and(|k| !k.is_empty()) || matches!(provider, Provider::Ollama)
}

/// Gets the effective model name.
///
/// Precedence: explicit flag, then configuration, then the provider default.
pub fn get_effective_model(
    model: Option<String>,
    config_model: Option<String>,
    provider: &Provider
) -> String {
    model
        .or(config_model)
        .unwrap_or_else(|| provider.default_model().to_string())
}

/// Gets the effective provider: explicit flag, then configuration, then
/// OpenAI.
///
/// # Errors
///
/// Returns an error if the configured provider name is unknown.
pub fn get_effective_provider(
    provider: Option<Provider>,
    config_provider: Option<&str>
) -> AppResult<Provider> {
    if let Some(provider) = provider {
        return Ok(provider);
    }
    match config_provider.map(str::to_ascii_lowercase).as_deref() {
        None | Some("openai") => Ok(Provider::OpenAI),
        Some("anthropic") => Ok(Provider::Anthropic),
        Some("ollama") => Ok(Provider::Ollama),
        Some(other) => Err(config_error(format!("Unknown LLM provider: {}", other)))
    }
}

/// LLM client wired with the configured cache, budget and retry policy.
///
/// Returns `None` when credentials are missing, in which case reports carry
/// the unavailable placeholder.
///
/// # Errors
///
/// Returns an error if the configured provider name is unknown.
pub fn build_llm_client(
    provider: Option<Provider>,
    api_key: Option<String>,
    model: Option<String>,
    config: &Config
) -> AppResult<Option<LlmClient<HttpTransport>>> {
    let provider = get_effective_provider(provider, config.llm.provider.as_deref())?;
    let api_key = api_key.or_else(|| config.llm.api_key.clone());
    if !has_llm_access(&api_key, &provider) {
        warn!(provider = ?provider, "no LLM credentials; reports will omit LLM analysis");
        return Ok(None);
    }
    let model = get_effective_model(model, config.llm.model.clone(), &provider);
    let llm_provider = build_llm_provider(
        provider,
        api_key,
        config.llm.base_url.clone(),
        config.llm.ollama_url.clone()
    )?;
    let cache = build_cache(&config.cache);
    let client = LlmClient::new(HttpTransport::new(llm_provider), model)
        .with_cache(cache)
        .with_rate_limiter(Box::new(FixedWindowLimiter::from_config(&config.rate_limit)))
        .with_retry_config(config.retry.clone())
        .with_task_models(config.llm.task_models.clone());
    Ok(Some(client))
}
