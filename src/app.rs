//! Application logic for the SQL Exercise Grader CLI.
//!
//! This module contains the command implementations separated from the main
//! entry point to enable testing.

mod convert;
mod helpers;
mod orchestrator;
mod strategy;
mod types;

use std::{
    fs,
    path::{Path, PathBuf}
};

pub use self::{
    convert::{convert_analysis, convert_format, convert_strategy},
    helpers::{
        DEFAULT_OPENAI_BASE_URL, build_llm_client, build_llm_provider, calculate_exit_code,
        discover_sql_files, get_effective_model, get_effective_provider, has_llm_access,
        parse_target, resolve_files
    },
    orchestrator::Orchestrator,
    strategy::{Chunked, ExecutionStrategy, Sequential},
    types::{FileOutcome, FileStage, RunSettings, RunSummary, Tally, Target}
};
use crate::{
    cli::{Analysis, Format, Provider, Strategy},
    config::Config,
    error::{AppResult, file_read_error},
    intent::extract_intent,
    output::{OutputOptions, format_intent, format_patterns, format_summary},
    patterns::detect_patterns,
    report::EvaluationCriteria,
    sandbox::{PsqlEngine, Sandbox}
};

/// Parameters for the evaluate command
#[derive(Debug, Clone)]
pub struct EvaluateParams {
    pub target:        String,
    pub quests_dir:    Option<PathBuf>,
    pub output_dir:    Option<PathBuf>,
    pub strategy:      Strategy,
    pub batch_size:    Option<usize>,
    pub no_llm:        bool,
    pub analysis:      Analysis,
    pub provider:      Option<Provider>,
    pub api_key:       Option<String>,
    pub model:         Option<String>,
    pub format:        Format,
    pub fail_on_error: bool,
    pub no_color:      bool,
    pub verbose:       bool,
    pub show_progress: bool
}

/// Result of a command: what to print and how to exit
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: i32,
    pub output:    String
}

/// Run the evaluate command
pub async fn run_evaluate(params: EvaluateParams, config: Config) -> AppResult<CommandResult> {
    let quests_root = params
        .quests_dir
        .unwrap_or_else(|| config.batch.quests_dir.clone());
    let output_root = params
        .output_dir
        .unwrap_or_else(|| config.batch.output_dir.clone());
    let target = parse_target(&params.target, &quests_root)?;

    let settings = RunSettings {
        quests_root,
        output_root,
        criteria: EvaluationCriteria {
            min_patterns: config.evaluation.min_patterns
        },
        analysis_mode: convert_analysis(params.analysis),
        progress_interval: config.batch.progress_interval,
        show_progress: params.show_progress
    };
    let batch_size = params.batch_size.unwrap_or(config.batch.size);
    let strategy = convert_strategy(params.strategy, batch_size);
    let sandbox = Sandbox::new(PsqlEngine::new(config.database.clone()));

    let llm_client = if params.no_llm {
        None
    } else {
        build_llm_client(params.provider, params.api_key, params.model, &config)?
    };

    let orchestrator = Orchestrator::new(sandbox, settings).with_strategy(strategy);
    let summary = match llm_client {
        Some(client) => orchestrator.with_llm(client).run(&target).await?,
        None => orchestrator.run(&target).await?
    };

    let output_opts = OutputOptions {
        format:  convert_format(params.format),
        colored: !params.no_color,
        verbose: params.verbose
    };
    Ok(CommandResult {
        exit_code: calculate_exit_code(&summary, params.fail_on_error),
        output:    format_summary(&summary, &output_opts)
    })
}

/// Run the patterns command
pub fn run_patterns(file: PathBuf, format: Format, no_color: bool) -> AppResult<CommandResult> {
    let sql = read_exercise(&file)?;
    let patterns = detect_patterns(&sql);
    let output_opts = OutputOptions {
        format:  convert_format(format),
        colored: !no_color,
        verbose: false
    };
    Ok(CommandResult {
        exit_code: 0,
        output:    format_patterns(&patterns, &output_opts)
    })
}

/// Run the intent command
pub fn run_intent(file: PathBuf, format: Format) -> AppResult<CommandResult> {
    let sql = read_exercise(&file)?;
    let mut intent = extract_intent(&sql);
    intent.sql_patterns = detect_patterns(&sql).into_iter().collect();
    let output_opts = OutputOptions {
        format:  convert_format(format),
        colored: false,
        verbose: false
    };
    Ok(CommandResult {
        exit_code: 0,
        output:    format_intent(&intent, &output_opts)
    })
}

fn read_exercise(path: &Path) -> AppResult<String> {
    fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))
}

/// Run the check-db command
pub async fn run_check_db(config: Config) -> CommandResult {
    let db = &config.database;
    let target = format!("{}@{}:{}/{}", db.user, db.host, db.port, db.dbname);
    let sandbox = Sandbox::new(PsqlEngine::new(config.database.clone()));
    if sandbox.probe().await {
        CommandResult {
            exit_code: 0,
            output:    format!("Database reachable: {}", target)
        }
    } else {
        CommandResult {
            exit_code: 2,
            output:    format!("Database unreachable: {}", target)
        }
    }
}
