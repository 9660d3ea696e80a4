//! # SQL Exercise Grader
//!
//! Batch evaluation of SQL exercise scripts against PostgreSQL.
//!
//! `sql-grader` runs every exercise inside a transaction that is always
//! rolled back, classifies what the script does, scores it with a
//! deterministic rule set and, when credentials are available, asks an LLM
//! for a pedagogical review. One JSON report is written per exercise.
//!
//! # Pipeline
//!
//! For each exercise file, strictly one at a time:
//!
//! 1. **Execute** - the script runs as `BEGIN; <script>; ROLLBACK;` through
//!    `psql`. Explicit transaction control in the script is neutralized first
//!    so nothing can commit.
//! 2. **Classify** - header comments (`PURPOSE`, `DIFFICULTY`, `CONCEPTS`) are
//!    extracted and SQL constructs are tagged.
//! 3. **Score** - `PASS`, `FAIL` or `NEEDS_REVIEW` with a 0-10 score.
//! 4. **Review** (optional) - OpenAI, Anthropic or a local Ollama instance,
//!    behind a response cache and a request budget.
//! 5. **Write** - `<output>/<quest>/<subdirs>/<name>.json`.
//!
//! # Quick Start
//!
//! ```bash
//! # Evaluate one quest without LLM review
//! sql-grader evaluate window-functions --no-llm
//!
//! # Evaluate everything in batches of 20 with granular LLM analysis
//! export LLM_API_KEY="sk-..."
//! sql-grader evaluate all --strategy chunked --batch-size 20 --analysis granular
//!
//! # Inspect a single file
//! sql-grader patterns quests/joins/01-inner.sql
//! sql-grader intent quests/joins/01-inner.sql
//!
//! # Verify database connectivity
//! PGHOST=db PGUSER=grader sql-grader check-db
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of precedence):
//!
//! 1. Command-line arguments
//! 2. Environment variables (`LLM_API_KEY`, `PGHOST`, `SQL_GRADER_CACHE_TTL`, ...)
//! 3. `.sql-grader.toml` in current directory
//! 4. `~/.config/sql-grader/config.toml`
//!
//! ## Example Configuration
//!
//! ```toml
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [llm.task_models]
//! comprehensive = "gpt-4o"
//!
//! [database]
//! host = "localhost"
//! user = "postgres"
//! dbname = "exercises"
//!
//! [cache]
//! backend = "file"
//! ttl_secs = 3600
//!
//! [rate_limit]
//! max_requests = 10
//! window_secs = 60
//! ```
//!
//! # Exit Codes
//!
//! - `0` - Run completed
//! - `1` - `--fail-on-error` was given and at least one file failed, or the
//!   command itself failed
//! - `2` - The database was unreachable
//!
//! # Logging
//!
//! Diagnostics go to stderr through `tracing`. `RUST_LOG` selects the level;
//! `--verbose` defaults it to `debug`.

use std::{
    io::{IsTerminal, stderr},
    process
};

use clap::Parser;
use sql_exercise_grader::{
    app::{EvaluateParams, run_check_db, run_evaluate, run_intent, run_patterns},
    cli::{Cli, Commands, Format},
    config::Config,
    error::AppResult
};
use tokio::main;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sql_exercise_grader={}", default_level)));
    let fmt = fmt::layer()
        .with_writer(stderr)
        .with_target(false)
        .without_time();
    tracing_subscriber::registry().with(filter).with(fmt).init();
}

async fn run(cli: Cli) -> AppResult<i32> {
    let config = Config::load()?;

    let result = match cli.command {
        Commands::Evaluate {
            target,
            quests_dir,
            output_dir,
            strategy,
            batch_size,
            no_llm,
            analysis,
            provider,
            api_key,
            model,
            format,
            fail_on_error,
            no_color
        } => {
            let params = EvaluateParams {
                target,
                quests_dir,
                output_dir,
                strategy,
                batch_size,
                no_llm,
                analysis,
                provider,
                api_key,
                model,
                format,
                fail_on_error,
                no_color,
                verbose: cli.verbose,
                show_progress: matches!(format, Format::Text) && stderr().is_terminal()
            };
            run_evaluate(params, config).await?
        }
        Commands::Patterns {
            file,
            format
        } => run_patterns(file, format, !std::io::stdout().is_terminal())?,
        Commands::Intent {
            file,
            format
        } => run_intent(file, format)?,
        Commands::CheckDb => run_check_db(config).await
    };

    println!("{}", result.output);
    Ok(result.exit_code)
}
