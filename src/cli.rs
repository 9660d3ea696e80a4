use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// SQL Exercise Grader - Execute, classify and assess SQL exercise scripts
#[derive(Parser, Debug)]
#[command(name = "sql-grader")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a file, a directory, a quest, or `all`
    Evaluate {
        /// Exercise file, directory, quest name, or `all`
        target: String,

        /// Root directory of the quest corpus
        #[arg(long)]
        quests_dir: Option<PathBuf>,

        /// Directory reports are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// How files are grouped while processing
        #[arg(short, long, value_enum, default_value = "sequential")]
        strategy: Strategy,

        /// Files per batch for the chunked strategy
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Skip LLM analysis even when credentials are available
        #[arg(long)]
        no_llm: bool,

        /// LLM analysis depth
        #[arg(long, value_enum, default_value = "comprehensive")]
        analysis: Analysis,

        /// LLM provider to use
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,

        /// API key for OpenAI or Anthropic
        #[arg(short, long, env = "LLM_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,

        /// Summary format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: Format,

        /// Exit with code 1 when any file fails
        #[arg(long)]
        fail_on_error: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool
    },

    /// Print the SQL patterns detected in a file
    Patterns {
        /// Exercise file
        file: PathBuf,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: Format
    },

    /// Print the header metadata extracted from a file
    Intent {
        /// Exercise file
        file: PathBuf,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "json")]
        format: Format
    },

    /// Check that the configured database accepts connections
    CheckDb
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Provider {
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    Ollama
}

impl Provider {
    /// Get default model for provider
    pub fn default_model(&self) -> &str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Ollama => "llama3.2"
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Strategy {
    Sequential,
    Chunked
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Analysis {
    /// One review call per file
    Comprehensive,
    /// Separate intent, validation and difficulty calls
    Granular
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml
}
