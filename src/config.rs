//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.sql-grader.toml` in current directory
//! 4. `~/.config/sql-grader/config.toml`
//! 5. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [llm]
//! provider = "openai"          # openai, anthropic, ollama
//! model = "gpt-4o-mini"
//! api_key = "sk-..."           # or use LLM_API_KEY env var
//!
//! [llm.task_models]
//! comprehensive = "gpt-4o"
//!
//! [database]
//! host = "localhost"
//! port = 5432
//! user = "postgres"
//! dbname = "postgres"
//!
//! [cache]
//! backend = "file"             # file, memory
//! ttl_secs = 3600
//!
//! [rate_limit]
//! max_requests = 10
//! window_secs = 60
//!
//! [batch]
//! size = 10
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `LLM_API_KEY` | API key for OpenAI/Anthropic |
//! | `LLM_PROVIDER` | Provider name |
//! | `LLM_MODEL` | Model identifier |
//! | `LLM_BASE_URL` | OpenAI-compatible base URL |
//! | `OLLAMA_URL` | Ollama base URL |
//! | `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`, `PGDATABASE` | Database connection |
//! | `SQL_GRADER_CACHE_TTL` | Cache TTL in seconds |
//! | `SQL_GRADER_RATE_LIMIT` | Requests allowed per window |
//! | `SQL_GRADER_RATE_WINDOW` | Rate window in seconds |
//! | `SQL_GRADER_BATCH_SIZE` | Files per chunk for the chunked strategy |

use std::{collections::HashMap, env, fs, path::PathBuf, str::FromStr};

use serde::Deserialize;

use crate::error::{AppResult, config_error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm:        LlmConfig,
    #[serde(default)]
    pub retry:      RetryConfig,
    #[serde(default)]
    pub database:   DatabaseConfig,
    #[serde(default)]
    pub cache:      CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub batch:      BatchConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider:    Option<String>,
    pub api_key:     Option<String>,
    pub model:       Option<String>,
    pub base_url:    Option<String>,
    pub ollama_url:  Option<String>,
    /// Per-task model overrides (intent, validation, difficulty, comprehensive)
    pub task_models: HashMap<String, String>
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider:    None,
            api_key:     None,
            model:       None,
            base_url:    None,
            ollama_url:  Some(String::from("http://localhost:11434")),
            task_models: HashMap::new()
        }
    }
}

/// Retry configuration for LLM requests
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries:      u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms:     u64,
    pub backoff_factor:   f64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries:      3,
            initial_delay_ms: 1000,
            max_delay_ms:     30000,
            backoff_factor:   2.0
        }
    }
}

/// Database connection used by the sandbox
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host:          String,
    pub port:          u16,
    pub user:          String,
    pub password:      Option<String>,
    pub dbname:        String,
    /// psql binary to invoke
    pub psql_path:     String,
    /// Abort the script at the first error instead of running to the end
    pub stop_on_error: bool,
    pub timeout_secs:  u64
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host:          String::from("localhost"),
            port:          5432,
            user:          String::from("postgres"),
            password:      None,
            dbname:        String::from("postgres"),
            psql_path:     String::from("psql"),
            stop_on_error: false,
            timeout_secs:  120
        }
    }
}

/// Cache storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Memory
}

/// Evaluation cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled:   bool,
    pub backend:   CacheBackend,
    pub directory: PathBuf,
    pub ttl_secs:  u64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled:   true,
            backend:   CacheBackend::File,
            directory: PathBuf::from(".sql-grader/cache"),
            ttl_secs:  3600
        }
    }
}

/// LLM request budget
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs:  u64
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs:  60
        }
    }
}

/// Batch orchestration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size:              usize,
    pub progress_interval: usize,
    pub quests_dir:        PathBuf,
    pub output_dir:        PathBuf
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size:              10,
            progress_interval: 5,
            quests_dir:        PathBuf::from("quests"),
            output_dir:        PathBuf::from("ai-evaluations")
        }
    }
}

/// Basic (non-LLM) scoring thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Patterns required for PASS on a clean run
    pub min_patterns: usize
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            min_patterns: 2
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (.sql-grader.toml)
    /// 3. Config file in home directory (~/.config/sql-grader/config.toml)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sql-grader")
                .join("config.toml");

            if home_config.exists() {
                config = Self::from_file(&home_config)?;
            }
        }

        let local_config = PathBuf::from(".sql-grader.toml");
        if local_config.exists() {
            config = Self::from_file(&local_config)?;
        }

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &std::path::Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse TOML configuration text
    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// Override fields from environment-style variables
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>
    {
        if let Some(api_key) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = Some(provider);
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = Some(url);
        }

        if let Some(host) = lookup("PGHOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("PGPORT") {
            self.database.port = parse_env("PGPORT", &port)?;
        }
        if let Some(user) = lookup("PGUSER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("PGPASSWORD") {
            self.database.password = Some(password);
        }
        if let Some(dbname) = lookup("PGDATABASE") {
            self.database.dbname = dbname;
        }

        if let Some(ttl) = lookup("SQL_GRADER_CACHE_TTL") {
            self.cache.ttl_secs = parse_env("SQL_GRADER_CACHE_TTL", &ttl)?;
        }
        if let Some(limit) = lookup("SQL_GRADER_RATE_LIMIT") {
            self.rate_limit.max_requests = parse_env("SQL_GRADER_RATE_LIMIT", &limit)?;
        }
        if let Some(window) = lookup("SQL_GRADER_RATE_WINDOW") {
            self.rate_limit.window_secs = parse_env("SQL_GRADER_RATE_WINDOW", &window)?;
        }
        if let Some(size) = lookup("SQL_GRADER_BATCH_SIZE") {
            self.batch.size = parse_env("SQL_GRADER_BATCH_SIZE", &size)?;
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| config_error(format!("Invalid value for {}: '{}'", key, value)))
}
