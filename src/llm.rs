//! Rate-limited, caching LLM client for exercise assessment.
//!
//! Every call goes through the same path:
//!
//! ```text
//! prompt ──▶ cache lookup ──hit──▶ cached payload
//!                │
//!               miss
//!                ▼
//!         rate limiter (blocks when over budget)
//!                ▼
//!         transport (retry with backoff) ──▶ cache store ──▶ payload
//! ```
//!
//! # Supported Providers
//!
//! | Provider | Endpoint | Authentication |
//! |----------|----------|----------------|
//! | OpenAI (and compatible gateways) | `{base_url}/chat/completions` | Bearer token |
//! | Anthropic | `api.anthropic.com` | x-api-key header |
//! | Ollama | Local (configurable) | None |
//!
//! # Task Profiles
//!
//! Each [`TaskType`] maps to a fixed temperature and token budget. Narrow
//! tasks run colder and shorter than the comprehensive review.
//!
//! # Example
//!
//! ```
//! use sql_exercise_grader::llm::{HttpTransport, LlmClient, LlmProvider};
//!
//! let provider = LlmProvider::Ollama {
//!     base_url: "http://localhost:11434".into()
//! };
//!
//! let client = LlmClient::new(HttpTransport::new(provider), "llama3.2");
//! ```

pub mod extract;
pub mod prompts;
pub mod rate_limit;

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration
};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

pub use self::{
    extract::{error_object, extract_json, is_error_object},
    rate_limit::{FixedWindowLimiter, RateLimiter, RateWindow, Unlimited}
};
use crate::{
    cache::{Cache, MemoryCache, cache_key},
    config::RetryConfig,
    error::{AppError, AppResult, http_error, llm_api_error},
    report::EvaluationReport
};

/// Kind of analysis requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Intent,
    Validation,
    Difficulty,
    Comprehensive
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Intent,
        TaskType::Validation,
        TaskType::Difficulty,
        TaskType::Comprehensive
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Validation => "validation",
            Self::Difficulty => "difficulty",
            Self::Comprehensive => "comprehensive"
        }
    }

    /// Sampling temperature and token budget.
    pub fn sampling(self) -> (f32, u32) {
        match self {
            Self::Intent => (0.2, 1000),
            Self::Validation => (0.1, 800),
            Self::Difficulty => (0.1, 600),
            Self::Comprehensive => (0.3, 2500)
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model settings resolved for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProfile {
    pub model:       String,
    pub temperature: f32,
    pub max_tokens:  u32
}

/// How much LLM analysis to run per file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnalysisMode {
    /// One comprehensive call
    #[default]
    Comprehensive,
    /// Separate intent, validation and difficulty calls
    Granular
}

/// LLM provider configuration with authentication credentials.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenAI chat completions or any compatible gateway
    OpenAI {
        /// API key (sk-...)
        api_key:  String,
        /// Base URL without the `/chat/completions` suffix
        base_url: String
    },
    /// Anthropic Messages API
    Anthropic {
        /// API key
        api_key: String
    },
    /// Local Ollama instance
    Ollama {
        /// Base URL (e.g., "http://localhost:11434")
        base_url: String
    }
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI {
                ..
            } => "OpenAI",
            Self::Anthropic {
                ..
            } => "Anthropic",
            Self::Ollama {
                ..
            } => "Ollama"
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role:    String,
    pub content: String
}

/// Provider-neutral chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model:       String,
    pub messages:    Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens:  u32
}

impl ChatRequest {
    pub fn new(profile: &TaskProfile, system_prompt: &str, user_prompt: &str) -> Self {
        Self {
            model:       profile.model.clone(),
            messages:    vec![
                ChatMessage {
                    role:    String::from("system"),
                    content: system_prompt.to_string()
                },
                ChatMessage {
                    role:    String::from("user"),
                    content: user_prompt.to_string()
                }
            ],
            temperature: profile.temperature,
            max_tokens:  profile.max_tokens
        }
    }

    fn system(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
    }

    fn non_system(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != "system")
            .cloned()
            .collect()
    }
}

/// Single network attempt at a chat completion.
pub trait ChatTransport {
    fn complete(&self, request: &ChatRequest) -> impl Future<Output = AppResult<String>> + Send;
}

/// Counters reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LlmStats {
    pub network_calls: usize,
    pub cache_hits:    usize
}

/// LLM client with response cache, request budget and retry.
pub struct LlmClient<T> {
    transport:     T,
    cache:         Box<dyn Cache>,
    limiter:       Box<dyn RateLimiter>,
    retry_config:  RetryConfig,
    default_model: String,
    task_models:   HashMap<String, String>,
    network_calls: AtomicUsize,
    cache_hits:    AtomicUsize
}

impl<T: ChatTransport> LlmClient<T> {
    /// Client with an in-memory cache, the default budget and retry policy.
    pub fn new(transport: T, model: impl Into<String>) -> Self {
        Self {
            transport,
            cache: Box::new(MemoryCache::new(chrono::Duration::seconds(3600))),
            limiter: Box::new(FixedWindowLimiter::new(10, Duration::from_secs(60))),
            retry_config: RetryConfig::default(),
            default_model: model.into(),
            task_models: HashMap::new(),
            network_calls: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0)
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Box<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Box<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Per-task model overrides keyed by task name.
    #[must_use]
    pub fn with_task_models(mut self, task_models: HashMap<String, String>) -> Self {
        self.task_models = task_models;
        self
    }

    pub fn profile(&self, task: TaskType) -> TaskProfile {
        let (temperature, max_tokens) = task.sampling();
        let model = self
            .task_models
            .get(task.as_str())
            .cloned()
            .unwrap_or_else(|| self.default_model.clone());
        TaskProfile {
            model,
            temperature,
            max_tokens
        }
    }

    pub fn stats(&self) -> LlmStats {
        LlmStats {
            network_calls: self.network_calls.load(Ordering::Relaxed),
            cache_hits:    self.cache_hits.load(Ordering::Relaxed)
        }
    }

    /// Raw model response for a prompt, served from cache when fresh.
    ///
    /// Only responses that parse as JSON are cached.
    pub async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        task: TaskType
    ) -> AppResult<String> {
        let key = cache_key(task.as_str(), system_prompt, user_prompt);
        if let Some(cached) = self.cache.get(&key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(task = %task, "LLM cache hit");
            return Ok(cached);
        }
        debug!(task = %task, "LLM cache miss");

        let request = ChatRequest::new(&self.profile(task), system_prompt, user_prompt);
        let response = self.call_with_retry(&request).await?;
        if response.trim().is_empty() {
            return Err(llm_api_error("Empty response from LLM"));
        }
        if is_error_object(&extract_json(&response)) {
            debug!(task = %task, "LLM response holds no JSON, not caching");
        } else if let Err(e) = self.cache.put(&key, &response) {
            warn!(error = %e, "failed to store LLM response in cache");
        }
        Ok(response)
    }

    /// Parsed JSON for a prompt; failures become an error object.
    pub async fn call_json(&self, system_prompt: &str, user_prompt: &str, task: TaskType) -> Value {
        match self.call(system_prompt, user_prompt, task).await {
            Ok(raw) => extract_json(&raw),
            Err(e) => {
                warn!(task = %task, error = %e, "LLM call failed");
                error_object(e.to_string(), None)
            }
        }
    }

    /// Run the analysis for one exercise.
    pub async fn analyze_exercise(
        &self,
        sql: &str,
        partial: &EvaluationReport,
        mode: AnalysisMode
    ) -> Value {
        match mode {
            AnalysisMode::Comprehensive => {
                self.call_json(
                    &prompts::system_prompt(TaskType::Comprehensive),
                    &prompts::comprehensive_prompt(sql, partial),
                    TaskType::Comprehensive
                )
                .await
            }
            AnalysisMode::Granular => {
                let intent = self
                    .call_json(
                        &prompts::system_prompt(TaskType::Intent),
                        &prompts::intent_prompt(sql, &partial.intent),
                        TaskType::Intent
                    )
                    .await;
                let validation = self
                    .call_json(
                        &prompts::system_prompt(TaskType::Validation),
                        &prompts::validation_prompt(sql, &partial.intent, &partial.execution),
                        TaskType::Validation
                    )
                    .await;
                let difficulty = self
                    .call_json(
                        &prompts::system_prompt(TaskType::Difficulty),
                        &prompts::difficulty_prompt(sql, &partial.intent),
                        TaskType::Difficulty
                    )
                    .await;
                json!({
                    "intent": intent,
                    "validation": validation,
                    "difficulty": difficulty
                })
            }
        }
    }

    async fn call_with_retry(&self, request: &ChatRequest) -> AppResult<String> {
        let mut last_error = None;
        let mut delay = self.retry_config.initial_delay_ms;
        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                warn!(
                    attempt = attempt + 1,
                    max_attempts = self.retry_config.max_retries + 1,
                    delay_ms = delay,
                    "retrying LLM request"
                );
                sleep(Duration::from_millis(delay)).await;
                delay = ((delay as f64 * self.retry_config.backoff_factor) as u64)
                    .min(self.retry_config.max_delay_ms);
            }
            rate_limit::acquire(self.limiter.as_ref()).await;
            self.network_calls.fetch_add(1, Ordering::Relaxed);
            match self.transport.complete(request).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if is_retryable_error(&e) {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| llm_api_error("All retry attempts failed")))
    }
}

fn is_retryable_error(error: &AppError) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("timeout")
        || msg.contains("connection")
        || msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
}

/// reqwest-backed transport for the supported providers.
pub struct HttpTransport {
    provider: LlmProvider,
    client:   reqwest::Client
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    error:   Option<ApiErrorBody>
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model:       &'a str,
    max_tokens:  u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system:      Option<&'a str>,
    messages:    Vec<ChatMessage>
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model:    &'a str,
    messages: &'a [ChatMessage],
    stream:   bool,
    options:  OllamaOptions
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ChatMessage
}

impl HttpTransport {
    pub fn new(provider: LlmProvider) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            provider,
            client
        }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    async fn call_openai(
        &self,
        api_key: &str,
        base_url: &str,
        request: &ChatRequest
    ) -> AppResult<String> {
        if api_key.trim().is_empty() {
            return Err(llm_api_error("Missing API key for OpenAI"));
        }
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(llm_api_error(format!(
                "OpenAI API error {}: {}",
                status,
                api_error_message(&text)
            )));
        }
        let result: OpenAIResponse = response.json().await.map_err(http_error)?;
        if let Some(error) = result.error {
            return Err(llm_api_error(format!("OpenAI API error: {}", error.message)));
        }
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| llm_api_error("Empty response from OpenAI"))
    }

    async fn call_anthropic(&self, api_key: &str, request: &ChatRequest) -> AppResult<String> {
        if api_key.trim().is_empty() {
            return Err(llm_api_error("Missing API key for Anthropic"));
        }
        let body = AnthropicRequest {
            model:       &request.model,
            max_tokens:  request.max_tokens,
            temperature: request.temperature,
            system:      request.system(),
            messages:    request.non_system()
        };
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(llm_api_error(format!(
                "Anthropic API error {}: {}",
                status,
                api_error_message(&text)
            )));
        }
        let result: AnthropicResponse = response.json().await.map_err(http_error)?;
        result
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| llm_api_error("Empty response from Anthropic"))
    }

    async fn call_ollama(&self, base_url: &str, request: &ChatRequest) -> AppResult<String> {
        let body = OllamaRequest {
            model:    &request.model,
            messages: &request.messages,
            stream:   false,
            options:  OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens
            }
        };
        let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(llm_api_error(format!(
                "Ollama API error {}: {}",
                status,
                api_error_message(&text)
            )));
        }
        let result: OllamaResponse = response.json().await.map_err(http_error)?;
        if result.message.content.trim().is_empty() {
            return Err(llm_api_error("Empty response from Ollama"));
        }
        Ok(result.message.content)
    }
}

impl ChatTransport for HttpTransport {
    async fn complete(&self, request: &ChatRequest) -> AppResult<String> {
        match &self.provider {
            LlmProvider::OpenAI {
                api_key,
                base_url
            } => self.call_openai(api_key, base_url, request).await,
            LlmProvider::Anthropic {
                api_key
            } => self.call_anthropic(api_key, request).await,
            LlmProvider::Ollama {
                base_url
            } => self.call_ollama(base_url, request).await
        }
    }
}

/// `error.message` from a JSON error body, or the body itself.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}
