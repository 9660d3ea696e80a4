//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::{
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering}
    }
};

use sql_exercise_grader::{
    error::{AppResult, llm_api_error},
    llm::{ChatRequest, ChatTransport},
    sandbox::{EngineOutput, SqlEngine}
};

type Responder = dyn Fn(&str) -> AppResult<EngineOutput> + Send + Sync;

/// Engine that answers from a closure and records every script it receives.
pub struct FakeEngine {
    respond: Box<Responder>,
    scripts: Arc<Mutex<Vec<String>>>
}

impl FakeEngine {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> AppResult<EngineOutput> + Send + Sync + 'static
    {
        Self {
            respond: Box::new(respond),
            scripts: Arc::new(Mutex::new(Vec::new()))
        }
    }

    /// Every script runs cleanly and prints one result set per `SELECT`.
    pub fn healthy() -> Self {
        Self::new(|script| {
            let mut stdout = String::from("BEGIN\n");
            for line in script.lines() {
                let line = line.trim_start();
                if line.starts_with("CREATE TABLE") {
                    stdout.push_str("CREATE TABLE\n");
                } else if line.starts_with("INSERT INTO") {
                    stdout.push_str("INSERT 0 1\n");
                } else if line.starts_with("SELECT") {
                    stdout.push_str(" ?column? \n----------\n        1\n(1 row)\n\n");
                }
            }
            stdout.push_str("ROLLBACK\n");
            Ok(EngineOutput {
                exit_code: Some(0),
                stdout,
                stderr: String::new()
            })
        })
    }

    /// Behaves like psql when the server refuses connections.
    pub fn unreachable() -> Self {
        Self::new(|_| {
            Ok(EngineOutput {
                exit_code: Some(2),
                stdout:    String::new(),
                stderr:    String::from(
                    "psql: error: connection to server at \"127.0.0.1\", port 1 failed: \
                     Connection refused\n"
                )
            })
        })
    }

    pub fn scripts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.scripts)
    }
}

impl SqlEngine for FakeEngine {
    fn run_script(&self, script: &str) -> impl Future<Output = AppResult<EngineOutput>> + Send {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(script.to_string());
        }
        let result = (self.respond)(script);
        async move { result }
    }
}

/// Transport returning a fixed reply and counting requests.
pub struct CountingTransport {
    reply:    Result<String, String>,
    calls:    Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    finished: Arc<Mutex<Vec<tokio::time::Instant>>>
}

impl CountingTransport {
    pub fn replying(reply: &str) -> Self {
        Self::with_reply(Ok(reply.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(Err(message.to_string()))
    }

    fn with_reply(reply: Result<String, String>) -> Self {
        Self {
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(Mutex::new(Vec::new()))
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<ChatRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Completion instants, one per request.
    pub fn finished(&self) -> Arc<Mutex<Vec<tokio::time::Instant>>> {
        Arc::clone(&self.finished)
    }
}

impl ChatTransport for CountingTransport {
    fn complete(&self, request: &ChatRequest) -> impl Future<Output = AppResult<String>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Ok(mut finished) = self.finished.lock() {
            finished.push(tokio::time::Instant::now());
        }
        let reply = self.reply.clone().map_err(llm_api_error);
        async move { reply }
    }
}
