//! # SQL Exercise Grader Library
//!
//! Batch evaluation of SQL exercise scripts: sandboxed execution, pattern and
//! intent classification, rule-based scoring and optional LLM review.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod exercise;
pub mod intent;
pub mod llm;
pub mod output;
pub mod patterns;
pub mod report;
pub mod sandbox;

pub use error::{AppError, AppResult};
