mod common;

use std::{sync::atomic::Ordering, time::Duration};

use common::CountingTransport;
use serde_json::json;
use sql_exercise_grader::{
    cache::NoCache,
    config::RetryConfig,
    llm::{
        AnalysisMode, FixedWindowLimiter, LlmClient, TaskType, Unlimited, extract_json,
        is_error_object
    },
    report::{EvaluationCriteria, assemble}
};

fn no_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        ..RetryConfig::default()
    }
}

#[tokio::test]
async fn test_identical_prompt_is_served_from_cache() {
    let transport = CountingTransport::replying(r#"{"score": 7}"#);
    let calls = transport.calls();
    let client = LlmClient::new(transport, "test-model").with_rate_limiter(Box::new(Unlimited));

    let first = client
        .call("system", "user", TaskType::Comprehensive)
        .await
        .unwrap();
    let second = client
        .call("system", "user", TaskType::Comprehensive)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = client.stats();
    assert_eq!(stats.network_calls, 1);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn test_unparsable_reply_is_not_cached() {
    let transport = CountingTransport::replying("Sorry, I cannot grade this.");
    let calls = transport.calls();
    let client = LlmClient::new(transport, "test-model").with_rate_limiter(Box::new(Unlimited));

    let first = client.call_json("system", "user", TaskType::Comprehensive).await;
    let second = client.call_json("system", "user", TaskType::Comprehensive).await;

    assert!(is_error_object(&first));
    assert!(is_error_object(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.stats().cache_hits, 0);
}

#[tokio::test]
async fn test_task_type_is_part_of_cache_key() {
    let transport = CountingTransport::replying("{}");
    let calls = transport.calls();
    let client = LlmClient::new(transport, "test-model").with_rate_limiter(Box::new(Unlimited));

    client.call("s", "u", TaskType::Intent).await.unwrap();
    client.call("s", "u", TaskType::Difficulty).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_eleventh_call_waits_for_window() {
    let transport = CountingTransport::replying("{}");
    let finished = transport.finished();
    let start = tokio::time::Instant::now();
    let client = LlmClient::new(transport, "test-model")
        .with_cache(Box::new(NoCache))
        .with_rate_limiter(Box::new(FixedWindowLimiter::new(
            10,
            Duration::from_secs(60)
        )));

    for i in 0..11 {
        client
            .call("system", &format!("prompt {}", i), TaskType::Validation)
            .await
            .unwrap();
    }

    let finished = finished.lock().unwrap();
    assert_eq!(finished.len(), 11);
    for instant in &finished[..10] {
        assert!(*instant < start + Duration::from_secs(60));
    }
    assert!(finished[10] >= start + Duration::from_secs(60));
}

#[tokio::test]
async fn test_task_profiles_reach_transport() {
    let transport = CountingTransport::replying("{}");
    let requests = transport.requests();
    let client = LlmClient::new(transport, "default-model")
        .with_rate_limiter(Box::new(Unlimited))
        .with_task_models(
            [(String::from("comprehensive"), String::from("big-model"))]
                .into_iter()
                .collect()
        );

    client.call("s", "a", TaskType::Comprehensive).await.unwrap();
    client.call("s", "b", TaskType::Validation).await.unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].model, "big-model");
    assert_eq!(requests[0].temperature, 0.3);
    assert_eq!(requests[0].max_tokens, 2500);
    assert_eq!(requests[1].model, "default-model");
    assert_eq!(requests[1].temperature, 0.1);
    assert_eq!(requests[1].max_tokens, 800);
}

#[tokio::test]
async fn test_transport_failure_becomes_error_object() {
    let client = LlmClient::new(CountingTransport::failing("invalid api key"), "m")
        .with_rate_limiter(Box::new(Unlimited))
        .with_retry_config(no_retry());
    let value = client.call_json("s", "u", TaskType::Intent).await;
    assert!(is_error_object(&value));
    assert!(value["error"].as_str().unwrap().contains("invalid api key"));
}

#[tokio::test]
async fn test_empty_response_is_an_error() {
    let client = LlmClient::new(CountingTransport::replying("   "), "m")
        .with_rate_limiter(Box::new(Unlimited))
        .with_retry_config(no_retry());
    assert!(client.call("s", "u", TaskType::Intent).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_are_retried() {
    let transport = CountingTransport::failing("503 service unavailable");
    let calls = transport.calls();
    let client = LlmClient::new(transport, "m")
        .with_rate_limiter(Box::new(Unlimited))
        .with_retry_config(RetryConfig {
            max_retries:      2,
            initial_delay_ms: 10,
            max_delay_ms:     100,
            backoff_factor:   2.0
        });
    assert!(client.call("s", "u", TaskType::Intent).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_granular_analysis_has_three_sections() {
    let transport = CountingTransport::replying("```json\n{\"ok\": true}\n```");
    let calls = transport.calls();
    let client = LlmClient::new(transport, "m").with_rate_limiter(Box::new(Unlimited));

    let sql = "-- PURPOSE: demo\nSELECT a FROM t;";
    let file = sql_exercise_grader::exercise::ExerciseFile::locate(
        std::path::Path::new("quests/basics/01.sql"),
        std::path::Path::new("quests")
    );
    let partial = assemble(
        &file,
        &sql_exercise_grader::intent::extract_intent(sql),
        &sql_exercise_grader::sandbox::ExecutionResult::failure("ERROR: offline"),
        &sql_exercise_grader::patterns::detect_patterns(sql),
        None,
        &EvaluationCriteria::default(),
        chrono::Utc::now()
    );

    let value = client
        .analyze_exercise(sql, &partial, AnalysisMode::Granular)
        .await;
    assert_eq!(value["intent"], json!({"ok": true}));
    assert_eq!(value["validation"], json!({"ok": true}));
    assert_eq!(value["difficulty"], json!({"ok": true}));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_extract_json_fenced() {
    let value = extract_json("Here you go:\n```json\n{\"score\": 9, \"tags\": [\"a\"]}\n```\nThanks");
    assert_eq!(value, json!({"score": 9, "tags": ["a"]}));
}

#[test]
fn test_extract_json_bare() {
    assert_eq!(extract_json("  {\"a\": 1}  "), json!({"a": 1}));
}

#[test]
fn test_extract_json_invalid_keeps_raw() {
    let value = extract_json("I think the exercise is fine.");
    assert!(is_error_object(&value));
    assert_eq!(value["raw_content"], "I think the exercise is fine.");
}

#[test]
fn test_extract_json_single_line_fence() {
    assert_eq!(extract_json("```json {\"score\": 8} ```"), json!({"score": 8}));
}

#[test]
fn test_extract_json_prefers_json_fence_over_earlier_sql_fence() {
    let reply = "The fix:\n```sql\nSELECT id FROM t;\n```\nAssessment:\n```json\n{\"score\": 6}\n```";
    assert_eq!(extract_json(reply), json!({"score": 6}));
}

#[test]
fn test_extract_json_untagged_fence_after_prose() {
    let reply = "```\nnot json\n```\n```\n{\"ok\": true}\n```";
    assert_eq!(extract_json(reply), json!({"ok": true}));
}

#[test]
fn test_extract_json_object_embedded_in_prose() {
    let reply = "Here is my review: {\"score\": 5, \"notes\": [\"a\"]} Hope it helps.";
    assert_eq!(extract_json(reply), json!({"score": 5, "notes": ["a"]}));
}
