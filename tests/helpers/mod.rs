// ABOUTME: Shared fixtures for integration tests: config, database, and payload builders
// ABOUTME: Also exposes the synthetic score provider for pipeline tests without network calls

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod synthetic_provider;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use powerpulse::config::environment::{
    AiConfig, AutoResponseConfig, PipelineConfig, ServerConfig,
};
use powerpulse::config::types::{AiServiceType, Environment, LogLevel};
use powerpulse::database::Database;
use powerpulse::logging::LoggingConfig;
use powerpulse::orchestrator::UploadOrchestrator;
use powerpulse::progress::{ProgressSnapshot, ProgressTracker};

use self::synthetic_provider::SyntheticProvider;

/// Configuration tuned for fast tests: zero inter-call delay, short
/// timeouts, default batching limits
pub fn test_config() -> Arc<ServerConfig> {
    Arc::new(ServerConfig {
        http_port: 0,
        host: "127.0.0.1".to_owned(),
        environment: Environment::Testing,
        log_level: LogLevel::Info,
        logging: LoggingConfig::default(),
        database_url: "sqlite::memory:".to_owned(),
        max_file_size: 52_428_800,
        ai: AiConfig {
            service: AiServiceType::Gemini,
            gemini_api_key: Some("test-key".to_owned()),
            openai_api_key: None,
            gemini_model: "gemini-1.5-flash".to_owned(),
            openai_model: "gpt-4o-mini".to_owned(),
            request_timeout: Duration::from_secs(5),
        },
        pipeline: PipelineConfig {
            min_inter_call_delay_secs: 0.0,
            upload_timeout_secs: 60,
            ..PipelineConfig::default()
        },
        autoresponse: AutoResponseConfig::default(),
    })
}

/// Fresh in-memory database with migrations applied
pub async fn memory_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

/// Orchestrator over a synthetic provider and a fresh tracker
pub fn test_orchestrator(
    db: Database,
    provider: Arc<SyntheticProvider>,
) -> (UploadOrchestrator<SyntheticProvider>, ProgressTracker) {
    test_orchestrator_with_config(db, provider, test_config())
}

/// Orchestrator with a caller-supplied configuration
pub fn test_orchestrator_with_config(
    db: Database,
    provider: Arc<SyntheticProvider>,
    config: Arc<ServerConfig>,
) -> (UploadOrchestrator<SyntheticProvider>, ProgressTracker) {
    let tracker = ProgressTracker::new();
    let orchestrator = UploadOrchestrator::new(db, provider, tracker.clone(), config);
    (orchestrator, tracker)
}

/// Poll the tracker until the upload reaches a terminal state
pub async fn wait_for_terminal(tracker: &ProgressTracker, upload_id: &str) -> ProgressSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(snapshot) = tracker.snapshot(upload_id).await {
                if snapshot.status.is_terminal() {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upload did not reach a terminal state in time")
}

/// One raw message record in the upload wire format
pub fn message(direction: &str, timestamp: &str, content: &str) -> Value {
    json!({
        "MESSAGE_CONTENT": content,
        "DIRECTION": direction,
        "SOCIAL_CREATE_TIME": timestamp,
    })
}

/// Serialize a grouped-chats payload
pub fn payload(chats: &[(&str, Vec<Value>)]) -> Vec<u8> {
    let object: serde_json::Map<String, Value> = chats
        .iter()
        .map(|(chat_id, messages)| ((*chat_id).to_owned(), Value::Array(messages.clone())))
        .collect();
    serde_json::to_vec(&Value::Object(object)).unwrap()
}

/// The scenario-2 payload: one chat, customer at 10:00, agent at 10:02
pub fn two_message_chat() -> Vec<u8> {
    payload(&[(
        "C1",
        vec![
            message("to_company", "2025-08-26T10:00:00Z", "hi"),
            message("to_client", "2025-08-26T10:02:00Z", "hello"),
        ],
    )])
}
