// ABOUTME: Round-trip law: recomputing time metrics from stored messages reproduces stored values
// ABOUTME: Also verifies stored message ordering within a day

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod helpers;

use helpers::synthetic_provider::SyntheticProvider;
use helpers::{memory_db, message, payload, test_orchestrator, wait_for_terminal};

use powerpulse::analysis::time_metrics::compute_time_metrics;
use powerpulse::ingest::validator::ValidatedMessage;
use powerpulse::models::StoredMessage;
use powerpulse::progress::UploadStatus;

fn reconstruct(stored: &StoredMessage) -> ValidatedMessage {
    ValidatedMessage {
        message_content: stored.message_content.clone(),
        direction: stored.direction,
        social_create_time: stored.social_create_time,
        agent_info: stored.agent_info.clone(),
    }
}

#[tokio::test]
async fn stored_time_metrics_match_recomputation_from_the_database() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    // A multi-exchange, multi-day conversation
    let body = payload(&[(
        "C1",
        vec![
            message("to_company", "2025-08-26T09:00:00Z", "no power since morning"),
            message("to_client", "2025-08-26T09:03:30Z", "checking the feeder"),
            message("to_company", "2025-08-26T10:15:00Z", "any update?"),
            message("to_client", "2025-08-26T10:20:00Z", "crew on site"),
            message("to_company", "2025-08-27T08:00:00Z", "still off"),
            message("to_client", "2025-08-27T08:45:00Z", "restored, please confirm"),
        ],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;
    assert_eq!(snapshot.status, UploadStatus::Completed);

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    let stored_messages = db.list_messages(conversation.id).await.unwrap();
    assert_eq!(stored_messages.len(), 6);

    for day in db.list_daily_analyses(conversation.id).await.unwrap() {
        let day_messages: Vec<ValidatedMessage> = stored_messages
            .iter()
            .filter(|m| m.social_create_time.date_naive() == day.analysis_date)
            .map(reconstruct)
            .collect();
        let recomputed = compute_time_metrics(&day_messages);

        assert_eq!(recomputed.first_response_time, day.first_response_time);
        assert_eq!(recomputed.avg_response_time, day.avg_response_time);
        assert_eq!(recomputed.total_handling_time, day.total_handling_time);
    }
}

#[tokio::test]
async fn messages_are_stored_in_timestamp_order() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    // Deliberately unordered input
    let body = payload(&[(
        "C1",
        vec![
            message("to_client", "2025-08-26T10:05:00Z", "second"),
            message("to_company", "2025-08-26T10:00:00Z", "first"),
            message("to_company", "2025-08-26T10:10:00Z", "third"),
        ],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    wait_for_terminal(&tracker, &accepted.upload_id).await;

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    let contents: Vec<String> = db
        .list_messages(conversation.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.message_content)
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}
