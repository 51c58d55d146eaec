// ABOUTME: Cancellation and timeout behavior of in-flight uploads
// ABOUTME: Outstanding jobs end failed/cancelled while partial results remain

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::synthetic_provider::{SyntheticBehavior, SyntheticProvider};
use helpers::{memory_db, message, payload, test_orchestrator, wait_for_terminal};

use powerpulse::models::JobStatus;
use powerpulse::progress::UploadStatus;

#[tokio::test]
async fn cancelling_mid_flight_fails_outstanding_jobs() {
    let db = memory_db().await;
    let provider = SyntheticProvider::with_script(vec![SyntheticBehavior::Hang(
        Duration::from_secs(30),
    )]);
    let (orchestrator, tracker) = test_orchestrator(db.clone(), Arc::clone(&provider));

    let body = payload(&[(
        "C1",
        vec![message("to_company", "2025-08-26T10:00:00Z", "anyone there?")],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();

    // Wait until the LLM call is actually in flight
    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("LLM call never started");

    assert!(orchestrator.cancel_upload(&accepted.upload_id).await);

    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;
    assert_eq!(snapshot.status, UploadStatus::Cancelled);

    let jobs = db.list_jobs(&accepted.upload_id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].result.clone().unwrap()["error"], "cancelled");

    // The seeded row remains with nulls and the cancellation marker
    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    let day = &db.list_daily_analyses(conversation.id).await.unwrap()[0];
    assert!(day.sentiment_score.is_none());
    assert!(day.csi_score.is_none());
    assert_eq!(day.error.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn cancelling_an_unknown_upload_is_a_no_op() {
    let db = memory_db().await;
    let (orchestrator, _tracker) = test_orchestrator(db, SyntheticProvider::scoring());
    assert!(!orchestrator.cancel_upload("no-such-upload").await);
}

#[tokio::test]
async fn total_upload_timeout_fails_the_upload() {
    let db = memory_db().await;
    let provider = SyntheticProvider::with_script(vec![SyntheticBehavior::Hang(
        Duration::from_secs(30),
    )]);
    let config = {
        let mut config = (*helpers::test_config()).clone();
        config.pipeline.upload_timeout_secs = 1;
        Arc::new(config)
    };
    let (orchestrator, tracker) =
        helpers::test_orchestrator_with_config(db.clone(), provider, config);

    let body = payload(&[(
        "C1",
        vec![message("to_company", "2025-08-26T10:00:00Z", "still waiting")],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    assert_eq!(snapshot.status, UploadStatus::Failed);
    assert!(snapshot
        .errors
        .iter()
        .any(|e| e.error.contains("timed out")));
}

#[tokio::test]
async fn completed_jobs_survive_a_later_cancellation() {
    let db = memory_db().await;
    // First job scores fast, second hangs until cancelled
    let provider = SyntheticProvider::with_script(vec![
        SyntheticBehavior::Score,
        SyntheticBehavior::Hang(Duration::from_secs(30)),
    ]);
    let config = {
        let mut config = (*helpers::test_config()).clone();
        config.pipeline.batch_size = 1;
        config.pipeline.ai_concurrency = 1; // serialize so the script order holds
        Arc::new(config)
    };
    let (orchestrator, tracker) =
        helpers::test_orchestrator_with_config(db.clone(), Arc::clone(&provider), config);

    let body = payload(&[
        (
            "A-first",
            vec![
                message("to_company", "2025-08-26T10:00:00Z", "power is out"),
                message("to_client", "2025-08-26T10:01:00Z", "restoring now"),
            ],
        ),
        (
            "B-second",
            vec![message("to_company", "2025-08-26T11:00:00Z", "me too")],
        ),
    ]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second LLM call never started");

    orchestrator.cancel_upload(&accepted.upload_id).await;
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;
    assert_eq!(snapshot.status, UploadStatus::Cancelled);

    // Partial results from the completed job remain
    let first = db.get_conversation("A-first").await.unwrap().unwrap();
    let scored = &db.list_daily_analyses(first.id).await.unwrap()[0];
    assert!(scored.csi_score.is_some());

    let second = db.get_conversation("B-second").await.unwrap().unwrap();
    let cancelled = &db.list_daily_analyses(second.id).await.unwrap()[0];
    assert!(cancelled.csi_score.is_none());
    assert_eq!(cancelled.error.as_deref(), Some("cancelled"));
}
