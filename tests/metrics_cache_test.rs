// ABOUTME: Metric cache behavior: wholesale rewrite after uploads and aggregate semantics
// ABOUTME: System-level CSI averages across days, conversation-level across a conversation's days

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod helpers;

use helpers::synthetic_provider::SyntheticProvider;
use helpers::{memory_db, message, payload, test_orchestrator, wait_for_terminal};

use powerpulse::database::{METRIC_OVERALL_CSI, METRIC_TOTAL_CONVERSATIONS, METRIC_TOTAL_DAYS};
use powerpulse::progress::UploadStatus;

#[tokio::test]
async fn successful_upload_rewrites_the_metric_cache() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let body = payload(&[
        (
            "C1",
            vec![
                message("to_company", "2025-08-26T10:00:00Z", "power is out"),
                message("to_client", "2025-08-26T10:02:00Z", "on it"),
            ],
        ),
        (
            "C2",
            vec![
                message("to_company", "2025-08-26T11:00:00Z", "no tokens"),
                message("to_client", "2025-08-26T11:05:00Z", "resent now"),
            ],
        ),
    ]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;
    assert_eq!(snapshot.status, UploadStatus::Completed);

    let metrics = db.get_metrics().await.unwrap();
    assert!(!metrics.is_empty());

    let value = |name: &str| {
        metrics
            .iter()
            .find(|m| m.metric_name == name)
            .map(|m| m.metric_value)
            .unwrap()
    };
    assert!(value(METRIC_OVERALL_CSI) > 0.0);
    assert!(value(METRIC_OVERALL_CSI) <= 100.0);
    assert_eq!(value(METRIC_TOTAL_DAYS), 2.0);
    assert_eq!(value(METRIC_TOTAL_CONVERSATIONS), 2.0);
}

#[tokio::test]
async fn system_csi_averages_across_days_not_conversations() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    // C1 spans two days, C2 one day: three day-samples in total
    let body = payload(&[
        (
            "C1",
            vec![
                message("to_company", "2025-08-26T10:00:00Z", "outage"),
                message("to_company", "2025-08-27T10:00:00Z", "again"),
            ],
        ),
        (
            "C2",
            vec![message("to_company", "2025-08-26T12:00:00Z", "billing question")],
        ),
    ]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    wait_for_terminal(&tracker, &accepted.upload_id).await;

    let metrics = db.get_metrics().await.unwrap();
    let total_days = metrics
        .iter()
        .find(|m| m.metric_name == METRIC_TOTAL_DAYS)
        .unwrap()
        .metric_value;
    assert_eq!(total_days, 3.0);
}

#[tokio::test]
async fn conversation_level_score_is_the_mean_of_its_days() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let body = payload(&[(
        "C1",
        vec![
            message("to_company", "2025-08-26T10:00:00Z", "day one"),
            message("to_company", "2025-08-27T10:00:00Z", "day two"),
        ],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    wait_for_terminal(&tracker, &accepted.upload_id).await;

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    let days = db.list_daily_analyses(conversation.id).await.unwrap();
    let expected: f64 =
        days.iter().map(|d| d.csi_score.unwrap()).sum::<f64>() / days.len() as f64;

    let actual = db.conversation_csi(conversation.id).await.unwrap().unwrap();
    assert!((actual - expected).abs() < 1e-9);
}

#[tokio::test]
async fn deleting_a_conversation_cascades_to_its_rows_but_not_jobs() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let accepted = orchestrator
        .accept_upload(&helpers::two_message_chat(), false)
        .await
        .unwrap();
    wait_for_terminal(&tracker, &accepted.upload_id).await;

    db.delete_conversation("C1").await.unwrap();

    let (conversations, messages, daily, jobs) = db.table_counts().await.unwrap();
    assert_eq!((conversations, messages, daily), (0, 0, 0));
    // Jobs share daily analyses by weak reference; deleting the
    // conversation does not delete the job record
    assert_eq!(jobs, 1);
}
