// ABOUTME: End-to-end pipeline tests over the upload orchestrator with a synthetic provider
// ABOUTME: Covers the empty, single-chat, multi-day, filter, and LLM-failure scenarios

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod helpers;

use helpers::synthetic_provider::{SyntheticBehavior, SyntheticProvider};
use helpers::{memory_db, message, payload, test_orchestrator, two_message_chat, wait_for_terminal};

use powerpulse::constants::defaults;
use powerpulse::models::JobStatus;
use powerpulse::progress::UploadStatus;

#[tokio::test]
async fn empty_object_upload_completes_with_filters_at_100() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let accepted = orchestrator.accept_upload(b"{}", false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    assert_eq!(snapshot.status, UploadStatus::CompletedWithFilters);
    assert_eq!(snapshot.progress_percentage, 100.0);
    assert_eq!(snapshot.total_conversations, 0);

    let (conversations, messages, daily, jobs) = db.table_counts().await.unwrap();
    assert_eq!((conversations, messages, daily, jobs), (0, 0, 0, 0));
}

#[tokio::test]
async fn single_one_day_chat_scores_end_to_end() {
    let db = memory_db().await;
    let provider = SyntheticProvider::scoring();
    let (orchestrator, tracker) = test_orchestrator(db.clone(), provider);

    let accepted = orchestrator
        .accept_upload(&two_message_chat(), false)
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    assert_eq!(snapshot.status, UploadStatus::Completed);
    assert_eq!(snapshot.progress_percentage, 100.0);
    assert_eq!(snapshot.processed_conversations, 1);
    assert!(snapshot.statistics.tokens_used > 0);

    let (conversations, messages, daily, jobs) = db.table_counts().await.unwrap();
    assert_eq!((conversations, messages, daily, jobs), (1, 2, 1, 1));

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    assert_eq!(conversation.total_messages, 2);
    assert_eq!(conversation.customer_messages, 1);
    assert_eq!(conversation.agent_messages, 1);

    let days = db.list_daily_analyses(conversation.id).await.unwrap();
    assert_eq!(days.len(), 1);
    let day = &days[0];
    assert_eq!(day.analysis_date.to_string(), "2025-08-26");
    assert_eq!(day.first_response_time, Some(120.0));
    assert_eq!(day.avg_response_time, Some(120.0));
    assert_eq!(day.total_handling_time, Some(2.0));
    assert!(day.csi_score.is_some());
    assert!((0.0..=100.0).contains(&day.csi_score.unwrap()));
    assert!(day.error.is_none());

    // Every daily analysis belongs to exactly one job
    let upload_jobs = db.list_jobs(&accepted.upload_id).await.unwrap();
    assert_eq!(upload_jobs.len(), 1);
    assert_eq!(upload_jobs[0].status, JobStatus::Completed);
    assert!(upload_jobs[0].completed_at.unwrap() >= upload_jobs[0].created_at);
    assert_eq!(db.job_unit_count(upload_jobs[0].id).await.unwrap(), 1);

    // The chat is marked processed for future dedup
    let processed = db.get_processed_chat("C1").await.unwrap().unwrap();
    assert_eq!(processed.message_count, 2);
}

#[tokio::test]
async fn chat_spanning_two_utc_days_gets_two_analyses() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let body = payload(&[(
        "C1",
        vec![
            message("to_company", "2025-08-26T23:59:00Z", "lights out"),
            message("to_client", "2025-08-27T00:01:00Z", "crew dispatched"),
        ],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;
    assert_eq!(snapshot.status, UploadStatus::Completed);

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    let days = db.list_daily_analyses(conversation.id).await.unwrap();
    assert_eq!(days.len(), 2);

    // Each day computes time metrics within its own day: one message per
    // day means no response pairs and no handling span
    for day in &days {
        assert_eq!(day.first_response_time, None);
        assert_eq!(day.avg_response_time, None);
        assert_eq!(day.total_handling_time, None);
        assert!(day.csi_score.is_some());
    }
    assert_eq!(days[0].analysis_date.to_string(), "2025-08-26");
    assert_eq!(days[1].analysis_date.to_string(), "2025-08-27");
}

#[tokio::test]
async fn reupload_without_force_is_idempotent() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let first = orchestrator
        .accept_upload(&two_message_chat(), false)
        .await
        .unwrap();
    wait_for_terminal(&tracker, &first.upload_id).await;
    let counts_before = db.table_counts().await.unwrap();

    let second = orchestrator
        .accept_upload(&two_message_chat(), false)
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&tracker, &second.upload_id).await;

    // The chat was skipped: zero new conversations, analyses, or jobs
    assert_eq!(db.table_counts().await.unwrap(), counts_before);
    assert_eq!(snapshot.status, UploadStatus::CompletedWithFilters);
}

#[tokio::test]
async fn force_reprocess_creates_a_new_job_and_refreshes_the_day() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let first = orchestrator
        .accept_upload(&two_message_chat(), false)
        .await
        .unwrap();
    wait_for_terminal(&tracker, &first.upload_id).await;

    let forced = orchestrator
        .accept_upload(&two_message_chat(), true)
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&tracker, &forced.upload_id).await;
    assert_eq!(snapshot.status, UploadStatus::Completed);

    // Same conversation, same day, same messages; one more job
    let (conversations, messages, daily, jobs) = db.table_counts().await.unwrap();
    assert_eq!((conversations, messages, daily, jobs), (1, 2, 1, 2));

    let forced_jobs = db.list_jobs(&forced.upload_id).await.unwrap();
    assert_eq!(forced_jobs.len(), 1);
    assert_eq!(forced_jobs[0].status, JobStatus::Completed);

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    let day = &db.list_daily_analyses(conversation.id).await.unwrap()[0];
    assert!(day.csi_score.is_some());
    assert!(day.error.is_none());
}

#[tokio::test]
async fn autoresponse_only_chat_is_fully_filtered() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let body = payload(&[(
        "C1",
        vec![message(
            "to_client",
            "2025-08-26T10:00:00Z",
            defaults::AUTORESPONSE_SENTENCE,
        )],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    assert_eq!(snapshot.status, UploadStatus::CompletedWithFilters);
    assert_eq!(snapshot.progress_percentage, 0.0);
    assert_eq!(snapshot.statistics.filtered_autoresponses, 1);
    assert_eq!(snapshot.total_conversations, 1);
    assert_eq!(snapshot.processed_conversations, 0);

    let (conversations, _, daily, jobs) = db.table_counts().await.unwrap();
    assert_eq!((conversations, daily, jobs), (0, 0, 0));
}

#[tokio::test]
async fn invalid_messages_are_counted_but_valid_peers_proceed() {
    let db = memory_db().await;
    let (orchestrator, tracker) = test_orchestrator(db.clone(), SyntheticProvider::scoring());

    let body = payload(&[(
        "C1",
        vec![
            message("to_company", "2025-08-26T10:00:00Z", "hello"),
            serde_json::json!({
                "MESSAGE_CONTENT": null,
                "DIRECTION": "to_company",
                "SOCIAL_CREATE_TIME": "2025-08-26T10:01:00Z",
            }),
            message("sideways", "2025-08-26T10:02:00Z", "lost"),
        ],
    )]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    assert_eq!(snapshot.status, UploadStatus::Completed);
    assert_eq!(snapshot.statistics.filtered_invalid, 2);

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    assert_eq!(conversation.total_messages, 1);
}

#[tokio::test]
async fn llm_returning_garbage_resolves_to_fallbacks() {
    let db = memory_db().await;
    let provider =
        SyntheticProvider::with_script(vec![SyntheticBehavior::RespondWith("not json".to_owned())]);
    let (orchestrator, tracker) = test_orchestrator(db.clone(), provider);

    let accepted = orchestrator
        .accept_upload(&two_message_chat(), false)
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    // The upload still completes; the failure is isolated to the job
    assert_eq!(snapshot.status, UploadStatus::Completed);
    assert!(snapshot.statistics.ai_failures >= 1);

    let jobs = db.list_jobs(&accepted.upload_id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    let result = jobs[0].result.clone().unwrap();
    assert_eq!(result["error"], "analysis_failed");

    let conversation = db.get_conversation("C1").await.unwrap().unwrap();
    let day = &db.list_daily_analyses(conversation.id).await.unwrap()[0];
    assert_eq!(day.sentiment_score, Some(5.0));
    assert_eq!(day.sentiment_shift, Some(0.0));
    assert_eq!(day.resolution_achieved, Some(5.0));
    assert_eq!(day.fcr_score, Some(5.0));
    assert_eq!(day.ces, Some(4.0));
    assert_eq!(day.error.as_deref(), Some("analysis_failed"));
    // Pillars stay null on failure
    assert!(day.csi_score.is_none());
    assert!(day.effectiveness_score.is_none());
    // Time metrics are deterministic and survive the fallback
    assert_eq!(day.first_response_time, Some(120.0));
}

#[tokio::test]
async fn failing_job_does_not_stop_peer_jobs() {
    let db = memory_db().await;
    // First call fails structurally, the rest score normally
    let provider =
        SyntheticProvider::with_script(vec![SyntheticBehavior::RespondWith("[]".to_owned())]);
    let config = {
        let mut config = (*helpers::test_config()).clone();
        config.pipeline.batch_size = 1; // one job per day
        std::sync::Arc::new(config)
    };
    let (orchestrator, tracker) =
        helpers::test_orchestrator_with_config(db.clone(), provider, config);

    let body = payload(&[
        (
            "C1",
            vec![message("to_company", "2025-08-26T10:00:00Z", "no power in Umoja")],
        ),
        (
            "C2",
            vec![message("to_company", "2025-08-26T11:00:00Z", "token not received")],
        ),
    ]);
    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    assert_eq!(snapshot.status, UploadStatus::Completed);

    let jobs = db.list_jobs(&accepted.upload_id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    let failed = jobs.iter().filter(|j| j.status == JobStatus::Failed).count();
    let completed = jobs.iter().filter(|j| j.status == JobStatus::Completed).count();
    assert_eq!(failed, 1);
    assert_eq!(completed, 1);
}
