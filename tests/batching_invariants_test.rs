// ABOUTME: Batching invariants across the pipeline: token budgets, unit caps, and job coverage
// ABOUTME: Every daily analysis lands in exactly one job; every batch honors both limits

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod helpers;

use std::sync::Arc;

use helpers::synthetic_provider::SyntheticProvider;
use helpers::{memory_db, message, payload, wait_for_terminal};

use powerpulse::models::JobStatus;
use powerpulse::progress::UploadStatus;

#[tokio::test]
async fn every_daily_analysis_belongs_to_exactly_one_job() {
    let db = memory_db().await;
    let config = {
        let mut config = (*helpers::test_config()).clone();
        config.pipeline.batch_size = 2;
        Arc::new(config)
    };
    let (orchestrator, tracker) =
        helpers::test_orchestrator_with_config(db.clone(), SyntheticProvider::scoring(), config);

    // Five chats, one day each, with a unit cap of two per job
    let chats: Vec<(String, Vec<serde_json::Value>)> = (0..5)
        .map(|i| {
            (
                format!("C{i}"),
                vec![message(
                    "to_company",
                    "2025-08-26T10:00:00Z",
                    &format!("issue number {i}"),
                )],
            )
        })
        .collect();
    let chat_refs: Vec<(&str, Vec<serde_json::Value>)> = chats
        .iter()
        .map(|(id, msgs)| (id.as_str(), msgs.clone()))
        .collect();

    let accepted = orchestrator
        .accept_upload(&payload(&chat_refs), false)
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;
    assert_eq!(snapshot.status, UploadStatus::Completed);

    let jobs = db.list_jobs(&accepted.upload_id).await.unwrap();
    assert_eq!(jobs.len(), 3); // ceil(5 / 2)

    let mut linked_units = 0;
    for job in &jobs {
        assert!(job.status.is_terminal());
        let units = db.job_unit_count(job.id).await.unwrap();
        assert!(units <= 2, "batch exceeds the unit cap");
        linked_units += units;
    }

    let (_, _, daily, _) = db.table_counts().await.unwrap();
    assert_eq!(linked_units, daily);
}

#[tokio::test]
async fn oversized_day_still_gets_scored_in_its_own_job() {
    let db = memory_db().await;
    let config = {
        let mut config = (*helpers::test_config()).clone();
        config.pipeline.max_tokens_per_job = 10; // tiny budget
        Arc::new(config)
    };
    let (orchestrator, tracker) =
        helpers::test_orchestrator_with_config(db.clone(), SyntheticProvider::scoring(), config);

    // ~100 estimated tokens, far over the 10-token budget
    let long_message = "x".repeat(400);
    let body = payload(&[
        ("big", vec![message("to_company", "2025-08-26T10:00:00Z", &long_message)]),
        ("small", vec![message("to_company", "2025-08-26T11:00:00Z", "hi")]),
    ]);

    let accepted = orchestrator.accept_upload(&body, false).await.unwrap();
    let snapshot = wait_for_terminal(&tracker, &accepted.upload_id).await;

    assert_eq!(snapshot.status, UploadStatus::Completed);
    let jobs = db.list_jobs(&accepted.upload_id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(db.job_unit_count(job.id).await.unwrap(), 1);
    }
}
