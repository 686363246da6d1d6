//! Integration tests for the Postgres stores.
//!
//! These tests run against a real Postgres database using testcontainers.
//! Requires Docker to be available on the system.

mod common;

use atelier_core::{
    ArtifactKind, AtelierError, FailureKind, JobFilter, JobStatus, JobType, MarkOutcome,
    NewArtifact, NewJob, Project, ProjectId, ProjectStatus, UserId,
};
use atelier_repository::{
    ArtifactStore, JobStore, Ledger, LedgerError, PgArtifactStore, PgJobStore, PgLedger,
    PgProjectStore, ProjectStore,
};
use common::TestDatabase;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn artifact_job(user_id: UserId, max_retries: i32) -> NewJob {
    NewJob::new(
        JobType::GenerateArtifact,
        json!({"project_id": "0190f0c4-0000-7000-8000-000000000000", "kind": "main"}),
        user_id,
        max_retries,
    )
}

#[tokio::test]
async fn test_create_and_get_job() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let user = UserId::new();

    let job = store.create_job(artifact_job(user, 2)).await.expect("create");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);

    let found = store.get_job(job.id).await.expect("get").expect("missing");
    assert_eq!(found.id, job.id);
    assert_eq!(found.job_type, JobType::GenerateArtifact);
    assert_eq!(found.payload["kind"], "main");
    assert_eq!(found.max_retries, 2);
    assert_eq!(found.user_id, user);
}

#[tokio::test]
async fn test_claim_is_exclusive_under_concurrency() {
    let db = TestDatabase::new().await;
    let store = Arc::new(PgJobStore::new(db.pool()));
    store.create_job(artifact_job(UserId::new(), 0)).await.expect("create");

    let claims = futures::future::join_all((0..12).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.claim_next(None).await.expect("claim") })
    }))
    .await;

    let claimed: Vec<_> = claims
        .into_iter()
        .filter_map(|r| r.expect("task panicked"))
        .collect();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, JobStatus::Processing);
    assert!(claimed[0].processed_at.is_some());
}

#[tokio::test]
async fn test_claim_order_and_type_filter() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let user = UserId::new();

    let first = store.create_job(artifact_job(user, 1)).await.expect("create");
    tokio::time::sleep(Duration::from_millis(5)).await;
    let composite = store
        .create_job(NewJob::new(JobType::GenerateCompositePack, json!({}), user, 1))
        .await
        .expect("create");

    let claimed = store
        .claim_next(Some(JobType::GenerateCompositePack))
        .await
        .expect("claim")
        .expect("empty");
    assert_eq!(claimed.id, composite.id);

    let claimed = store.claim_next(None).await.expect("claim").expect("empty");
    assert_eq!(claimed.id, first.id);
    assert!(store.claim_next(None).await.expect("claim").is_none());
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let job = store.create_job(artifact_job(UserId::new(), 2)).await.expect("create");

    store.claim_next(None).await.expect("claim").expect("empty");
    let outcome = store
        .mark_failed(job.id, "image service returned 503", FailureKind::Retriable)
        .await
        .expect("mark failed");
    assert_eq!(outcome, MarkOutcome::Retrying { retry_count: 1 });

    let retried = store.get_job(job.id).await.expect("get").expect("missing");
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.error_message.as_deref(), Some("image service returned 503"));
    assert_eq!(retried.created_at, job.created_at);

    let reclaimed = store.claim_next(None).await.expect("claim").expect("empty");
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(store.mark_completed(job.id).await.expect("complete"), MarkOutcome::Completed);

    let done = store.get_job(job.id).await.expect("get").expect("missing");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.retry_count, 1);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn test_retries_exhaust_into_failed() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let job = store.create_job(artifact_job(UserId::new(), 2)).await.expect("create");

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        store.claim_next(None).await.expect("claim").expect("empty");
        outcomes.push(
            store
                .mark_failed(job.id, "timeout", FailureKind::Retriable)
                .await
                .expect("mark failed"),
        );
    }

    assert_eq!(outcomes[2], MarkOutcome::Failed);
    let failed = store.get_job(job.id).await.expect("get").expect("missing");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.retry_count, 2);
    assert!(store.claim_next(None).await.expect("claim").is_none());
}

#[tokio::test]
async fn test_mark_completed_twice_is_noop() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let job = store.create_job(artifact_job(UserId::new(), 1)).await.expect("create");
    store.claim_next(None).await.expect("claim");

    store.mark_completed(job.id).await.expect("complete");
    let first = store.get_job(job.id).await.expect("get").expect("missing");

    let outcome = store.mark_completed(job.id).await.expect("complete again");
    assert_eq!(outcome, MarkOutcome::AlreadyCompleted);
    let second = store.get_job(job.id).await.expect("get").expect("missing");
    assert_eq!(first.completed_at, second.completed_at);
}

#[tokio::test]
async fn test_invalid_transitions_are_rejected() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let job = store.create_job(artifact_job(UserId::new(), 1)).await.expect("create");

    let err = store.mark_completed(job.id).await.unwrap_err();
    assert!(matches!(err, AtelierError::InvalidTransition { .. }));

    let err = store
        .mark_failed(job.id, "nope", FailureKind::Terminal)
        .await
        .unwrap_err();
    assert!(matches!(err, AtelierError::InvalidTransition { .. }));

    let unchanged = store.get_job(job.id).await.expect("get").expect("missing");
    assert_eq!(unchanged.status, JobStatus::Pending);
    assert!(unchanged.error_message.is_none());

    let err = store.mark_completed(atelier_core::JobId::new()).await.unwrap_err();
    assert!(matches!(err, AtelierError::NotFound { .. }));
}

#[tokio::test]
async fn test_list_delete_and_stats() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let alice = UserId::new();
    let bob = UserId::new();

    for _ in 0..3 {
        store.create_job(artifact_job(alice, 1)).await.expect("create");
    }
    store.create_job(artifact_job(bob, 1)).await.expect("create");
    store.claim_next(None).await.expect("claim");

    let alice_jobs = store
        .list_jobs(
            &JobFilter {
                user_id: Some(alice),
                ..JobFilter::default()
            },
            10,
        )
        .await
        .expect("list");
    assert_eq!(alice_jobs.len(), 3);
    assert!(alice_jobs.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let limited = store.list_jobs(&JobFilter::default(), 2).await.expect("list");
    assert_eq!(limited.len(), 2);

    let stats = store.count_by_status().await.expect("stats");
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.processing, 1);

    assert_eq!(store.delete_jobs_for_user(alice).await.expect("delete"), 3);
    assert_eq!(store.count_by_status().await.expect("stats").total(), 1);

    let project_id = ProjectId::new();
    let tagged = store
        .create_job(NewJob::new(
            JobType::GenerateArtifact,
            json!({"project_id": project_id, "kind": "detail"}),
            bob,
            1,
        ))
        .await
        .expect("create");
    let for_project = store
        .list_jobs(
            &JobFilter {
                project_id: Some(project_id),
                ..JobFilter::default()
            },
            10,
        )
        .await
        .expect("list");
    assert_eq!(for_project.len(), 1);
    assert_eq!(for_project[0].id, tagged.id);
}

#[tokio::test]
async fn test_requeue_stale_jobs() {
    let db = TestDatabase::new().await;
    let store = PgJobStore::new(db.pool());
    let job = store.create_job(artifact_job(UserId::new(), 1)).await.expect("create");
    store.claim_next(None).await.expect("claim");

    assert_eq!(store.requeue_stale(Duration::from_secs(3600)).await.expect("reap"), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.requeue_stale(Duration::from_millis(10)).await.expect("reap"), 1);

    let requeued = store.get_job(job.id).await.expect("get").expect("missing");
    assert_eq!(requeued.status, JobStatus::Pending);
    assert_eq!(requeued.retry_count, 1);
}

#[tokio::test]
async fn test_project_reconciliation_transition_happens_once() {
    let db = TestDatabase::new().await;
    let projects = PgProjectStore::new(db.pool());
    let artifacts = PgArtifactStore::new(db.pool());

    let project = Project::new(UserId::new(), "Desk lamp", vec!["s3://in/lamp.png".into()]);
    projects.create_project(&project).await.expect("create project");

    let started = projects
        .begin_processing(project.id, &[ArtifactKind::Main, ArtifactKind::Lifestyle])
        .await
        .expect("begin");
    assert_eq!(started.status, ProjectStatus::Processing);
    assert_eq!(started.expected_artifacts.len(), 2);

    for kind in [ArtifactKind::Main, ArtifactKind::Lifestyle, ArtifactKind::Main] {
        artifacts
            .upsert_artifact(NewArtifact::image(project.id, kind, format!("s3://out/{kind}.png")))
            .await
            .expect("upsert");
    }
    let mut kinds = artifacts.produced_kinds(project.id).await.expect("kinds");
    kinds.sort();
    assert_eq!(kinds, vec![ArtifactKind::Main, ArtifactKind::Lifestyle]);

    assert!(projects.complete_if_processing(project.id).await.expect("complete"));
    assert!(!projects.complete_if_processing(project.id).await.expect("complete"));

    let completed = projects
        .get_project(project.id)
        .await
        .expect("get")
        .expect("missing");
    assert_eq!(completed.status, ProjectStatus::Completed);
}

#[tokio::test]
async fn test_ledger_debit_guards_balance() {
    let db = TestDatabase::new().await;
    let ledger = PgLedger::new(db.pool());
    let user = UserId::new();

    assert!(matches!(
        ledger.balance(user).await,
        Err(LedgerError::AccountNotFound(_))
    ));

    ledger.deposit(user, 5).await.expect("deposit");
    assert_eq!(ledger.debit(user, 3).await.expect("debit"), 2);
    assert!(matches!(
        ledger.debit(user, 3).await,
        Err(LedgerError::InsufficientCredits {
            required: 3,
            available: 2
        })
    ));
    assert_eq!(ledger.refund(user, 3).await.expect("refund"), 5);
}
