mod common;

use chrono::Utc;
use common::{item, source};
use feed_ingest::hasher::build_article;
use feed_ingest::{
    fingerprint, ArticleStore, InMemoryStore, PgArticleStore, Run, RunFinalization, RunStatus, RunTracker, RunType,
    StoreError,
};
use std::sync::Arc;

fn finalization(status: RunStatus) -> RunFinalization {
    RunFinalization {
        status,
        found_count: 3,
        new_count: 2,
        duplicate_count: 1,
        skipped_count: 0,
        error_message: None,
        completed_at: Utc::now(),
        duration_seconds: 0.5,
    }
}

#[tokio::test]
async fn concurrent_creates_for_one_fingerprint_leave_one_article() {
    let store = Arc::new(InMemoryStore::new());
    let raw = item("https://x.test/a", "Same", "body");
    let hash = fingerprint(&raw);

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let article = build_article(&source(&format!("s{}", i), "https://x.test/feed"), &raw, hash.clone(), Utc::now());
        handles.push(tokio::spawn(async move { store.create_article(&article).await }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => created += 1,
            Err(StoreError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(store.article_count().await, 1);
    assert!(store.exists(&hash).await.unwrap());
}

#[tokio::test]
async fn colliding_article_id_is_a_conflict_not_an_overwrite() {
    let store = InMemoryStore::new();
    let src = source("s", "https://x.test/feed");
    let one = item("https://x.test/1", "One", "");
    let two = item("https://x.test/2", "Two", "");
    let first = build_article(&src, &one, fingerprint(&one), Utc::now());
    let mut second = build_article(&src, &two, fingerprint(&two), Utc::now());
    second.id = first.id.clone();

    store.create_article(&first).await.unwrap();
    assert!(matches!(store.create_article(&second).await, Err(StoreError::Conflict(_))));
    assert_eq!(store.articles().await[0].title, "One");
}

#[tokio::test]
async fn exists_reports_outage_separately_from_absence() {
    let store = InMemoryStore::new();
    assert!(!store.exists("abc").await.unwrap());

    store.fail_exists_for("abc").await;
    assert!(matches!(store.exists("abc").await, Err(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn terminal_runs_cannot_be_finalized_again() {
    let store = InMemoryStore::new();
    let run = Run::start(&source("a", "https://a.test/feed"), RunType::Manual);
    store.create_run(&run).await.unwrap();

    let done = store.finalize_run(run.id, &finalization(RunStatus::Completed)).await.unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.new_count, 2);
    assert!(done.completed_at.is_some());

    let err = store.finalize_run(run.id, &finalization(RunStatus::Failed)).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { status: RunStatus::Completed, .. }));

    let stored = &store.runs().await[0];
    assert_eq!(stored.status, RunStatus::Completed);
}

#[tokio::test]
async fn tracker_opens_running_and_closes_with_counts() {
    let store = Arc::new(InMemoryStore::new());
    let tracker = RunTracker::new(store.clone());
    let src = source("a", "https://a.test/feed");

    let mut active = tracker.start(&src, RunType::Scheduled).await.unwrap();
    assert_eq!(store.runs().await[0].status, RunStatus::Running);

    active.record_found();
    active.record_new();
    active.record_found();
    active.record_duplicate();
    let run = active.complete().await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!((run.found_count, run.new_count, run.duplicate_count), (2, 1, 1));
    assert!(run.duration_seconds >= 0.0);
}

#[tokio::test]
async fn finalizing_an_unknown_run_is_reported() {
    let store = InMemoryStore::new();
    let id = uuid::Uuid::new_v4();
    assert!(matches!(
        store.finalize_run(id, &finalization(RunStatus::Completed)).await,
        Err(StoreError::RunNotFound(_))
    ));
}

/// Runs against a real database only when TEST_DATABASE_URL is set.
#[tokio::test]
async fn postgres_store_enforces_fingerprint_uniqueness() {
    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    let store = PgArticleStore::connect(&database_url, 5).await.unwrap();
    store.migrate().await.unwrap();

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let source_id = format!("pg_{}", &suffix[..8]);
    sqlx::query("INSERT INTO sources (id, name, feed_url, active) VALUES ($1, $2, $3, true)")
        .bind(&source_id)
        .bind("Postgres Source")
        .bind("https://pg.test/feed")
        .execute(store.get_db_pool())
        .await
        .unwrap();

    let sources = store.list_active_sources().await.unwrap();
    let src = sources.into_iter().find(|s| s.id == source_id).unwrap();

    let raw = item(&format!("https://pg.test/{}", suffix), "Unique", "body");
    let hash = fingerprint(&raw);
    assert!(!store.exists(&hash).await.unwrap());

    let store = Arc::new(store);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let article = build_article(&src, &raw, hash.clone(), Utc::now());
        handles.push(tokio::spawn(async move { store.create_article(&article).await }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert!(store.exists(&hash).await.unwrap());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE content_hash = $1")
        .bind(&hash)
        .fetch_one(store.get_db_pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    let run = Run::start(&src, RunType::Manual);
    store.create_run(&run).await.unwrap();
    store.finalize_run(run.id, &finalization(RunStatus::Completed)).await.unwrap();
    assert!(matches!(
        store.finalize_run(run.id, &finalization(RunStatus::Failed)).await,
        Err(StoreError::InvalidTransition { .. })
    ));

    let recent = store.recent_runs(&source_id, 5).await.unwrap();
    assert_eq!(recent[0].status, RunStatus::Completed);
}
