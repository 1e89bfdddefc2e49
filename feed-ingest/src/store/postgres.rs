use super::ArticleStore;
use crate::types::{Article, IngestError, Run, RunFinalization, RunStatus, RunType, Source, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// PostgreSQL-backed store. Fingerprint uniqueness is the
/// `articles_content_hash_key` constraint; every column is bound explicitly
/// against the versioned schema in `migrations/`.
#[derive(Clone)]
pub struct PgArticleStore {
    db: PgPool,
}

impl PgArticleStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, IngestError> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| IngestError::Connect(e.into()))?;

        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub fn get_db_pool(&self) -> &PgPool {
        &self.db
    }

    pub async fn migrate(&self) -> Result<(), IngestError> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    /// Latest runs for one source, newest first.
    pub async fn recent_runs(&self, source_id: &str, limit: usize) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query("SELECT * FROM runs WHERE source_id = $1 ORDER BY started_at DESC LIMIT $2")
            .bind(source_id)
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(run_from_row).collect()
    }
}

fn source_from_row(row: &PgRow) -> Result<Source, StoreError> {
    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        feed_url: row.try_get("feed_url")?,
        active: row.try_get("active")?,
        last_scraped_at: row.try_get::<Option<DateTime<Utc>>, _>("last_scraped_at")?,
    })
}

fn run_from_row(row: &PgRow) -> Result<Run, StoreError> {
    let run_type: String = row.try_get("run_type")?;
    let status: String = row.try_get("status")?;

    Ok(Run {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        source_name: row.try_get("source_name")?,
        run_type: run_type.parse::<RunType>().map_err(StoreError::Unavailable)?,
        status: status.parse::<RunStatus>().map_err(StoreError::Unavailable)?,
        found_count: row.try_get("found_count")?,
        new_count: row.try_get("new_count")?,
        duplicate_count: row.try_get("duplicate_count")?,
        skipped_count: row.try_get("skipped_count")?,
        processed_count: row.try_get("processed_count")?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
    })
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query("SELECT id, name, feed_url, active, last_scraped_at FROM sources WHERE active = true")
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(source_from_row).collect()
    }

    async fn exists(&self, content_hash: &str) -> Result<bool, StoreError> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM articles WHERE content_hash = $1)")
            .bind(content_hash)
            .fetch_one(&self.db)
            .await?;

        Ok(found)
    }

    async fn create_article(&self, article: &Article) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (id, source_id, source_name, url, title, content, published_at,
                                  scraped_at, source_type, content_hash, word_count, language,
                                  processed, classification, top_entities)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&article.id)
        .bind(&article.source_id)
        .bind(&article.source_name)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.published_at)
        .bind(article.scraped_at)
        .bind(article.source_type.as_str())
        .bind(&article.content_hash)
        .bind(article.word_count)
        .bind(&article.language)
        .bind(article.processed)
        .bind(&article.classification)
        .bind(sqlx::types::Json(&article.top_entities))
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "article {} (content_hash {})",
                article.id, article.content_hash
            )));
        }

        debug!(article_id = %article.id, "Inserted article");
        Ok(())
    }

    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO runs (id, source_id, source_name, run_type, status, found_count, new_count,
                              duplicate_count, skipped_count, processed_count, error_message, started_at,
                              completed_at, duration_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(run.id)
        .bind(&run.source_id)
        .bind(&run.source_name)
        .bind(run.run_type.as_str())
        .bind(run.status.as_str())
        .bind(run.found_count)
        .bind(run.new_count)
        .bind(run.duplicate_count)
        .bind(run.skipped_count)
        .bind(run.processed_count)
        .bind(&run.error_message)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.duration_seconds)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn finalize_run(&self, id: Uuid, finalization: &RunFinalization) -> Result<Run, StoreError> {
        // The status guard makes terminal runs immutable even under concurrent finalizers.
        let row = sqlx::query(
            r#"
            UPDATE runs
            SET status = $2, found_count = $3, new_count = $4, duplicate_count = $5, skipped_count = $6,
                error_message = $7, completed_at = $8, duration_seconds = $9
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(finalization.status.as_str())
        .bind(finalization.found_count)
        .bind(finalization.new_count)
        .bind(finalization.duplicate_count)
        .bind(finalization.skipped_count)
        .bind(&finalization.error_message)
        .bind(finalization.completed_at)
        .bind(finalization.duration_seconds)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = row {
            return run_from_row(&row);
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        match status {
            Some(status) => Err(StoreError::InvalidTransition {
                id,
                status: status.parse::<RunStatus>().map_err(StoreError::Unavailable)?,
            }),
            None => Err(StoreError::RunNotFound(id)),
        }
    }
}
