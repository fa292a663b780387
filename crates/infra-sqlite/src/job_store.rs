// SQLite JobStore Implementation

use crate::error::{corrupt, map_sqlx_error};
use async_trait::async_trait;
use realty_core::domain::{
    ErrorKind, JobError, JobId, JobState, Portal, PublicationAction, PublicationJob,
};
use realty_core::error::Result;
use realty_core::port::JobStore;
use sqlx::SqlitePool;

const SELECT_JOB: &str = r#"
    SELECT id, property_id, portal, action, state, progress, attempt, max_attempts,
           last_error_kind, last_error_message, result_url,
           created_at, updated_at, scheduled_for
    FROM publication_jobs
"#;

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, bind: Option<&str>) -> Result<Vec<PublicationJob>> {
        let sql = format!("{} WHERE {} ORDER BY created_at ASC, id ASC", SELECT_JOB, clause);
        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(JobRow::into_job).collect()
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save_job(&self, job: &PublicationJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publication_jobs (
                id, property_id, portal, action, state, progress, attempt, max_attempts,
                last_error_kind, last_error_message, result_url,
                created_at, updated_at, scheduled_for
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                progress = excluded.progress,
                attempt = excluded.attempt,
                max_attempts = excluded.max_attempts,
                last_error_kind = excluded.last_error_kind,
                last_error_message = excluded.last_error_message,
                result_url = excluded.result_url,
                updated_at = excluded.updated_at,
                scheduled_for = excluded.scheduled_for
            "#,
        )
        .bind(&job.id)
        .bind(&job.property_id)
        .bind(job.portal.as_str())
        .bind(job.action.as_str())
        .bind(job.state.as_str())
        .bind(i64::from(job.progress))
        .bind(i64::from(job.attempt))
        .bind(i64::from(job.max_attempts))
        .bind(job.last_error.as_ref().map(|e| e.kind.as_str()))
        .bind(job.last_error.as_ref().map(|e| e.message.as_str()))
        .bind(&job.result_url)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.scheduled_for)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_job(&self, id: &JobId) -> Result<Option<PublicationJob>> {
        let sql = format!("{} WHERE id = ?", SELECT_JOB);
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn load_active_jobs_for_property(
        &self,
        property_id: &str,
    ) -> Result<Vec<PublicationJob>> {
        self.fetch_where(
            "property_id = ? AND state IN ('QUEUED', 'DISPATCHING', 'PUBLISHING')",
            Some(property_id),
        )
        .await
    }

    async fn load_jobs_for_property(&self, property_id: &str) -> Result<Vec<PublicationJob>> {
        self.fetch_where("property_id = ?", Some(property_id)).await
    }

    async fn load_interrupted_jobs(&self) -> Result<Vec<PublicationJob>> {
        self.fetch_where("state IN ('DISPATCHING', 'PUBLISHING')", None)
            .await
    }

    async fn load_queued_jobs(&self) -> Result<Vec<PublicationJob>> {
        self.fetch_where("state = 'QUEUED'", None).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    property_id: String,
    portal: String,
    action: String,
    state: String,
    progress: i64,
    attempt: i64,
    max_attempts: i64,
    last_error_kind: Option<String>,
    last_error_message: Option<String>,
    result_url: Option<String>,
    created_at: i64,
    updated_at: i64,
    scheduled_for: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<PublicationJob> {
        let bad = |detail: String| corrupt("publication_jobs", &self.id, detail);

        let portal: Portal = self.portal.parse().map_err(|e| bad(format!("{}", e)))?;
        let action: PublicationAction =
            self.action.parse().map_err(|e| bad(format!("{}", e)))?;
        let state: JobState = self.state.parse().map_err(|e| bad(format!("{}", e)))?;
        let last_error = match self.last_error_kind.as_deref() {
            Some(kind) => {
                let kind: ErrorKind = kind.parse().map_err(|e| bad(format!("{}", e)))?;
                Some(JobError::new(
                    kind,
                    self.last_error_message.unwrap_or_default(),
                ))
            }
            None => None,
        };

        Ok(PublicationJob {
            id: self.id.clone(),
            property_id: self.property_id,
            portal,
            action,
            state,
            progress: self.progress.clamp(0, 100) as u8,
            attempt: self.attempt.max(0) as u32,
            max_attempts: self.max_attempts.max(0) as u32,
            last_error,
            result_url: self.result_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            scheduled_for: self.scheduled_for,
        })
    }
}
