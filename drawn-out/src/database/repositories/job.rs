//! Job repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{JobCounts, JobDbModel, JobStatus};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// A job left `pending` by an earlier run, if any.
    async fn find_pending(&self) -> Result<Option<String>>;
    /// Atomically move one `not_asked` job to `pending` and return its
    /// tournament id.
    async fn claim_next(&self) -> Result<Option<String>>;
    /// Move a `pending` job to `complete`. Returns false if the job was not
    /// pending, which leaves a complete job complete.
    async fn mark_complete(&self, tournament_id: &str) -> Result<bool>;
    async fn get_job(&self, tournament_id: &str) -> Result<JobDbModel>;
    /// Insert `not_asked` jobs, skipping ids that already exist. Returns the
    /// number of new jobs.
    async fn enqueue(&self, tournament_ids: &[String]) -> Result<u64>;
    async fn count_by_status(&self) -> Result<JobCounts>;
    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<JobDbModel>>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn find_pending(&self) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT tournament_id FROM jobs WHERE status = 'pending' ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<String>> {
        retry_on_sqlite_busy("claim_next_job", || async {
            // The status re-check in the outer WHERE keeps the claim atomic
            // against a concurrent claimer that read the same candidate.
            let id = sqlx::query_scalar::<_, String>(
                r#"
                UPDATE jobs
                SET status = 'pending', updated_at = ?
                WHERE id = (SELECT id FROM jobs WHERE status = 'not_asked' ORDER BY id LIMIT 1)
                  AND status = 'not_asked'
                RETURNING tournament_id
                "#,
            )
            .bind(now_ms())
            .fetch_optional(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    async fn mark_complete(&self, tournament_id: &str) -> Result<bool> {
        retry_on_sqlite_busy("mark_job_complete", || async {
            let done = sqlx::query(
                "UPDATE jobs SET status = 'complete', updated_at = ? WHERE tournament_id = ? AND status = 'pending'",
            )
            .bind(now_ms())
            .bind(tournament_id)
            .execute(&self.pool)
            .await?;
            Ok(done.rows_affected() > 0)
        })
        .await
    }

    async fn get_job(&self, tournament_id: &str) -> Result<JobDbModel> {
        sqlx::query_as::<_, JobDbModel>("SELECT * FROM jobs WHERE tournament_id = ?")
            .bind(tournament_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", tournament_id))
    }

    async fn enqueue(&self, tournament_ids: &[String]) -> Result<u64> {
        retry_on_sqlite_busy("enqueue_jobs", || async {
            let now = now_ms();
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0;
            for id in tournament_ids {
                let done = sqlx::query(
                    r#"
                    INSERT INTO jobs (tournament_id, status, updated_at)
                    VALUES (?, 'not_asked', ?)
                    ON CONFLICT (tournament_id) DO NOTHING
                    "#,
                )
                .bind(id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                inserted += done.rows_affected();
            }
            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }

    async fn count_by_status(&self) -> Result<JobCounts> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = JobCounts::default();
        for (status, count) in rows {
            match JobStatus::parse(&status) {
                Some(JobStatus::NotAsked) => counts.not_asked = count,
                Some(JobStatus::Pending) => counts.pending = count,
                Some(JobStatus::Complete) => counts.complete = count,
                None => tracing::warn!(%status, "unknown job status in store"),
            }
        }
        Ok(counts)
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<JobDbModel>> {
        let jobs =
            sqlx::query_as::<_, JobDbModel>("SELECT * FROM jobs WHERE status = ? ORDER BY id")
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(jobs)
    }
}
