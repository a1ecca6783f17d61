use super::utils::start_transaction;
use crate::database::jobs::{
    aggregate_details, finalize_job, increment_retry_count, read_status, read_status_for_update,
    update_status, JobDetailQueries, JobQueries,
};
use crate::database::quality::violation_counts;
use crate::models::{Job, JobDetail, JobStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use instrument::symbols::InstrumentType;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

/// Drives one job's lifecycle: `pending → running → {completed | failed |
/// cancelled}` with `retrying` as a transient sub-state. Every transition is
/// validated against the legal table before it is written.
pub struct JobTracker {
    pool: PgPool,
    job_id: i32,
}

impl JobTracker {
    /// Create the job in `pending`, then move it to `running`.
    pub async fn start(
        pool: &PgPool,
        job_name: &str,
        job_type: &str,
        target_instrument_type: Option<InstrumentType>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self> {
        let job = Job::new(job_name, job_type, target_instrument_type, metadata);

        let mut tx = start_transaction(pool).await?;
        let job_id = job.create(&mut tx).await?;
        tx.commit().await?;

        let tracker = JobTracker {
            pool: pool.clone(),
            job_id,
        };
        tracker
            .transition(JobStatus::Running, Some(Utc::now()), None)
            .await?;

        info!("Job {} ({}) is running", job_id, job_name);
        Ok(tracker)
    }

    pub fn job_id(&self) -> i32 {
        self.job_id
    }

    async fn transition(
        &self,
        next: JobStatus,
        started_at: Option<DateTime<Utc>>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut tx = start_transaction(&self.pool).await?;

        let current = read_status_for_update(&mut tx, self.job_id).await?;
        if !current.can_transition_to(next) {
            return Err(crate::error!(
                StateError,
                "Job {} cannot move {} -> {}", self.job_id, current, next
            ));
        }

        update_status(&mut tx, self.job_id, next, started_at, error_message).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Enter the transient retry sub-state after a recoverable
    /// per-instrument error.
    pub async fn mark_retrying(&self) -> Result<()> {
        let mut tx = start_transaction(&self.pool).await?;

        let current = read_status_for_update(&mut tx, self.job_id).await?;
        if !current.can_transition_to(JobStatus::Retrying) {
            return Err(crate::error!(
                StateError,
                "Job {} cannot move {} -> retrying", self.job_id, current
            ));
        }

        update_status(&mut tx, self.job_id, JobStatus::Retrying, None, None).await?;
        increment_retry_count(&mut tx, self.job_id).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Exit the retry sub-state back into `running`.
    pub async fn resume(&self) -> Result<()> {
        self.transition(JobStatus::Running, None, None).await
    }

    pub async fn status(&self) -> Result<JobStatus> {
        read_status(&self.pool, self.job_id).await
    }

    /// Polled between instruments; cancellation stops new work, not work in
    /// flight.
    pub async fn is_cancelled(&self) -> Result<bool> {
        Ok(self.status().await? == JobStatus::Cancelled)
    }

    /// Append one detail row in its own short transaction, outside any
    /// instrument transaction. Used for failure records that must survive a
    /// rollback.
    pub async fn record_detail(&self, detail: &JobDetail) -> Result<()> {
        let mut tx = start_transaction(&self.pool).await?;
        detail.create(&mut tx).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Finalize the job: aggregate counts from the detail rows, compute the
    /// duration, and write the terminal status. Best-effort completion: the
    /// job is `failed` only when no instrument succeeded.
    pub async fn finish(&self) -> Result<Job> {
        let completed_at = Utc::now();
        let mut tx = start_transaction(&self.pool).await?;

        let current = read_status_for_update(&mut tx, self.job_id).await?;
        let aggregates = aggregate_details(&mut tx, self.job_id).await?;
        let quality = violation_counts(&mut tx, self.job_id).await?;

        let mut error_message = None;
        let final_status = match current {
            JobStatus::Cancelled => JobStatus::Cancelled,
            _ => {
                let status = if aggregates.succeeded_operations == 0 && aggregates.failed > 0 {
                    error_message = Some("No instrument completed successfully".to_string());
                    JobStatus::Failed
                } else {
                    JobStatus::Completed
                };
                if !current.can_transition_to(status) {
                    return Err(crate::error!(
                        StateError,
                        "Job {} cannot move {} -> {}", self.job_id, current, status
                    ));
                }
                status
            }
        };

        let started_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT started_at FROM etl_jobs WHERE id = $1")
                .bind(self.job_id)
                .fetch_one(&mut *tx)
                .await?;
        let duration_seconds = started_at.map(|s| (completed_at - s).num_seconds());

        finalize_job(
            &mut tx,
            self.job_id,
            final_status,
            completed_at,
            duration_seconds,
            &aggregates,
            error_message.as_deref(),
        )
        .await?;

        // Surface the quality verdicts alongside the counts.
        if !quality.is_empty() {
            let summary: serde_json::Map<String, serde_json::Value> = quality
                .into_iter()
                .map(|(severity, count)| (severity, json!(count)))
                .collect();
            let _ = sqlx::query(
                r#"
                UPDATE etl_jobs
                SET metadata = COALESCE(metadata, '{}'::jsonb) || $1::jsonb
                WHERE id = $2
                "#,
            )
            .bind(json!({ "quality_violations": summary }))
            .bind(self.job_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            "Job {} finished as {} ({} processed, {} failed)",
            self.job_id, final_status, aggregates.processed, aggregates.failed
        );

        Job::read_by_id(&self.pool, self.job_id)
            .await?
            .ok_or_else(|| Error::CustomError(format!("Job {} missing after finish", self.job_id)))
    }

    /// Orchestrator-requested cancellation. In-flight instrument
    /// transactions finish or roll back on their own; the pipeline simply
    /// stops starting new instruments once it observes the status.
    pub async fn cancel(pool: &PgPool, job_id: i32) -> Result<JobStatus> {
        let mut tx = start_transaction(pool).await?;

        let current = read_status_for_update(&mut tx, job_id).await?;
        if !current.can_transition_to(JobStatus::Cancelled) {
            warn!("Cancel refused for job {} in state {}", job_id, current);
            return Err(crate::error!(
                StateError,
                "Job {} cannot move {} -> cancelled", job_id, current
            ));
        }

        update_status(&mut tx, job_id, JobStatus::Cancelled, None, None).await?;
        tx.commit().await?;

        info!("Job {} cancelled", job_id);
        Ok(JobStatus::Cancelled)
    }
}
