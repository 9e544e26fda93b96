//! Job status tracking.
//!
//! One [`JobStatus`] record per upload, kept in a process-wide map. The
//! owning ingestion worker is the only writer for a job; readers (the
//! status endpoint, summaries) always see a consistent snapshot because
//! updates replace whole records under the lock. Terminal records are
//! immutable and reclaimed after a TTL.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::NaiveDateTime;
use logstore::entry::{ts_millis, ts_millis_opt};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::parser::timestamp;

/// Job lifecycle state. Transitions are strictly monotone:
/// `QUEUED -> PROCESSING -> {COMPLETED, FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Queued => "QUEUED",
            JobState::Processing => "PROCESSING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Observable state of one ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub status: JobState,
    /// 0..100.
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,

    pub file_name: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp_format: Option<String>,

    pub total_lines: u64,
    pub processed_lines: u64,
    pub successful_lines: u64,
    pub failed_lines: u64,

    #[serde(with = "ts_millis")]
    pub started_at: NaiveDateTime,
    #[serde(with = "ts_millis")]
    pub updated_at: NaiveDateTime,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lines_per_second: Option<f64>,

    /// Per-level counts, computed in the finalization pass.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub level_counts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_count: Option<u64>,
}

impl JobStatus {
    /// A freshly queued job.
    pub fn queued(
        job_id: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        timestamp_format: Option<String>,
    ) -> Self {
        let now = timestamp::now();
        Self {
            job_id: job_id.into(),
            status: JobState::Queued,
            progress: 0,
            message: "Job queued for processing".to_string(),
            error: None,
            file_name: file_name.into(),
            file_size,
            timestamp_format,
            total_lines: 0,
            processed_lines: 0,
            successful_lines: 0,
            failed_lines: 0,
            started_at: now,
            updated_at: now,
            completed_at: None,
            processing_time_ms: None,
            lines_per_second: None,
            level_counts: BTreeMap::new(),
            error_count: None,
        }
    }
}

/// Process-wide job status map with TTL-based reclamation.
#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, status: JobStatus) {
        self.jobs
            .write()
            .await
            .insert(status.job_id.clone(), status);
    }

    /// Snapshot of a job's status.
    pub async fn get(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::job_not_found(job_id))
    }

    pub async fn exists(&self, job_id: &str) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    pub async fn remove(&self, job_id: &str) -> bool {
        self.jobs.write().await.remove(job_id).is_some()
    }

    /// Mutates a non-terminal job's record; `updatedAt` always advances and
    /// progress never moves backwards.
    pub async fn update<F>(&self, job_id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut JobStatus),
    {
        let mut jobs = self.jobs.write().await;
        let status = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        if status.status.is_terminal() {
            return Err(Error::Internal(format!(
                "job {} is already {}",
                job_id, status.status
            )));
        }

        let previous_progress = status.progress;
        mutate(status);
        status.progress = status.progress.max(previous_progress).min(100);
        status.updated_at = timestamp::now();
        Ok(())
    }

    /// Validated state-machine transition; terminal transitions stamp
    /// `completedAt`.
    pub async fn transition<F>(&self, job_id: &str, next: JobState, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut JobStatus),
    {
        let mut jobs = self.jobs.write().await;
        let status = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        if !status.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal job transition {} -> {} for {}",
                status.status, next, job_id
            )));
        }

        status.status = next;
        let previous_progress = status.progress;
        mutate(status);
        status.progress = status.progress.max(previous_progress).min(100);
        let now = timestamp::now();
        status.updated_at = now;
        if next.is_terminal() {
            status.completed_at = Some(now);
        }
        Ok(())
    }

    /// Removes terminal records past their TTL. Returns how many were
    /// reclaimed.
    pub async fn reclaim_expired(&self, ttl: Duration) -> usize {
        let cutoff = timestamp::now()
            - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, status| {
            !(status.status.is_terminal()
                && status.completed_at.map(|at| at < cutoff).unwrap_or(false))
        });
        let reclaimed = before - jobs.len();
        if reclaimed > 0 {
            debug!(reclaimed, "reclaimed expired job statuses");
        }
        reclaimed
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
