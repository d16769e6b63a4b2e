//! In-memory job store.
//!
//! Any number of pollers may read concurrently; each record has a single
//! writer, the task running its job, which goes through [`JobUpdater`].

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{JobId, JobRecord, JobStatus, JobStep};
use crate::output::ArtifactKind;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum JobStoreError {
    #[error("Job {0} already exists")]
    Duplicate(JobId),
}

/// How long finished jobs are kept around. Unset limits keep them forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobRetention {
    /// Maximum number of completed/failed records kept
    pub max_finished_jobs: Option<usize>,

    /// Finished records older than this (since their last update) are dropped
    pub finished_ttl: Option<Duration>,
}

impl JobRetention {
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn is_unbounded(&self) -> bool {
        self.max_finished_jobs.is_none() && self.finished_ttl.is_none()
    }
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    retention: JobRetention,
}

impl JobStore {
    pub fn new(retention: JobRetention) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Insert a fresh `pending` record
    pub fn create(&self, job_id: JobId) -> Result<JobRecord, JobStoreError> {
        let record = JobRecord::new(job_id);
        {
            let mut jobs = self.jobs.write();
            if jobs.contains_key(&job_id) {
                return Err(JobStoreError::Duplicate(job_id));
            }
            jobs.insert(job_id, record.clone());
        }
        self.prune();
        Ok(record)
    }

    /// Snapshot of the current record
    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Snapshots of every record, oldest first
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.jobs.read().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Apply `mutate` to a live record.
    ///
    /// Returns false when the record is unknown or already terminal. Progress
    /// is clamped so it never goes backwards.
    pub(crate) fn update<F>(&self, job_id: &JobId, mutate: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write();
        let Some(record) = jobs.get_mut(job_id) else {
            return false;
        };
        if record.is_terminal() {
            return false;
        }

        let previous_progress = record.progress_percent;
        mutate(record);
        record.progress_percent = record.progress_percent.max(previous_progress).min(100);
        record.updated_at = Utc::now();
        true
    }

    /// Drop finished records that fall outside the retention policy.
    /// Returns the number of records removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    fn prune_at(&self, now: DateTime<Utc>) -> usize {
        if self.retention.is_unbounded() {
            return 0;
        }

        let mut jobs = self.jobs.write();
        let before = jobs.len();

        if let Some(ttl) = self.retention.finished_ttl {
            let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
            jobs.retain(|_, r| !r.is_terminal() || now.signed_duration_since(r.updated_at) <= ttl);
        }

        if let Some(max) = self.retention.max_finished_jobs {
            let mut finished: Vec<(DateTime<Utc>, JobId)> = jobs
                .values()
                .filter(|r| r.is_terminal())
                .map(|r| (r.updated_at, r.job_id))
                .collect();
            if finished.len() > max {
                finished.sort();
                let excess = finished.len() - max;
                for (_, id) in finished.into_iter().take(excess) {
                    jobs.remove(&id);
                }
            }
        }

        let removed = before - jobs.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned finished jobs");
        }
        removed
    }
}

/// Write access to one record, owned by the task running that job
#[derive(Debug, Clone)]
pub(crate) struct JobUpdater {
    store: Arc<JobStore>,
    job_id: JobId,
}

impl JobUpdater {
    pub(crate) fn new(store: Arc<JobStore>, job_id: JobId) -> Self {
        Self { store, job_id }
    }

    pub(crate) fn job_id(&self) -> JobId {
        self.job_id
    }

    pub(crate) fn enter_step(&self, step: JobStep, progress: u8) {
        self.store.update(&self.job_id, |r| {
            r.status = JobStatus::Processing;
            r.current_step = step;
            r.progress_percent = progress;
        });
    }

    pub(crate) fn set_progress(&self, progress: u8) {
        self.store.update(&self.job_id, |r| r.progress_percent = progress);
    }

    pub(crate) fn record_artifact(&self, kind: ArtifactKind, path: PathBuf) {
        self.store.update(&self.job_id, |r| {
            r.artifacts.insert(kind, path);
        });
    }

    pub(crate) fn record_artifact_failure(&self, kind: ArtifactKind, message: String) {
        self.store.update(&self.job_id, |r| {
            r.failed_artifacts.insert(kind, message);
        });
    }

    pub(crate) fn artifact_count(&self) -> usize {
        self.store
            .get(&self.job_id)
            .map(|r| r.artifacts.len())
            .unwrap_or(0)
    }

    pub(crate) fn complete(&self) {
        self.store.update(&self.job_id, |r| {
            r.status = JobStatus::Completed;
            r.current_step = JobStep::Done;
            r.progress_percent = 100;
        });
    }

    pub(crate) fn fail(&self, message: String) {
        let message = if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        };
        self.store.update(&self.job_id, |r| {
            r.status = JobStatus::Failed;
            r.error = Some(message);
        });
    }
}
