use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::output::ArtifactKind;
use crate::transcribe::ModelSize;

pub mod store;

pub use store::{JobRetention, JobStore, JobStoreError};

/// Opaque identifier of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label of the stage a job is in. Observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    Initialized,
    FetchingAudio,
    Transcribing,
    Formatting,
    Done,
}

impl JobStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::Initialized => "initialized",
            JobStep::FetchingAudio => "fetching_audio",
            JobStep::Transcribing => "transcribing",
            JobStep::Formatting => "formatting",
            JobStep::Done => "done",
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job as seen by pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,

    pub status: JobStatus,

    pub current_step: JobStep,

    /// Advisory progress, never decreases
    pub progress_percent: u8,

    /// Set iff `status == failed`
    pub error: Option<String>,

    /// Produced files by artifact kind
    pub artifacts: BTreeMap<ArtifactKind, PathBuf>,

    /// Renderers that failed, with their error message
    pub failed_artifacts: BTreeMap<ArtifactKind, String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Pending,
            current_step: JobStep::Initialized,
            progress_percent: 0,
            error: None,
            artifacts: BTreeMap::new(),
            failed_artifacts: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Parameters of a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Video page URL handed to the fetcher
    pub source: String,

    /// Language hint, auto-detect when absent
    pub language: Option<String>,

    pub model_size: ModelSize,

    pub include_timestamps: bool,

    pub include_speakers: bool,

    /// Netscape cookie file for authenticated fetches
    pub cookies_path: Option<PathBuf>,
}

impl JobRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: None,
            model_size: ModelSize::default(),
            include_timestamps: true,
            include_speakers: true,
            cookies_path: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_model_size(mut self, model_size: ModelSize) -> Self {
        self.model_size = model_size;
        self
    }

    pub fn with_timestamps(mut self, include: bool) -> Self {
        self.include_timestamps = include;
        self
    }

    pub fn with_speakers(mut self, include: bool) -> Self {
        self.include_speakers = include;
        self
    }

    pub fn with_cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_pending() {
        let record = JobRecord::new(JobId::new());
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.current_step, JobStep::Initialized);
        assert_eq!(record.progress_percent, 0);
        assert!(record.error.is_none());
        assert!(record.artifacts.is_empty());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_job_id_round_trips_through_string() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let mut record = JobRecord::new(JobId::new());
        record.current_step = JobStep::FetchingAudio;
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["current_step"], "fetching_audio");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_request_builder_defaults() {
        let request = JobRequest::new("https://example.com/v")
            .with_language("fr")
            .with_speakers(false);
        assert_eq!(request.model_size, ModelSize::Medium);
        assert!(request.include_timestamps);
        assert!(!request.include_speakers);
        assert_eq!(request.language.as_deref(), Some("fr"));
    }
}
