//! Job orchestrator.
//!
//! Drives each job through fetch, transcribe and format on its own task:
//! - **start_job** returns the id immediately; the record is `pending`
//! - **get_job_status** is a snapshot read and never blocks on a running job
//! - **cancel_job** stops a live job at the next stage boundary

mod runner;
mod settings;

pub use settings::PipelineSettings;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::fetch::{Fetcher, YtDlpFetcher};
use crate::jobs::{JobId, JobRecord, JobRequest, JobStore, JobStoreError};
use crate::output::{renderers_for, Renderer};
use crate::transcribe::{Transcriber, WhisperCliTranscriber};
use runner::PipelineRunner;

/// Entry point for submitting and observing jobs. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<PipelineRunner>,
}

impl Orchestrator {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<JobStore>,
        fetcher: Arc<dyn Fetcher>,
        transcriber: Arc<dyn Transcriber>,
        renderers: Vec<Arc<dyn Renderer>>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineRunner {
                settings,
                store,
                fetcher,
                transcriber,
                renderers,
                cancellations: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Wire up yt-dlp, whisper.cpp and the configured renderers
    pub fn from_config(config: &Config, output_dir: Option<PathBuf>) -> Self {
        let mut settings = PipelineSettings::from_config(config);
        if let Some(dir) = output_dir {
            settings.output_dir = dir;
        }

        let fetcher = YtDlpFetcher::new(&config.fetch.yt_dlp_path, &config.fetch.audio_format);
        let transcriber = WhisperCliTranscriber::new(
            config.whisper_settings(),
            config.transcription.resident_models,
        );

        Self::new(
            settings,
            Arc::new(JobStore::new(config.job_retention())),
            Arc::new(fetcher),
            Arc::new(transcriber),
            renderers_for(&config.output.artifacts),
        )
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// Register a `pending` job and spawn its pipeline.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_job(&self, request: JobRequest) -> JobId {
        let job_id = loop {
            let candidate = JobId::new();
            match self.inner.store.create(candidate) {
                Ok(_) => break candidate,
                Err(JobStoreError::Duplicate(id)) => {
                    debug!(%id, "Job id collision, regenerating");
                }
            }
        };

        let token = CancellationToken::new();
        self.inner.cancellations.lock().insert(job_id, token.clone());

        info!(%job_id, source = %request.source, "Job accepted");
        tokio::spawn(self.inner.clone().run(job_id, request, token));

        job_id
    }

    /// Snapshot of a job, or None when the id is unknown
    pub fn get_job_status(&self, job_id: &JobId) -> Option<JobRecord> {
        self.inner.store.get(job_id)
    }

    /// Every known job, oldest first
    pub fn list_jobs(&self) -> Vec<JobRecord> {
        self.inner.store.list()
    }

    /// Request cancellation of a live job.
    ///
    /// Returns false when the job is unknown or already finished. The job
    /// ends in `failed` with the error "job cancelled".
    pub fn cancel_job(&self, job_id: &JobId) -> bool {
        let live = self
            .inner
            .store
            .get(job_id)
            .is_some_and(|record| !record.is_terminal());
        if !live {
            return false;
        }

        match self.inner.cancellations.lock().get(job_id) {
            Some(token) => {
                info!(%job_id, "Cancelling job");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.inner.settings)
            .field("jobs", &self.inner.store.len())
            .field("fetcher", &self.inner.fetcher.backend_name())
            .field("transcriber", &self.inner.transcriber.engine_name())
            .finish()
    }
}
