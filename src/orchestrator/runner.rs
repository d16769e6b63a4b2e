//! Pipeline run for a single job.
//!
//! Stages run strictly in order: fetch, transcribe, format. Every stage call
//! is raced against the job's cancellation token and the optional stage
//! timeout. Errors end the job in `failed`; nothing is propagated upwards.

use futures_util::future::join_all;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use super::PipelineSettings;
use crate::fetch::{FetchRequest, Fetcher};
use crate::jobs::store::JobUpdater;
use crate::jobs::{JobId, JobRequest, JobStep, JobStore};
use crate::output::{DisplayOptions, Renderer};
use crate::transcribe::{ProgressReporter, Transcriber, Transcript, TranscriptionRequest};
use crate::utils::validate_and_normalize_url;
use crate::PipelineError;

pub(crate) const PROGRESS_FETCHING: u8 = 10;
pub(crate) const PROGRESS_TRANSCRIBING: u8 = 30;
pub(crate) const PROGRESS_FORMATTING: u8 = 80;

/// Map engine progress (0 to 100) into the transcription window (30 to 80)
pub(crate) fn transcription_progress(engine_percent: u8) -> u8 {
    let span = (PROGRESS_FORMATTING - PROGRESS_TRANSCRIBING) as u16;
    PROGRESS_TRANSCRIBING + (engine_percent.min(100) as u16 * span / 100) as u8
}

/// Text of a caught panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Outcome of the formatting stage
struct FormatSummary {
    produced: usize,
    failures: Vec<String>,
}

pub(crate) struct PipelineRunner {
    pub(crate) settings: PipelineSettings,
    pub(crate) store: Arc<JobStore>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) transcriber: Arc<dyn Transcriber>,
    pub(crate) renderers: Vec<Arc<dyn Renderer>>,
    pub(crate) cancellations: Mutex<HashMap<JobId, CancellationToken>>,
}

impl PipelineRunner {
    /// Run one job to a terminal state.
    ///
    /// A panic in a collaborator is caught here and fails the job. The
    /// cancellation token is dropped before the terminal write, so
    /// `cancel_job` never reports a finished job as cancellable.
    pub(crate) async fn run(self: Arc<Self>, job_id: JobId, request: JobRequest, token: CancellationToken) {
        let updater = JobUpdater::new(self.store.clone(), job_id);
        let span = tracing::info_span!("job", %job_id);

        async {
            let outcome = AssertUnwindSafe(self.execute(&updater, &request, &token))
                .catch_unwind()
                .await;
            self.cancellations.lock().remove(&job_id);

            match outcome {
                Ok(Ok(())) => {
                    updater.complete();
                    info!("Job completed successfully");
                }
                Ok(Err(err)) => {
                    error!("Job failed: {}", err);
                    updater.fail(err.to_string());
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    error!("Job panicked: {}", message);
                    updater.fail(format!("internal error: {}", message));
                }
            }
        }
        .instrument(span)
        .await;
    }

    async fn execute(
        &self,
        updater: &JobUpdater,
        request: &JobRequest,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        updater.enter_step(JobStep::FetchingAudio, PROGRESS_FETCHING);
        info!("Fetching audio from {}", request.source);

        validate_and_normalize_url(&request.source)
            .map_err(|e| PipelineError::InvalidSource(e.to_string()))?;

        fs_err::create_dir_all(&self.settings.temp_dir)?;
        let workdir = tempfile::Builder::new()
            .prefix("vidscribe-job-")
            .tempdir_in(&self.settings.temp_dir)?;

        let result = self.process(updater, request, token, workdir.path()).await;

        // Cleanup never fails the job
        let workdir_path = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            warn!("Failed to clean up {}: {}", workdir_path.display(), e);
        }

        let summary = result?;
        if summary.produced == 0 {
            let reason = if summary.failures.is_empty() {
                "no renderers configured".to_string()
            } else {
                summary.failures.join("; ")
            };
            return Err(PipelineError::NoArtifacts(reason));
        }

        if !summary.failures.is_empty() {
            warn!(
                failed = summary.failures.len(),
                "Completed with partial artifacts: {}",
                summary.failures.join("; ")
            );
        }
        Ok(())
    }

    async fn process(
        &self,
        updater: &JobUpdater,
        request: &JobRequest,
        token: &CancellationToken,
        workdir: &Path,
    ) -> Result<FormatSummary, PipelineError> {
        let fetch_request = FetchRequest {
            source: request.source.clone(),
            cookies_path: request.cookies_path.clone(),
        };

        let metadata = self.stage(token, self.fetcher.metadata(&fetch_request)).await?;
        info!(
            title = %metadata.title,
            duration = metadata.duration_seconds,
            "Fetched metadata"
        );

        let limit = self.settings.max_duration_seconds;
        if metadata.duration_seconds > limit as f64 {
            return Err(PipelineError::DurationExceeded {
                duration: metadata.duration_seconds,
                limit,
            });
        }

        let audio = self
            .stage(token, self.fetcher.download(&fetch_request, workdir))
            .await?;

        updater.enter_step(JobStep::Transcribing, PROGRESS_TRANSCRIBING);
        info!(
            model = %request.model_size,
            engine = self.transcriber.engine_name(),
            "Transcribing {}",
            audio.path.display()
        );

        let reporter = {
            let updater = updater.clone();
            ProgressReporter::new(move |percent| updater.set_progress(transcription_progress(percent)))
        };
        let transcription_request = TranscriptionRequest {
            language: request.language.clone(),
            model_size: request.model_size,
            word_timestamps: self.settings.word_timestamps,
        };
        let output = self
            .stage(
                token,
                self.transcriber
                    .transcribe(&audio.path, &transcription_request, reporter),
            )
            .await?;
        updater.set_progress(PROGRESS_FORMATTING);

        let transcript = Transcript::new(updater.job_id(), metadata, output);

        updater.enter_step(JobStep::Formatting, PROGRESS_FORMATTING);
        info!(segments = transcript.segments.len(), "Formatting");

        self.format(updater, request, token, &transcript).await
    }

    /// Run every renderer independently; one failing does not stop the others
    async fn format(
        &self,
        updater: &JobUpdater,
        request: &JobRequest,
        token: &CancellationToken,
        transcript: &Transcript,
    ) -> Result<FormatSummary, PipelineError> {
        let options = DisplayOptions {
            include_timestamps: request.include_timestamps,
            include_speakers: request.include_speakers,
        };
        let output_dir = self.settings.output_dir.as_path();

        let renders = self.renderers.iter().map(|renderer| {
            let options = &options;
            async move {
                let kind = renderer.kind();
                match self
                    .stage(token, renderer.render(transcript, options, output_dir))
                    .await
                {
                    Ok(path) => {
                        updater.record_artifact(kind, path);
                        Ok(None)
                    }
                    Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
                    Err(err) => {
                        warn!("Renderer '{}' failed: {}", kind, err);
                        let message = err.to_string();
                        updater.record_artifact_failure(kind, message.clone());
                        Ok(Some(format!("{}: {}", kind, message)))
                    }
                }
            }
        });

        let mut failures = Vec::new();
        for result in join_all(renders).await {
            if let Some(failure) = result? {
                failures.push(failure);
            }
        }

        Ok(FormatSummary {
            produced: updater.artifact_count(),
            failures,
        })
    }

    /// Await a stage, honoring cancellation and the stage timeout
    async fn stage<T, E, F>(&self, token: &CancellationToken, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, E>>,
        PipelineError: From<E>,
    {
        let timed = async {
            match self.settings.stage_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result.map_err(PipelineError::from),
                    Err(_) => Err(PipelineError::StageTimedOut(limit)),
                },
                None => fut.await.map_err(PipelineError::from),
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(PipelineError::Cancelled),
            result = timed => result,
        }
    }
}
