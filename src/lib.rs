//! vidscribe - turn a video URL into a formatted transcript
//!
//! This library runs a fetch → transcribe → format pipeline per job in the
//! background. Callers start a job through the [`Orchestrator`] and poll its
//! [`JobRecord`] until it reaches a terminal status.

pub mod cli;
pub mod config;
pub mod fetch;
pub mod jobs;
pub mod orchestrator;
pub mod output;
pub mod testing;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use fetch::{AudioHandle, FetchError, FetchRequest, Fetcher, VideoMetadata};
pub use jobs::{JobId, JobRecord, JobRequest, JobStatus, JobStep};
pub use orchestrator::Orchestrator;
pub use output::{ArtifactKind, DisplayOptions, FileRenderer, RenderError, Renderer};
pub use transcribe::{
    ModelSize, ProgressReporter, Segment, TranscribeError, Transcriber, Transcript,
    TranscriptionOutput, TranscriptionRequest, Word,
};

/// Result type used throughout the binary and configuration layer
pub type Result<T> = anyhow::Result<T>;

/// Reasons a pipeline run ends in the `failed` state
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Invalid source URL: {0}")]
    InvalidSource(String),

    #[error("Video duration ({duration:.0}s) exceeds limit ({limit}s)")]
    DurationExceeded { duration: f64, limit: u64 },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("No artifact could be produced ({0})")]
    NoArtifacts(String),

    #[error("Stage timed out after {0:?}")]
    StageTimedOut(std::time::Duration),

    #[error("job cancelled")]
    Cancelled,

    #[error("Failed to prepare job workspace: {0}")]
    Workspace(#[from] std::io::Error),
}
