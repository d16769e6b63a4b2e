use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Read-only settings shared by every pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Sources reporting a longer duration are rejected before download
    pub max_duration_seconds: u64,

    /// Applied to each collaborator call when set
    pub stage_timeout: Option<Duration>,

    /// Ask the engine for word-level timings
    pub word_timestamps: bool,

    /// Parent of the per-job scratch directories
    pub temp_dir: PathBuf,

    /// Where renderers write artifacts
    pub output_dir: PathBuf,
}

impl PipelineSettings {
    pub fn new(output_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_duration_seconds: 4 * 3600,
            stage_timeout: None,
            word_timestamps: true,
            temp_dir: temp_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_duration_seconds: config.limits.max_duration_seconds,
            stage_timeout: config.stage_timeout(),
            word_timestamps: config.transcription.word_timestamps,
            temp_dir: config.temp_dir(),
            output_dir: config.output_dir(),
        }
    }

    pub fn with_max_duration(mut self, seconds: u64) -> Self {
        self.max_duration_seconds = seconds;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }
}
