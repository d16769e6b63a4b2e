use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::fetch::VideoMetadata;
use crate::jobs::JobId;

pub mod pool;
pub mod whisper;

pub use pool::{ModelLease, ModelLoader, ModelPool};
pub use whisper::WhisperCliTranscriber;

/// Speaker label used when no diarization is performed
pub const DEFAULT_SPEAKER: &str = "SPEAKER_00";

/// Word-level timing inside a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,

    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Probability reported by the engine (0.0 to 1.0)
    pub confidence: f64,
}

/// Individual transcript segment with timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Sequential id, starting at 1
    pub segment_id: u32,

    /// Start time in seconds
    pub start_time: f64,

    /// End time in seconds
    pub end_time: f64,

    pub text: String,

    pub speaker: String,

    pub confidence: f64,

    /// Empty when word timestamps were not requested
    pub words: Vec<Word>,
}

impl Segment {
    pub fn new(segment_id: u32, start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self {
            segment_id,
            start_time,
            end_time,
            text: text.into(),
            speaker: DEFAULT_SPEAKER.to_string(),
            confidence: 0.0,
            words: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = speaker.into();
        self
    }

    pub fn with_words(mut self, words: Vec<Word>) -> Self {
        self.words = words;
        self
    }
}

/// Everything the renderers need for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub job_id: JobId,

    pub metadata: VideoMetadata,

    /// Ordered by start time, ids 1..n
    pub segments: Vec<Segment>,

    /// Language detected or forced during transcription
    pub language: Option<String>,
}

impl Transcript {
    pub fn new(job_id: JobId, metadata: VideoMetadata, output: TranscriptionOutput) -> Self {
        Self {
            job_id,
            metadata,
            segments: order_segments(output.segments),
            language: output.language,
        }
    }

    /// Plain text of all segments, one per line
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Sort segments by start time and renumber them from 1.
///
/// The sort is stable, so segments sharing a start time keep emission order.
pub fn order_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    for (index, segment) in segments.iter_mut().enumerate() {
        segment.segment_id = index as u32 + 1;
        if segment.end_time < segment.start_time {
            segment.end_time = segment.start_time;
        }
    }
    segments
}

/// Whisper model size selector
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelSize {
    #[serde(rename = "tiny")]
    Tiny,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "small")]
    Small,
    #[default]
    #[serde(rename = "medium")]
    Medium,
    #[value(name = "large-v2")]
    #[serde(rename = "large-v2")]
    LargeV2,
    #[value(name = "large-v3")]
    #[serde(rename = "large-v3")]
    LargeV3,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::LargeV2 => "large-v2",
            ModelSize::LargeV3 => "large-v3",
        }
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoding precision / speed trade-off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    /// Quantized weights, fastest on CPU
    #[default]
    Int8,
    Float16,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Int8 => "int8",
            ComputeType::Float16 => "float16",
        }
    }
}

/// Options for one transcription call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionRequest {
    /// Language hint, auto-detect when absent
    pub language: Option<String>,

    pub model_size: ModelSize,

    pub word_timestamps: bool,
}

/// Raw engine output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionOutput {
    pub segments: Vec<Segment>,

    pub language: Option<String>,
}

/// Callback the engine uses to report completion percentage (0 to 100)
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, percent: u8) {
        (self.callback)(percent.min(100));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TranscribeError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio file not found: {}", .0.display())]
    AudioMissing(PathBuf),

    #[error("Transcription I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech-to-text engine
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a local audio file into ordered segments
    async fn transcribe(
        &self,
        audio: &Path,
        request: &TranscriptionRequest,
        progress: ProgressReporter,
    ) -> Result<TranscriptionOutput, TranscribeError>;

    /// Name of the engine, for logs
    fn engine_name(&self) -> &'static str;
}
