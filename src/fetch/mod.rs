use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod ytdlp;

pub use ytdlp::YtDlpFetcher;

/// Information about the source video, available before download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,

    /// Original URL that was processed
    pub source_url: String,

    /// Duration in seconds, 0 when unknown
    pub duration_seconds: f64,

    /// Upload date as reported by the platform (YYYYMMDD)
    pub upload_date: Option<String>,

    pub thumbnail_url: Option<String>,
}

impl VideoMetadata {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            duration_seconds,
            upload_date: None,
            thumbnail_url: None,
        }
    }
}

/// What to fetch, and with which credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source: String,

    /// Netscape-format cookie file for authenticated fetches
    pub cookies_path: Option<PathBuf>,
}

/// A downloaded audio file inside the job's scratch directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    pub path: PathBuf,
}

impl AudioHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0} is not available. Please install it: https://github.com/yt-dlp/yt-dlp")]
    ToolUnavailable(String),

    #[error("Unexpected fetcher output: {0}")]
    InvalidResponse(String),

    #[error("Fetch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio fetching backend
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Look up metadata without downloading the media
    async fn metadata(&self, request: &FetchRequest) -> Result<VideoMetadata, FetchError>;

    /// Download the audio track into `workdir`
    async fn download(&self, request: &FetchRequest, workdir: &Path) -> Result<AudioHandle, FetchError>;

    /// Name of the backend, for logs
    fn backend_name(&self) -> &'static str;
}
