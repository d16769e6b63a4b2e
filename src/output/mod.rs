use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::transcribe::Transcript;
use crate::utils::artifact_file_stem;

pub mod docx;
pub mod formatters;

pub use docx::format_as_docx;
pub use formatters::*;

/// Kind of file produced for a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Markdown document with header and metadata
    Document,
    /// Plain text
    Plaintext,
    /// SRT subtitle format
    Subtitles,
    /// JSON with segments and word timings
    Json,
    /// Word document
    Docx,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Document,
        ArtifactKind::Plaintext,
        ArtifactKind::Subtitles,
        ArtifactKind::Json,
        ArtifactKind::Docx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Document => "document",
            ArtifactKind::Plaintext => "plaintext",
            ArtifactKind::Subtitles => "subtitles",
            ArtifactKind::Json => "json",
            ArtifactKind::Docx => "docx",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Document => "md",
            ArtifactKind::Plaintext => "txt",
            ArtifactKind::Subtitles => "srt",
            ArtifactKind::Json => "json",
            ArtifactKind::Docx => "docx",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-selected display flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    pub include_timestamps: bool,
    pub include_speakers: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            include_timestamps: true,
            include_speakers: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Failed to write transcript: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize transcript: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to build Word document: {0}")]
    Docx(String),
}

/// Turns a transcript into a saved file
#[async_trait]
pub trait Renderer: Send + Sync {
    fn kind(&self) -> ArtifactKind;

    /// Write the artifact into `output_dir` and return its path
    async fn render(
        &self,
        transcript: &Transcript,
        options: &DisplayOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError>;
}

/// Renderer writing one of the built-in formats to disk
#[derive(Debug, Clone, Copy)]
pub struct FileRenderer {
    kind: ArtifactKind,
}

impl FileRenderer {
    pub fn new(kind: ArtifactKind) -> Self {
        Self { kind }
    }

    /// File contents for the transcript, without touching the filesystem
    pub fn format(&self, transcript: &Transcript, options: &DisplayOptions) -> Result<Vec<u8>, RenderError> {
        let content = match self.kind {
            ArtifactKind::Document => format_as_markdown(transcript, options),
            ArtifactKind::Plaintext => format_as_text(transcript, options),
            ArtifactKind::Subtitles => format_as_srt(transcript, options),
            ArtifactKind::Json => format_as_json(transcript)?,
            ArtifactKind::Docx => return format_as_docx(transcript, options),
        };
        Ok(content.into_bytes())
    }
}

#[async_trait]
impl Renderer for FileRenderer {
    fn kind(&self) -> ArtifactKind {
        self.kind
    }

    async fn render(
        &self,
        transcript: &Transcript,
        options: &DisplayOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError> {
        let content = self.format(transcript, options)?;

        fs_err::tokio::create_dir_all(output_dir).await?;
        let filename = format!(
            "{}.{}",
            artifact_file_stem(&transcript.metadata.title),
            self.kind.extension()
        );
        let path = output_dir.join(filename);
        fs_err::tokio::write(&path, content).await?;

        tracing::info!("{} saved to {}", self.kind, path.display());
        Ok(path)
    }
}

/// Renderers for the given kinds, in order
pub fn renderers_for(kinds: &[ArtifactKind]) -> Vec<Arc<dyn Renderer>> {
    kinds
        .iter()
        .map(|kind| Arc::new(FileRenderer::new(*kind)) as Arc<dyn Renderer>)
        .collect()
}
