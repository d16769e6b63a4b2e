//! In-process collaborators for exercising the orchestrator without yt-dlp
//! or whisper.cpp.
//!
//! Each mock records how it was called and can be told to fail or stall:
//! - [`MockFetcher`] returns fixed metadata and writes a placeholder audio file
//! - [`MockTranscriber`] returns a scripted transcription, optionally reporting progress
//! - [`MockRenderer`] records render calls and can fail on demand

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::fetch::{AudioHandle, FetchError, FetchRequest, Fetcher, VideoMetadata};
use crate::output::{ArtifactKind, DisplayOptions, FileRenderer, RenderError, Renderer};
use crate::transcribe::{
    ProgressReporter, Segment, TranscribeError, Transcriber, Transcript, TranscriptionOutput,
    TranscriptionRequest,
};

/// Mock implementation of the Fetcher trait.
#[derive(Debug)]
pub struct MockFetcher {
    metadata: VideoMetadata,
    /// If set, the next metadata call fails with this error.
    metadata_error: Mutex<Option<FetchError>>,
    /// If set, the next download fails with this error.
    download_error: Mutex<Option<FetchError>>,
    /// Simulated latency of every call.
    delay: Mutex<Duration>,
    metadata_calls: AtomicUsize,
    download_calls: AtomicUsize,
    /// Scratch directories downloads were written into.
    workdirs: Mutex<Vec<PathBuf>>,
}

impl MockFetcher {
    pub fn new(metadata: VideoMetadata) -> Self {
        Self {
            metadata,
            metadata_error: Mutex::new(None),
            download_error: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            metadata_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            workdirs: Mutex::new(Vec::new()),
        }
    }

    /// Metadata for a video of the given length
    pub fn with_duration(title: &str, duration_seconds: f64) -> Self {
        Self::new(VideoMetadata::new(
            title,
            "https://www.youtube.com/watch?v=mock",
            duration_seconds,
        ))
    }

    pub fn fail_metadata(&self, error: FetchError) {
        *self.metadata_error.lock() = Some(error);
    }

    pub fn fail_download(&self, error: FetchError) {
        *self.download_error.lock() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.workdirs.lock().clone()
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn metadata(&self, request: &FetchRequest) -> Result<VideoMetadata, FetchError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.metadata_error.lock().take() {
            return Err(error);
        }

        let mut metadata = self.metadata.clone();
        metadata.source_url = request.source.clone();
        Ok(metadata)
    }

    async fn download(&self, _request: &FetchRequest, workdir: &Path) -> Result<AudioHandle, FetchError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.workdirs.lock().push(workdir.to_path_buf());
        self.simulate_latency().await;

        if let Some(error) = self.download_error.lock().take() {
            return Err(error);
        }

        let path = workdir.join("audio.mp3");
        fs_err::tokio::write(&path, b"ID3 mock audio").await?;
        Ok(AudioHandle::new(path))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Mock implementation of the Transcriber trait.
#[derive(Debug)]
pub struct MockTranscriber {
    output: TranscriptionOutput,
    /// If set, the next call fails with this error.
    next_error: Mutex<Option<TranscribeError>>,
    /// Percentages reported, in order, before returning.
    progress_steps: Mutex<Vec<u8>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TranscriptionRequest>>,
}

impl MockTranscriber {
    pub fn new(output: TranscriptionOutput) -> Self {
        Self {
            output,
            next_error: Mutex::new(None),
            progress_steps: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Two English segments at 0s and 5s
    pub fn two_segments() -> Self {
        Self::new(TranscriptionOutput {
            segments: vec![
                Segment::new(1, 0.0, 5.0, "Hello world.").with_confidence(0.95),
                Segment::new(2, 5.0, 10.0, "This is a test.").with_confidence(0.9),
            ],
            language: Some("en".to_string()),
        })
    }

    pub fn fail_with(&self, error: TranscribeError) {
        *self.next_error.lock() = Some(error);
    }

    pub fn set_progress_steps(&self, steps: Vec<u8>) {
        *self.progress_steps.lock() = steps;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TranscriptionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        request: &TranscriptionRequest,
        progress: ProgressReporter,
    ) -> Result<TranscriptionOutput, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if !audio.exists() {
            return Err(TranscribeError::AudioMissing(audio.to_path_buf()));
        }

        let steps = self.progress_steps.lock().clone();
        let delay = *self.delay.lock();
        for percent in steps {
            progress.report(percent);
            tokio::task::yield_now().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.lock().take() {
            return Err(error);
        }
        Ok(self.output.clone())
    }

    fn engine_name(&self) -> &'static str {
        "mock"
    }
}

/// Renderer that formats like [`FileRenderer`] but can be told to fail.
#[derive(Debug)]
pub struct MockRenderer {
    inner: FileRenderer,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockRenderer {
    pub fn new(kind: ArtifactKind) -> Self {
        Self {
            inner: FileRenderer::new(kind),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Renderer whose every call fails with `message`
    pub fn failing(kind: ArtifactKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(kind)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    fn kind(&self) -> ArtifactKind {
        self.inner.kind()
    }

    async fn render(
        &self,
        transcript: &Transcript,
        options: &DisplayOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(RenderError::Io(std::io::Error::other(message.clone()))),
            None => self.inner.render(transcript, options, output_dir).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_writes_audio() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::with_duration("Mock Video", 60.0);
        let request = FetchRequest {
            source: "https://example.com/v".to_string(),
            cookies_path: None,
        };

        let metadata = fetcher.metadata(&request).await.unwrap();
        assert_eq!(metadata.source_url, "https://example.com/v");

        let audio = fetcher.download(&request, dir.path()).await.unwrap();
        assert!(audio.path.exists());
        assert_eq!(fetcher.download_calls(), 1);
        assert_eq!(fetcher.workdirs(), vec![dir.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn test_mock_fetcher_error_is_one_shot() {
        let fetcher = MockFetcher::with_duration("Mock Video", 60.0);
        fetcher.fail_metadata(FetchError::NotFound("gone".to_string()));
        let request = FetchRequest {
            source: "https://example.com/v".to_string(),
            cookies_path: None,
        };

        tokio_test::assert_err!(fetcher.metadata(&request).await);
        tokio_test::assert_ok!(fetcher.metadata(&request).await);
        assert_eq!(fetcher.metadata_calls(), 2);
    }
}
