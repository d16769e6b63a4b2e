//! Orchestrator lifecycle integration tests.
//!
//! These tests drive jobs through the orchestrator with in-process
//! collaborators: pending -> processing -> completed | failed

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vidscribe::{
    fetch::AudioHandle,
    jobs::JobStore,
    orchestrator::PipelineSettings,
    testing::{MockFetcher, MockRenderer, MockTranscriber},
    ArtifactKind, FetchError, FetchRequest, Fetcher, JobId, JobRecord, JobRequest, JobStatus,
    JobStep, ModelSize, Orchestrator, ProgressReporter, Renderer, TranscribeError, Transcriber,
    TranscriptionOutput, TranscriptionRequest, VideoMetadata,
};

const SOURCE: &str = "https://www.youtube.com/watch?v=mock";

mockall::mock! {
    pub Fetch {}

    #[async_trait::async_trait]
    impl Fetcher for Fetch {
        async fn metadata(&self, request: &FetchRequest) -> Result<VideoMetadata, FetchError>;
        async fn download(&self, request: &FetchRequest, workdir: &Path) -> Result<AudioHandle, FetchError>;
        fn backend_name(&self) -> &'static str;
    }
}

/// Engine that crashes instead of returning.
struct PanickingTranscriber;

#[async_trait::async_trait]
impl Transcriber for PanickingTranscriber {
    async fn transcribe(
        &self,
        _audio: &Path,
        _request: &TranscriptionRequest,
        _progress: ProgressReporter,
    ) -> Result<TranscriptionOutput, TranscribeError> {
        panic!("engine crashed");
    }

    fn engine_name(&self) -> &'static str {
        "panicking"
    }
}

/// Test helper owning the collaborators and scratch directories.
struct TestHarness {
    fetcher: Arc<MockFetcher>,
    transcriber: Arc<MockTranscriber>,
    store: Arc<JobStore>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            fetcher: Arc::new(MockFetcher::with_duration("Mock Video", 60.0)),
            transcriber: Arc::new(MockTranscriber::two_segments()),
            store: Arc::new(JobStore::default()),
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn output_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("output")
    }

    fn settings(&self) -> PipelineSettings {
        PipelineSettings::new(self.output_dir(), self.temp_dir.path().join("scratch"))
    }

    fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(
            self.settings(),
            vec![
                Arc::new(MockRenderer::new(ArtifactKind::Document)),
                Arc::new(MockRenderer::new(ArtifactKind::Plaintext)),
                Arc::new(MockRenderer::new(ArtifactKind::Docx)),
            ],
        )
    }

    fn orchestrator_with(
        &self,
        settings: PipelineSettings,
        renderers: Vec<Arc<dyn Renderer>>,
    ) -> Orchestrator {
        Orchestrator::new(
            settings,
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher) as Arc<dyn Fetcher>,
            Arc::clone(&self.transcriber) as Arc<dyn Transcriber>,
            renderers,
        )
    }
}

/// Poll until the job is terminal, failing the test after a few seconds.
async fn wait_for_terminal(orchestrator: &Orchestrator, job_id: &JobId) -> JobRecord {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = orchestrator.get_job_status(job_id).expect("job should exist");
            if record.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

#[tokio::test]
async fn test_happy_path_produces_requested_artifacts() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress_percent, 100);
    assert_eq!(record.current_step, JobStep::Done);
    assert!(record.error.is_none());
    assert_eq!(record.artifacts.len(), 3);
    assert!(record.failed_artifacts.is_empty());

    let text_path = &record.artifacts[&ArtifactKind::Plaintext];
    assert_eq!(
        text_path,
        &harness.output_dir().join("Mock Video_transcript.txt")
    );
    let text = std::fs::read_to_string(text_path).unwrap();
    assert!(text.contains("[0.0s]"));
    assert!(text.contains("[5.0s]"));
    assert!(text.contains("Hello world."));
    assert!(text.contains("[5.0s] SPEAKER_00: This is a test."));

    let markdown = std::fs::read_to_string(&record.artifacts[&ArtifactKind::Document]).unwrap();
    assert!(markdown.contains("**[0.0s] SPEAKER_00:** Hello world."));
    assert!(markdown.contains("**[5.0s] SPEAKER_00:** This is a test."));

    let docx_path = &record.artifacts[&ArtifactKind::Docx];
    assert_eq!(
        docx_path,
        &harness.output_dir().join("Mock Video_transcript.docx")
    );
    let document = docx_rs::read_docx(&std::fs::read(docx_path).unwrap())
        .unwrap()
        .json();
    assert!(document.contains("Hello world."));
    assert!(document.contains("This is a test."));

    assert_eq!(harness.fetcher.metadata_calls(), 1);
    assert_eq!(harness.fetcher.download_calls(), 1);
    assert_eq!(harness.transcriber.calls(), 1);

    // A finished job is no longer cancellable
    assert!(!orchestrator.cancel_job(&job_id));
}

#[tokio::test]
async fn test_finished_job_cannot_be_cancelled_after_failure() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .fail_metadata(FetchError::NotFound("video removed".to_string()));
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(!orchestrator.cancel_job(&job_id));
    assert_eq!(
        orchestrator.get_job_status(&job_id).unwrap().error,
        record.error
    );
}

#[tokio::test]
async fn test_panicking_transcriber_fails_job() {
    let harness = TestHarness::new();
    let orchestrator = Orchestrator::new(
        harness.settings(),
        Arc::clone(&harness.store),
        Arc::clone(&harness.fetcher) as Arc<dyn Fetcher>,
        Arc::new(PanickingTranscriber),
        vec![Arc::new(MockRenderer::new(ArtifactKind::Plaintext))],
    );

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.current_step, JobStep::Transcribing);
    let error = record.error.unwrap();
    assert!(error.starts_with("internal error"), "unexpected error: {}", error);
    assert!(error.contains("engine crashed"));
    assert!(record.artifacts.is_empty());
    assert!(!orchestrator.cancel_job(&job_id));

    // The scratch directory is still cleaned up while unwinding
    for dir in harness.fetcher.workdirs() {
        assert!(!dir.exists(), "{} was left behind", dir.display());
    }

    // Other jobs on the same runtime are unaffected
    let healthy = harness.orchestrator();
    let ok = healthy.start_job(JobRequest::new(SOURCE));
    assert_eq!(
        wait_for_terminal(&healthy, &ok).await.status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_job_is_pending_right_after_start() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = orchestrator.get_job_status(&job_id).unwrap();

    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.current_step, JobStep::Initialized);
    assert_eq!(record.progress_percent, 0);
    assert!(record.artifacts.is_empty());

    wait_for_terminal(&orchestrator, &job_id).await;
}

#[tokio::test]
async fn test_unknown_job_has_no_status() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    assert!(orchestrator.get_job_status(&JobId::new()).is_none());
    assert!(!orchestrator.cancel_job(&JobId::new()));
}

#[tokio::test]
async fn test_duration_limit_rejects_before_download() {
    let harness = TestHarness::new();

    let mut fetcher = MockFetch::new();
    fetcher
        .expect_metadata()
        .times(1)
        .returning(|request| Ok(VideoMetadata::new("Long Video", request.source.clone(), 18_000.0)));
    fetcher.expect_download().times(0);

    let orchestrator = Orchestrator::new(
        harness.settings().with_max_duration(14_400),
        Arc::clone(&harness.store),
        Arc::new(fetcher),
        Arc::clone(&harness.transcriber) as Arc<dyn Transcriber>,
        vec![Arc::new(MockRenderer::new(ArtifactKind::Plaintext))],
    );

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    let error = record.error.unwrap();
    assert!(error.contains("duration"), "unexpected error: {}", error);
    assert!(error.contains("18000"));
    assert!(record.artifacts.is_empty());
    assert_eq!(harness.transcriber.calls(), 0);
}

#[tokio::test]
async fn test_duration_equal_to_limit_is_accepted() {
    let harness = TestHarness {
        fetcher: Arc::new(MockFetcher::with_duration("Exact", 600.0)),
        ..TestHarness::new()
    };
    let orchestrator = harness.orchestrator_with(
        harness.settings().with_max_duration(600),
        vec![Arc::new(MockRenderer::new(ArtifactKind::Plaintext))],
    );

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_partial_formatting_keeps_successful_artifacts() {
    let harness = TestHarness::new();
    let failing = Arc::new(MockRenderer::failing(ArtifactKind::Document, "disk full"));
    let orchestrator = harness.orchestrator_with(
        harness.settings(),
        vec![
            failing.clone() as Arc<dyn Renderer>,
            Arc::new(MockRenderer::new(ArtifactKind::Plaintext)),
        ],
    );

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.artifacts.len(), 1);
    assert!(record.artifacts.contains_key(&ArtifactKind::Plaintext));
    assert!(record.failed_artifacts[&ArtifactKind::Document].contains("disk full"));
    assert_eq!(failing.calls(), 1);
}

#[tokio::test]
async fn test_all_renderers_failing_fails_job() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator_with(
        harness.settings(),
        vec![
            Arc::new(MockRenderer::failing(ArtifactKind::Document, "disk full")),
            Arc::new(MockRenderer::failing(ArtifactKind::Plaintext, "read-only")),
        ],
    );

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    let error = record.error.unwrap();
    assert!(error.contains("disk full"));
    assert!(error.contains("read-only"));
    assert!(record.artifacts.is_empty());
}

#[tokio::test]
async fn test_invalid_source_fails_without_fetching() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new("not-a-url"));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.unwrap().contains("Invalid"));
    assert_eq!(harness.fetcher.metadata_calls(), 0);
}

#[tokio::test]
async fn test_fetch_error_is_reported() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .fail_download(FetchError::AuthRequired("sign in to confirm your age".to_string()));
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.current_step, JobStep::FetchingAudio);
    assert!(record.error.unwrap().starts_with("Authentication required"));
    assert_eq!(harness.transcriber.calls(), 0);
}

#[tokio::test]
async fn test_transcription_error_is_reported() {
    let harness = TestHarness::new();
    harness
        .transcriber
        .fail_with(TranscribeError::Decode("unsupported codec".to_string()));
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.current_step, JobStep::Transcribing);
    assert!(record.error.unwrap().contains("unsupported codec"));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_tracks_engine() {
    let harness = TestHarness::new();
    harness.transcriber.set_progress_steps(vec![20, 50]);
    harness.transcriber.set_delay(Duration::from_millis(100));
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));

    let mut observed = Vec::new();
    loop {
        let record = orchestrator.get_job_status(&job_id).unwrap();
        observed.push((record.current_step, record.progress_percent));
        if record.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    for pair in observed.windows(2) {
        assert!(pair[0].1 <= pair[1].1, "progress went backwards: {:?}", observed);
    }
    assert!(observed.contains(&(JobStep::Transcribing, 55)));
    assert_eq!(observed.last().unwrap().1, 100);
}

#[tokio::test]
async fn test_request_options_reach_transcriber() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let request = JobRequest::new(SOURCE)
        .with_language("es")
        .with_model_size(ModelSize::Small)
        .with_timestamps(false)
        .with_speakers(false);
    let job_id = orchestrator.start_job(request);
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    let requests = harness.transcriber.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].language.as_deref(), Some("es"));
    assert_eq!(requests[0].model_size, ModelSize::Small);

    let text = std::fs::read_to_string(&record.artifacts[&ArtifactKind::Plaintext]).unwrap();
    assert!(!text.contains("[0.0s]"));
    assert!(!text.contains("SPEAKER_00"));
    assert!(text.contains("\nHello world.\n"));
}

#[tokio::test]
async fn test_scratch_directory_is_removed() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let ok = orchestrator.start_job(JobRequest::new(SOURCE));
    wait_for_terminal(&orchestrator, &ok).await;

    harness
        .transcriber
        .fail_with(TranscribeError::ModelLoad("missing".to_string()));
    let failed = orchestrator.start_job(JobRequest::new(SOURCE));
    wait_for_terminal(&orchestrator, &failed).await;

    let workdirs = harness.fetcher.workdirs();
    assert_eq!(workdirs.len(), 2);
    for dir in workdirs {
        assert!(!dir.exists(), "{} was left behind", dir.display());
    }
}

#[tokio::test]
async fn test_cancel_running_job() {
    let harness = TestHarness::new();
    harness.fetcher.set_delay(Duration::from_secs(30));
    let orchestrator = harness.orchestrator();

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        orchestrator.get_job_status(&job_id).unwrap().status,
        JobStatus::Processing
    );

    assert!(orchestrator.cancel_job(&job_id));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("job cancelled"));
    assert_eq!(harness.fetcher.download_calls(), 0);
    assert!(!orchestrator.cancel_job(&job_id));
}

#[tokio::test]
async fn test_stage_timeout_fails_job() {
    let harness = TestHarness::new();
    harness.fetcher.set_delay(Duration::from_secs(30));
    let orchestrator = harness.orchestrator_with(
        harness.settings().with_stage_timeout(Duration::from_millis(20)),
        vec![Arc::new(MockRenderer::new(ArtifactKind::Plaintext))],
    );

    let job_id = orchestrator.start_job(JobRequest::new(SOURCE));
    let record = wait_for_terminal(&orchestrator, &job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_concurrent_jobs_are_independent() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let ids: Vec<JobId> = (0..4)
        .map(|_| orchestrator.start_job(JobRequest::new(SOURCE)))
        .collect();
    let bad = orchestrator.start_job(JobRequest::new("ftp://example.com/v"));

    for id in &ids {
        let record = wait_for_terminal(&orchestrator, id).await;
        assert_eq!(record.status, JobStatus::Completed);
    }
    assert_eq!(
        wait_for_terminal(&orchestrator, &bad).await.status,
        JobStatus::Failed
    );

    let listed = orchestrator.list_jobs();
    assert_eq!(listed.len(), 5);
    assert_eq!(harness.transcriber.calls(), 4);
}
