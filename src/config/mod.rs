use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jobs::JobRetention;
use crate::output::ArtifactKind;
use crate::transcribe::whisper::WhisperSettings;
use crate::transcribe::{ComputeType, ModelSize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resource limits for a single job
    pub limits: LimitsConfig,

    /// Speech-to-text engine settings
    pub transcription: TranscriptionConfig,

    /// Audio fetching settings
    pub fetch: FetchConfig,

    /// Artifact settings
    pub output: OutputConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest source accepted, in seconds
    pub max_duration_seconds: u64,

    /// Per-stage timeout; stages may run forever when unset
    pub stage_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Model used when a job does not pick one
    pub default_model_size: ModelSize,

    /// Decoding precision / speed trade-off
    pub compute_type: ComputeType,

    /// Request word-level timestamps
    pub word_timestamps: bool,

    pub beam_size: u32,

    pub threads: Option<u32>,

    /// whisper.cpp command line binary
    pub whisper_binary: String,

    /// Directory holding ggml model files
    pub models_dir: Option<PathBuf>,

    /// Number of models kept loaded at once
    pub resident_models: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub yt_dlp_path: String,

    /// Audio format yt-dlp extracts to
    pub audio_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where artifacts are written
    pub output_dir: Option<PathBuf>,

    /// Artifact kinds produced for every job
    pub artifacts: Vec<ArtifactKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Temporary directory for downloads
    pub temp_dir: Option<PathBuf>,

    /// Language codes offered to users; not enforced by the pipeline
    pub supported_languages: Vec<String>,

    /// Retention of finished jobs
    pub job_history: JobHistoryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobHistoryConfig {
    pub max_finished_jobs: Option<usize>,

    pub finished_ttl_seconds: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_duration_seconds: 4 * 3600,
            stage_timeout_seconds: None,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            default_model_size: ModelSize::Medium,
            compute_type: ComputeType::Int8,
            word_timestamps: true,
            beam_size: 5,
            threads: None,
            whisper_binary: "whisper-cli".to_string(),
            models_dir: None,
            resident_models: 1,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            audio_format: "mp3".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            artifacts: vec![ArtifactKind::Docx, ArtifactKind::Plaintext],
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            supported_languages: ["en", "es", "fr", "de", "it", "pt", "nl", "ja", "zh", "ru"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            job_history: JobHistoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit_path)?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            tracing::info!("Created default configuration at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path(explicit_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit_path {
            return Ok(path.to_path_buf());
        }

        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("vidscribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_duration_seconds == 0 {
            anyhow::bail!("limits.max_duration_seconds must be greater than zero");
        }

        if self.limits.stage_timeout_seconds == Some(0) {
            anyhow::bail!("limits.stage_timeout_seconds must be greater than zero when set");
        }

        if self.transcription.resident_models == 0 {
            anyhow::bail!("transcription.resident_models must be at least 1");
        }

        if self.transcription.beam_size == 0 {
            anyhow::bail!("transcription.beam_size must be at least 1");
        }

        if self.output.artifacts.is_empty() {
            anyhow::bail!("output.artifacts must list at least one artifact kind");
        }

        let mut seen = HashSet::new();
        for kind in &self.output.artifacts {
            if !seen.insert(kind) {
                anyhow::bail!("output.artifacts lists '{}' more than once", kind);
            }
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Max Duration: {}s", self.limits.max_duration_seconds);
        match self.limits.stage_timeout_seconds {
            Some(secs) => println!("  Stage Timeout: {}s", secs),
            None => println!("  Stage Timeout: none"),
        }
        println!("  Default Model: {}", self.transcription.default_model_size);
        println!("  Compute Type: {}", self.transcription.compute_type.as_str());
        println!("  Whisper Binary: {}", self.transcription.whisper_binary);
        println!("  Models Dir: {}", self.models_dir().display());
        println!("  yt-dlp: {}", self.fetch.yt_dlp_path);
        println!("  Output Dir: {}", self.output_dir().display());
        let kinds: Vec<&str> = self.output.artifacts.iter().map(|k| k.as_str()).collect();
        println!("  Artifacts: {}", kinds.join(", "));
        println!("  Languages: {}", self.app.supported_languages.join(", "));
    }

    pub fn models_dir(&self) -> PathBuf {
        self.transcription.models_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("vidscribe").join("models"))
                .unwrap_or_else(|| PathBuf::from("models"))
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("output"))
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.app.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.limits.stage_timeout_seconds.map(Duration::from_secs)
    }

    pub fn job_retention(&self) -> JobRetention {
        JobRetention {
            max_finished_jobs: self.app.job_history.max_finished_jobs,
            finished_ttl: self
                .app
                .job_history
                .finished_ttl_seconds
                .map(Duration::from_secs),
        }
    }

    pub fn whisper_settings(&self) -> WhisperSettings {
        WhisperSettings {
            binary: self.transcription.whisper_binary.clone(),
            models_dir: self.models_dir(),
            compute_type: self.transcription.compute_type,
            beam_size: self.transcription.beam_size,
            threads: self.transcription.threads,
        }
    }

    pub fn is_supported_language(&self, language: &str) -> bool {
        let code = crate::utils::normalize_language_code(language);
        self.app.supported_languages.iter().any(|l| *l == code)
    }
}
