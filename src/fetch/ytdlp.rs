use async_trait::async_trait;
use serde_json::Value;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

use super::{AudioHandle, FetchError, FetchRequest, Fetcher, VideoMetadata};

/// Audio fetcher backed by the yt-dlp command line tool
pub struct YtDlpFetcher {
    yt_dlp_path: String,
    audio_format: String,
}

impl YtDlpFetcher {
    pub fn new(yt_dlp_path: impl Into<String>, audio_format: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            audio_format: audio_format.into(),
        }
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// `--cookies <file>` when a usable cookie file was given
    async fn cookie_args(cookies: Option<&Path>) -> Vec<OsString> {
        let Some(path) = cookies else {
            return Vec::new();
        };

        if !path.is_file() {
            tracing::warn!("Cookie file {} does not exist, ignoring it", path.display());
            return Vec::new();
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let header = content.lines().next().unwrap_or_default();
                if !looks_like_netscape_cookies(header) {
                    tracing::warn!(
                        "Cookie file {} does not look like a Netscape format file. Header: {}",
                        path.display(),
                        header.trim()
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Could not read cookie file to validate header: {}", e);
            }
        }

        tracing::info!("Using cookie file at: {}", path.display());
        vec![OsString::from("--cookies"), path.as_os_str().to_os_string()]
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(command = %self.yt_dlp_path, ?args, "Running yt-dlp");

        let output = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FetchError::ToolUnavailable(self.yt_dlp_path.clone()),
                _ => FetchError::Io(e),
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&error));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn metadata(&self, request: &FetchRequest) -> Result<VideoMetadata, FetchError> {
        tracing::debug!("Extracting video info for: {}", request.source);

        let mut args = Self::cookie_args(request.cookies_path.as_deref()).await;
        args.extend(["--dump-json", "--no-playlist", "--skip-download"].map(OsString::from));
        args.push(OsString::from(&request.source));

        let stdout = self.run(args).await?;
        let info: Value = serde_json::from_slice(&stdout)
            .map_err(|e| FetchError::InvalidResponse(format!("metadata is not JSON: {}", e)))?;

        Ok(metadata_from_json(&info, &request.source))
    }

    async fn download(&self, request: &FetchRequest, workdir: &Path) -> Result<AudioHandle, FetchError> {
        let stem = Uuid::new_v4().simple().to_string();
        let template = workdir.join(format!("{}.%(ext)s", stem));

        tracing::info!("Downloading audio to: {}", workdir.display());

        let mut args = Self::cookie_args(request.cookies_path.as_deref()).await;
        args.extend(
            [
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                self.audio_format.as_str(),
                "--no-playlist",
                "--newline",
                "--output",
            ]
            .map(OsString::from),
        );
        args.push(template.into_os_string());
        args.push(OsString::from(&request.source));

        self.run(args).await?;

        let mut entries = fs_err::tokio::read_dir(workdir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let same_stem = path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str());
            let partial = path.extension().and_then(|e| e.to_str()) == Some("part");
            if same_stem && !partial {
                return Ok(AudioHandle::new(path));
            }
        }

        Err(FetchError::InvalidResponse(format!(
            "downloaded file {}.* not found in {}",
            stem,
            workdir.display()
        )))
    }

    fn backend_name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Map yt-dlp's `--dump-json` output to metadata
pub fn metadata_from_json(info: &Value, source: &str) -> VideoMetadata {
    VideoMetadata {
        title: info["title"].as_str().unwrap_or("Unknown").to_string(),
        source_url: source.to_string(),
        duration_seconds: info["duration"].as_f64().unwrap_or(0.0),
        upload_date: info["upload_date"].as_str().map(|s| s.to_string()),
        thumbnail_url: info["thumbnail"].as_str().map(|s| s.to_string()),
    }
}

/// Turn yt-dlp's stderr into a fetch error class
pub fn classify_failure(stderr: &str) -> FetchError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();
    let lower = stderr.to_lowercase();

    let auth_markers = [
        "sign in to confirm",
        "login required",
        "use --cookies",
        "private video",
        "http error 401",
        "http error 403",
    ];
    let missing_markers = [
        "http error 404",
        "video unavailable",
        "unsupported url",
        "does not exist",
        "not found",
    ];

    if auth_markers.iter().any(|m| lower.contains(m)) {
        FetchError::AuthRequired(message)
    } else if missing_markers.iter().any(|m| lower.contains(m)) {
        FetchError::NotFound(message)
    } else {
        FetchError::Network(message)
    }
}

/// Netscape cookie files start with one of two well-known comments
pub fn looks_like_netscape_cookies(header: &str) -> bool {
    header.starts_with("# Netscape") || header.starts_with("# HTTP Cookie")
}
