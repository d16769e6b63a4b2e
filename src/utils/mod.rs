use anyhow::Result;
use url::Url;

/// Maximum number of title characters used in artifact file names
pub const MAX_TITLE_CHARS: usize = 50;

/// Validate a URL and return normalized version
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// File name stem for an artifact: `<title prefix>_transcript`, keeping only
/// alphanumerics, spaces and underscores
pub fn artifact_file_stem(title: &str) -> String {
    let prefix: String = title.chars().take(MAX_TITLE_CHARS).collect();
    let stem = format!("{}_transcript", prefix)
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim_end()
        .to_string();

    if stem.trim_start() == "_transcript" {
        "transcript".to_string()
    } else {
        stem
    }
}

/// Reduce a language name or tag to the two-letter code whisper expects
pub fn normalize_language_code(lang: &str) -> String {
    let lower = lang.trim().to_lowercase();
    let normalized = match lower.as_str() {
        "english" => "en",
        "spanish" => "es",
        "french" => "fr",
        "german" => "de",
        "italian" => "it",
        "portuguese" => "pt",
        "dutch" => "nl",
        "japanese" => "ja",
        "korean" => "ko",
        "chinese" => "zh",
        "arabic" => "ar",
        "hindi" => "hi",
        "russian" => "ru",
        // Region tags such as en-US or pt_BR
        other => other.split(['-', '_']).next().unwrap_or(other),
    };

    normalized.to_string()
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp: &str, whisper: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp, "--version").await {
        missing.push(format!("{} - required to fetch audio", yt_dlp));
    }

    if !check_command_available(whisper, "--help").await {
        missing.push(format!("{} - required for transcription (whisper.cpp)", whisper));
    }

    // yt-dlp needs ffmpeg to extract audio
    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required by yt-dlp for audio extraction".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_arg: &str) -> bool {
    use std::process::Stdio;
    use tokio::process::Command;

    Command::new(command)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
