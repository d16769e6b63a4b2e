use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::pool::{ModelLoader, ModelPool};
use super::{
    ComputeType, ModelSize, ProgressReporter, Segment, TranscribeError, Transcriber,
    TranscriptionOutput, TranscriptionRequest, Word,
};
use crate::utils::normalize_language_code;

/// Number of stderr lines kept for error reports
const STDERR_TAIL: usize = 20;

/// Settings for the whisper.cpp command line engine
#[derive(Debug, Clone)]
pub struct WhisperSettings {
    pub binary: String,
    pub models_dir: PathBuf,
    pub compute_type: ComputeType,
    pub beam_size: u32,
    pub threads: Option<u32>,
}

/// A ggml model file that was found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgmlModel {
    pub size: ModelSize,
    pub path: PathBuf,
}

/// Resolves `ggml-<size>.bin` files in a models directory
#[derive(Debug, Clone)]
pub struct GgmlModelLoader {
    models_dir: PathBuf,
    compute_type: ComputeType,
}

impl GgmlModelLoader {
    pub fn new(models_dir: PathBuf, compute_type: ComputeType) -> Self {
        Self {
            models_dir,
            compute_type,
        }
    }

    /// Candidate files, preferred first. Int8 falls back to the full weights.
    pub fn candidate_files(&self, size: ModelSize) -> Vec<PathBuf> {
        let full = format!("ggml-{}.bin", size.as_str());
        match self.compute_type {
            ComputeType::Int8 => vec![
                self.models_dir.join(format!("ggml-{}-q8_0.bin", size.as_str())),
                self.models_dir.join(full),
            ],
            ComputeType::Float16 => vec![self.models_dir.join(full)],
        }
    }
}

#[async_trait]
impl ModelLoader for GgmlModelLoader {
    type Model = GgmlModel;

    async fn load(&self, size: ModelSize) -> Result<GgmlModel, TranscribeError> {
        let candidates = self.candidate_files(size);
        for path in &candidates {
            if tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false) {
                tracing::debug!(model = %size, path = %path.display(), "Resolved model file");
                return Ok(GgmlModel { size, path: path.clone() });
            }
        }

        let tried = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(TranscribeError::ModelLoad(format!(
            "model '{}' not found (looked for {})",
            size, tried
        )))
    }
}

/// Speech-to-text through the `whisper-cli` binary of whisper.cpp
pub struct WhisperCliTranscriber {
    settings: WhisperSettings,
    pool: ModelPool<GgmlModelLoader>,
}

impl WhisperCliTranscriber {
    pub fn new(settings: WhisperSettings, resident_models: usize) -> Self {
        let loader = GgmlModelLoader::new(settings.models_dir.clone(), settings.compute_type);
        Self {
            settings,
            pool: ModelPool::new(loader, resident_models),
        }
    }

    fn build_command(
        &self,
        model: &GgmlModel,
        audio: &Path,
        output_base: &Path,
        request: &TranscriptionRequest,
    ) -> Command {
        let language = request
            .language
            .as_deref()
            .map(normalize_language_code)
            .unwrap_or_else(|| "auto".to_string());

        let mut cmd = Command::new(&self.settings.binary);
        cmd.arg("--model")
            .arg(&model.path)
            .arg("--file")
            .arg(audio)
            .args(["--language", &language])
            .args(["--beam-size", &self.settings.beam_size.to_string()])
            .arg("--output-file")
            .arg(output_base)
            .arg(if request.word_timestamps {
                "--output-json-full"
            } else {
                "--output-json"
            })
            .arg("--print-progress")
            .arg("--no-prints");

        if let Some(threads) = self.settings.threads {
            cmd.args(["--threads", &threads.to_string()]);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        request: &TranscriptionRequest,
        progress: ProgressReporter,
    ) -> Result<TranscriptionOutput, TranscribeError> {
        if !audio.is_file() {
            return Err(TranscribeError::AudioMissing(audio.to_path_buf()));
        }

        let model = self.pool.acquire(request.model_size).await?;

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let output_base = audio.with_file_name(format!("{}.whisper", stem));
        let json_path = output_base.with_extension("whisper.json");

        tracing::info!(
            model = %model.size,
            audio = %audio.display(),
            "Starting whisper transcription"
        );

        let mut child = self
            .build_command(&model, audio, &output_base, request)
            .spawn()
            .map_err(|e| {
                TranscribeError::Decode(format!("failed to run {}: {}", self.settings.binary, e))
            })?;

        let mut tail = VecDeque::with_capacity(STDERR_TAIL);
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(percent) = parse_progress_line(&line) {
                    progress.report(percent);
                    continue;
                }
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child.wait().await?;
        drop(model);

        if !status.success() {
            let error = Vec::from(tail).join("\n");
            return Err(TranscribeError::Decode(format!(
                "whisper exited with {}: {}",
                status,
                error.trim()
            )));
        }

        let content = fs_err::tokio::read_to_string(&json_path).await?;
        let output = parse_whisper_json(&content, request.word_timestamps)?;

        if let Err(e) = fs_err::tokio::remove_file(&json_path).await {
            tracing::warn!("Failed to remove whisper output {}: {}", json_path.display(), e);
        }

        tracing::info!(
            segments = output.segments.len(),
            language = output.language.as_deref().unwrap_or("unknown"),
            "Transcription complete"
        );
        Ok(output)
    }

    fn engine_name(&self) -> &'static str {
        "whisper.cpp"
    }
}

/// Extract the percentage from a `progress = 45%` line
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let rest = line.split("progress =").nth(1)?;
    let number = rest.trim().trim_end_matches('%').trim();
    number.parse::<u8>().ok().map(|p| p.min(100))
}

/// whisper.cpp JSON output format
#[derive(Debug, Deserialize)]
struct WhisperJson {
    #[serde(default)]
    result: Option<WhisperResult>,
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperResult {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    offsets: Offsets,
    text: String,
    #[serde(default)]
    tokens: Vec<WhisperToken>,
}

#[derive(Debug, Deserialize)]
struct WhisperToken {
    text: String,
    offsets: Offsets,
    #[serde(default)]
    p: f64,
}

/// Milliseconds from the start of the audio
#[derive(Debug, Deserialize)]
struct Offsets {
    from: i64,
    to: i64,
}

fn millis_to_secs(ms: i64) -> f64 {
    ms.max(0) as f64 / 1000.0
}

/// Convert whisper.cpp JSON into segments, grouping tokens into words
pub fn parse_whisper_json(
    content: &str,
    word_timestamps: bool,
) -> Result<TranscriptionOutput, TranscribeError> {
    let parsed: WhisperJson = serde_json::from_str(content)
        .map_err(|e| TranscribeError::Decode(format!("invalid whisper output: {}", e)))?;

    let mut segments = Vec::new();
    for raw in parsed.transcription {
        let text = raw.text.trim();
        if text.is_empty() {
            continue;
        }

        let tokens: Vec<&WhisperToken> = raw
            .tokens
            .iter()
            .filter(|t| !is_special_token(&t.text))
            .collect();

        let confidence = average(tokens.iter().map(|t| t.p));
        let words = if word_timestamps {
            group_words(&tokens)
        } else {
            Vec::new()
        };

        let id = segments.len() as u32 + 1;
        segments.push(
            Segment::new(
                id,
                millis_to_secs(raw.offsets.from),
                millis_to_secs(raw.offsets.to),
                text,
            )
            .with_confidence(confidence)
            .with_words(words),
        );
    }

    Ok(TranscriptionOutput {
        segments,
        language: parsed.result.and_then(|r| r.language),
    })
}

fn is_special_token(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.starts_with("[_") || text.starts_with("<|")
}

/// A token that begins with whitespace starts a new word; others continue it
fn group_words(tokens: &[&WhisperToken]) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Option<(String, i64, i64, Vec<f64>)> = None;

    for token in tokens {
        if !token.text.starts_with(char::is_whitespace) {
            if let Some((text, _, end, probs)) = current.as_mut() {
                text.push_str(&token.text);
                *end = token.offsets.to;
                probs.push(token.p);
                continue;
            }
        }

        if let Some(done) = current.take() {
            words.push(finish_word(done));
        }
        current = Some((
            token.text.clone(),
            token.offsets.from,
            token.offsets.to,
            vec![token.p],
        ));
    }

    if let Some(done) = current {
        words.push(finish_word(done));
    }
    words.retain(|w| !w.word.is_empty());
    words
}

fn finish_word((text, from, to, probs): (String, i64, i64, Vec<f64>)) -> Word {
    Word {
        word: text.trim().to_string(),
        start: millis_to_secs(from),
        end: millis_to_secs(to.max(from)),
        confidence: average(probs.into_iter()),
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
