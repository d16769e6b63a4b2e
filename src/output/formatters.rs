use std::fmt::Write;

use super::DisplayOptions;
use crate::transcribe::{Segment, Transcript};
use crate::utils::format_duration;

/// `[12.3s] SPEAKER_00: ` with each part present only when enabled
pub fn line_prefix(segment: &Segment, options: &DisplayOptions) -> String {
    let mut prefix = String::new();
    if options.include_timestamps {
        let _ = write!(prefix, "[{:.1}s] ", segment.start_time);
    }
    if options.include_speakers {
        let _ = write!(prefix, "{}: ", segment.speaker);
    }
    prefix
}

/// Plain text, one segment per line
pub fn format_as_text(transcript: &Transcript, options: &DisplayOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Title: {}", transcript.metadata.title);
    let _ = writeln!(out, "URL: {}", transcript.metadata.source_url);
    out.push('\n');

    for segment in &transcript.segments {
        let _ = writeln!(out, "{}{}", line_prefix(segment, options), segment.text);
    }
    out
}

/// Markdown document with a metadata header and bold line prefixes
pub fn format_as_markdown(transcript: &Transcript, options: &DisplayOptions) -> String {
    let meta = &transcript.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", meta.title);
    let _ = writeln!(out, "- Source: {}", meta.source_url);
    let _ = writeln!(out, "- Duration: {}", format_duration(meta.duration_seconds));
    let _ = writeln!(out, "- Date: {}", meta.upload_date.as_deref().unwrap_or("N/A"));
    if let Some(language) = &transcript.language {
        let _ = writeln!(out, "- Language: {}", language);
    }
    out.push_str("\n## Transcript\n\n");

    for segment in &transcript.segments {
        let prefix = line_prefix(segment, options);
        if prefix.is_empty() {
            let _ = writeln!(out, "{}\n", segment.text);
        } else {
            let _ = writeln!(out, "**{}** {}\n", prefix.trim_end(), segment.text);
        }
    }
    out
}

/// SRT subtitles. Timestamps are always present; speakers follow the options.
pub fn format_as_srt(transcript: &Transcript, options: &DisplayOptions) -> String {
    let mut out = String::new();
    for segment in &transcript.segments {
        let _ = writeln!(out, "{}", segment.segment_id);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_srt_timestamp(segment.start_time),
            format_srt_timestamp(segment.end_time)
        );
        if options.include_speakers {
            let _ = writeln!(out, "{}: {}\n", segment.speaker, segment.text);
        } else {
            let _ = writeln!(out, "{}\n", segment.text);
        }
    }
    out
}

/// Full transcript including word timings
pub fn format_as_json(transcript: &Transcript) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(transcript)
}

/// `HH:MM:SS,mmm`
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::VideoMetadata;
    use crate::jobs::JobId;
    use crate::transcribe::{TranscriptionOutput, Word};

    fn transcript() -> Transcript {
        let mut metadata = VideoMetadata::new("Mock Video", "http://mock.url", 60.0);
        metadata.upload_date = Some("20230101".to_string());
        Transcript::new(
            JobId::new(),
            metadata,
            TranscriptionOutput {
                segments: vec![
                    Segment::new(1, 0.0, 5.0, "Hello world.").with_words(vec![Word {
                        word: "Hello".to_string(),
                        start: 0.0,
                        end: 0.4,
                        confidence: 0.9,
                    }]),
                    Segment::new(2, 5.04, 10.0, "This is a test.").with_speaker("SPEAKER_01"),
                ],
                language: None,
            },
        )
    }

    #[test]
    fn test_line_prefix_variants() {
        let segment = Segment::new(1, 12.345, 13.0, "x");
        let both = DisplayOptions::default();
        let none = DisplayOptions {
            include_timestamps: false,
            include_speakers: false,
        };
        let time_only = DisplayOptions {
            include_timestamps: true,
            include_speakers: false,
        };

        assert_eq!(line_prefix(&segment, &both), "[12.3s] SPEAKER_00: ");
        assert_eq!(line_prefix(&segment, &none), "");
        assert_eq!(line_prefix(&segment, &time_only), "[12.3s] ");
    }

    #[test]
    fn test_format_as_text() {
        let text = format_as_text(&transcript(), &DisplayOptions::default());
        assert_eq!(
            text,
            "Title: Mock Video\nURL: http://mock.url\n\n\
             [0.0s] SPEAKER_00: Hello world.\n\
             [5.0s] SPEAKER_01: This is a test.\n"
        );
    }

    #[test]
    fn test_format_as_markdown() {
        let md = format_as_markdown(&transcript(), &DisplayOptions::default());
        assert!(md.starts_with("# Mock Video\n"));
        assert!(md.contains("- Duration: 1m 0s"));
        assert!(md.contains("- Date: 20230101"));
        assert!(md.contains("**[0.0s] SPEAKER_00:** Hello world."));

        let plain = format_as_markdown(
            &transcript(),
            &DisplayOptions {
                include_timestamps: false,
                include_speakers: false,
            },
        );
        assert!(plain.contains("\nHello world.\n"));
        assert!(!plain.contains("**"));
    }

    #[test]
    fn test_format_as_srt() {
        let srt = format_as_srt(&transcript(), &DisplayOptions::default());
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:05,000\nSPEAKER_00: Hello world.\n\n"));
        assert!(srt.contains("2\n00:00:05,040 --> 00:00:10,000\n"));
    }

    #[test]
    fn test_format_as_json_keeps_words() {
        let json = format_as_json(&transcript()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["segments"][0]["words"][0]["word"], "Hello");
        assert_eq!(value["metadata"]["title"], "Mock Video");
    }

    #[test]
    fn test_format_srt_timestamp() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(3661.5), "01:01:01,500");
        assert_eq!(format_srt_timestamp(-2.0), "00:00:00,000");
    }
}
