//! Word document output.
//!
//! Layout: title heading, source/duration/date lines, a "Transcript"
//! heading, then one paragraph per segment with the line prefix in bold.

use docx_rs::{Docx, Paragraph, Run, Style, StyleType};
use std::io::Cursor;

use super::{line_prefix, DisplayOptions, RenderError};
use crate::transcribe::Transcript;
use crate::utils::format_duration;

const TITLE_STYLE: &str = "TranscriptTitle";
const HEADING_STYLE: &str = "TranscriptHeading";

fn text_paragraph(text: impl Into<String>) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

fn heading(text: impl Into<String>, style: &str) -> Paragraph {
    text_paragraph(text).style(style)
}

/// Build a .docx file in memory
pub fn format_as_docx(transcript: &Transcript, options: &DisplayOptions) -> Result<Vec<u8>, RenderError> {
    let meta = &transcript.metadata;

    let mut doc = Docx::new()
        .add_style(
            Style::new(TITLE_STYLE, StyleType::Paragraph)
                .name("Title")
                .size(48)
                .bold(),
        )
        .add_style(
            Style::new(HEADING_STYLE, StyleType::Paragraph)
                .name("Heading 1")
                .size(32)
                .bold(),
        )
        .add_paragraph(heading(meta.title.as_str(), TITLE_STYLE))
        .add_paragraph(text_paragraph(format!("Source: {}", meta.source_url)))
        .add_paragraph(text_paragraph(format!(
            "Duration: {}",
            format_duration(meta.duration_seconds)
        )))
        .add_paragraph(text_paragraph(format!(
            "Date: {}",
            meta.upload_date.as_deref().unwrap_or("N/A")
        )))
        .add_paragraph(heading("Transcript", HEADING_STYLE));

    for segment in &transcript.segments {
        let mut paragraph = Paragraph::new();
        let prefix = line_prefix(segment, options);
        if !prefix.is_empty() {
            paragraph = paragraph.add_run(Run::new().add_text(prefix).bold());
        }
        doc = doc.add_paragraph(paragraph.add_run(Run::new().add_text(segment.text.as_str())));
    }

    let mut buffer = Cursor::new(Vec::new());
    doc.build()
        .pack(&mut buffer)
        .map_err(|e| RenderError::Docx(e.to_string()))?;
    Ok(buffer.into_inner())
}
