//! Heading-delimited section chunks from markdown documents.

use dossier_core::{Chunk, ChunkKind};

/// Title given to text that appears before the first heading.
pub const INTRODUCTION_TITLE: &str = "Introduction";

/// Split a markdown document into one chunk per heading section.
///
/// A heading is any line starting with one or more `#` characters, outside
/// fenced code blocks. The heading text (markers and surrounding
/// whitespace removed) becomes the chunk's `section_title`; text before the
/// first heading is titled [`INTRODUCTION_TITLE`]. Sections whose trimmed
/// body is empty are dropped. Every chunk's `source` is `file_name`.
///
/// # Examples
///
/// ```
/// use dossier_ingest::markdown::extract_sections;
///
/// let chunks = extract_sections("README.md", "ocr", "# Title\nHello world.");
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "Hello world.");
/// assert_eq!(chunks[0].section_title.as_deref(), Some("Title"));
/// ```
pub fn extract_sections(file_name: &str, project: &str, text: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut title: Option<String> = Some(INTRODUCTION_TITLE.to_string());
    let mut body: Vec<&str> = Vec::new();
    let mut fence: Option<&'static str> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();

        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            body.push(line);
            continue;
        }

        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            body.push(line);
            continue;
        }

        if line.starts_with('#') {
            push_section(&mut chunks, file_name, project, title.take(), &body);
            body.clear();
            let heading = line.trim_start_matches('#').trim();
            title = (!heading.is_empty()).then(|| heading.to_string());
            continue;
        }

        body.push(line);
    }

    push_section(&mut chunks, file_name, project, title, &body);
    chunks
}

fn fence_marker(line: &str) -> Option<&'static str> {
    if line.starts_with("```") {
        Some("```")
    } else if line.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn push_section(
    chunks: &mut Vec<Chunk>,
    file_name: &str,
    project: &str,
    title: Option<String>,
    body: &[&str],
) {
    let Some(chunk) = Chunk::new(project, file_name, ChunkKind::Section, &body.join("\n")) else {
        return;
    };
    chunks.push(match title {
        Some(title) => chunk.with_section_title(title),
        None => chunk,
    });
}
