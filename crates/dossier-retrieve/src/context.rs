//! Rendering retrieved chunks into a single citation-numbered text block.

use dossier_core::RetrievedChunk;

/// Returned by [`build_context`] when nothing was retrieved.
pub const NO_CONTEXT: &str = "No relevant project documentation was found.";

/// Render `chunks` in order as numbered context blocks.
///
/// Each block is a `[Context i]` line, a `Project | Source | Section`
/// header built from the fields that are present, then the chunk text.
/// Blocks are separated by a blank line.
///
/// # Examples
///
/// ```
/// use dossier_core::{Chunk, ChunkKind, RetrievedChunk};
/// use dossier_retrieve::context::{build_context, NO_CONTEXT};
///
/// assert_eq!(build_context(&[]), NO_CONTEXT);
///
/// let chunk = Chunk::new("ocr", "README.md", ChunkKind::Section, "Uses YOLO.")
///     .unwrap()
///     .with_section_title("Model");
/// let text = build_context(&[RetrievedChunk::new("ocr", chunk)]);
/// assert_eq!(
///     text,
///     "[Context 1]\nProject: ocr | Source: README.md | Section: Model\nUses YOLO."
/// );
/// ```
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(i, retrieved)| render_block(i + 1, retrieved))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_block(number: usize, retrieved: &RetrievedChunk) -> String {
    let chunk = &retrieved.chunk;
    let mut header = Vec::new();
    if !retrieved.project.is_empty() {
        header.push(format!("Project: {}", retrieved.project));
    }
    if !chunk.source.is_empty() {
        header.push(format!("Source: {}", chunk.source));
    }
    if let Some(section) = chunk.section_title.as_deref().filter(|s| !s.is_empty()) {
        header.push(format!("Section: {section}"));
    }

    let mut block = format!("[Context {number}]\n");
    if !header.is_empty() {
        block.push_str(&header.join(" | "));
        block.push('\n');
    }
    block.push_str(&chunk.text);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::{Chunk, ChunkKind};

    fn hit(project: &str, source: &str, title: Option<&str>, text: &str) -> RetrievedChunk {
        let mut chunk = Chunk::new(project, source, ChunkKind::Section, text).unwrap();
        if let Some(title) = title {
            chunk = chunk.with_section_title(title);
        }
        RetrievedChunk::new(project, chunk)
    }

    #[test]
    fn empty_list_gives_sentinel() {
        assert_eq!(build_context(&[]), "No relevant project documentation was found.");
    }

    #[test]
    fn blocks_are_numbered_in_input_order() {
        let chunks = vec![
            hit("ml", "README.md", Some("Model"), "Logistic regression."),
            hit("ocr", "detect.py::detect", None, "def detect(): ..."),
            hit("ml", "folder_tree", Some("Folder Structure"), "ml\n└── src"),
        ];
        let text = build_context(&chunks);
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("[Context 1]\nProject: ml | Source: README.md | Section: Model\n"));
        assert_eq!(
            blocks[1],
            "[Context 2]\nProject: ocr | Source: detect.py::detect\ndef detect(): ..."
        );
        assert!(blocks[2].starts_with("[Context 3]\n"));
        assert!(blocks[2].ends_with("└── src"));
    }

    #[test]
    fn header_omitted_when_no_fields_present() {
        let chunk = Chunk::new("", "", ChunkKind::Other, "bare text").unwrap();
        let text = build_context(&[RetrievedChunk::new("", chunk)]);
        assert_eq!(text, "[Context 1]\nbare text");
    }

    #[test]
    fn repeated_chunks_are_not_deduplicated() {
        let same = hit("ml", "README.md", None, "dup");
        let text = build_context(&[same.clone(), same]);
        assert!(text.contains("[Context 1]"));
        assert!(text.contains("[Context 2]"));
    }
}
