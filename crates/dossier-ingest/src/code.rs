//! Function-level code chunking using tree-sitter.
//!
//! Every function or method definition, at any nesting depth, becomes one
//! chunk spanning the definition's full lines. Files whose syntax tree
//! contains errors are treated as unparsable and yield nothing.

use std::path::Path;

use dossier_core::{Chunk, ChunkKind};
use tree_sitter::{Node, Parser};

use crate::walker::Language;

/// Extract one chunk per function definition in `content`.
///
/// `path` is the file's absolute path; its file name forms the chunk
/// source as `"<file name>::<function name>"`. Returns `None` when the
/// file cannot be parsed cleanly, which callers treat as zero chunks.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use dossier_ingest::code::extract_functions;
/// use dossier_ingest::walker::Language;
///
/// let chunks = extract_functions(
///     Path::new("/repo/train.py"),
///     "ml",
///     "def fit(x):\n    return x\n",
///     Language::Python,
/// )
/// .unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].source, "train.py::fit");
///
/// assert!(extract_functions(Path::new("/repo/bad.py"), "ml", "def (:", Language::Python).is_none());
/// ```
pub fn extract_functions(
    path: &Path,
    project: &str,
    content: &str,
    language: Language,
) -> Option<Vec<Chunk>> {
    let ts_language = language.tree_sitter_language()?;

    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&ts_language) {
        tracing::debug!("failed to load grammar for {}: {e}", path.display());
        return None;
    }

    let tree = parser.parse(content, None)?;
    let root = tree.root_node();
    if root.has_error() {
        tracing::debug!("skipping unparsable file {}", path.display());
        return None;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let lines: Vec<&str> = content.lines().collect();
    let source = content.as_bytes();

    let mut definitions = Vec::new();
    collect_definitions(root, source, language, &mut definitions);

    let chunks = definitions
        .into_iter()
        .filter_map(|def| {
            let snippet = lines
                .get(def.start_row..=def.end_row.min(lines.len().saturating_sub(1)))?
                .join("\n");
            Chunk::new(
                project,
                format!("{file_name}::{}", def.name),
                ChunkKind::Function,
                &snippet,
            )
            .map(|chunk| {
                chunk
                    .with_symbol(def.name)
                    .with_file(path)
                    .with_lines(def.start_row as u32 + 1, def.end_row as u32 + 1)
            })
        })
        .collect();

    Some(chunks)
}

/// A located function definition (0-based inclusive rows).
struct Definition {
    name: String,
    start_row: usize,
    end_row: usize,
}

fn collect_definitions(node: Node, source: &[u8], language: Language, out: &mut Vec<Definition>) {
    if let Some(name) = definition_name(&node, source, language) {
        let start = node.start_position();
        let end = node.end_position();
        // A node ending at column 0 stops at the previous line's newline
        let end_row = if end.column == 0 && end.row > start.row {
            end.row - 1
        } else {
            end.row
        };
        out.push(Definition {
            name,
            start_row: start.row,
            end_row,
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_definitions(child, source, language, out);
    }
}

/// Name of the function defined by `node`, if it is a function definition.
fn definition_name(node: &Node, source: &[u8], language: Language) -> Option<String> {
    match (language, node.kind()) {
        (Language::Python, "function_definition")
        | (Language::Rust, "function_item")
        | (Language::Go, "function_declaration" | "method_declaration")
        | (Language::Java, "method_declaration" | "constructor_declaration")
        | (Language::Ruby, "method" | "singleton_method")
        | (
            Language::JavaScript | Language::TypeScript,
            "function_declaration" | "generator_function_declaration" | "method_definition",
        ) => field_text(node, "name", source),
        (Language::JavaScript | Language::TypeScript, "variable_declarator") => {
            let value = node.child_by_field_name("value")?;
            if matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                field_text(node, "name", source)
            } else {
                None
            }
        }
        (Language::C | Language::Cpp, "function_definition") => {
            find_declarator_name(node, source)
        }
        _ => None,
    }
}

fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    let child = node.child_by_field_name(field)?;
    let text = node_text(&child, source);
    (!text.is_empty()).then_some(text)
}

/// Follow `declarator` fields down to the identifier naming a C/C++ function.
fn find_declarator_name(node: &Node, source: &[u8]) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
            | "operator_name" => {
                let text = node_text(&current, source);
                return (!text.is_empty()).then_some(text);
            }
            _ => current = current.child_by_field_name("declarator")?,
        }
    }
}
