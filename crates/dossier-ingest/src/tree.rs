//! Box-drawing rendering of a project's directory layout.

use std::fs;
use std::path::Path;

use dossier_core::{Chunk, ChunkKind, IngestConfig};

/// Source label of the folder-structure chunk.
pub const FOLDER_TREE_SOURCE: &str = "folder_tree";

/// Section title of the folder-structure chunk.
pub const FOLDER_TREE_TITLE: &str = "Folder Structure";

/// Render `root` as a text tree, root name first.
///
/// Directories sort before files, then by lowercase name. Entries named in
/// `exclude_dirs` or `__pycache__` are left out. Levels are listed while
/// their depth (root children at depth 0) does not exceed `max_depth`.
/// Symlinked directories are listed but not descended into.
///
/// # Examples
///
/// ```
/// use dossier_ingest::tree::render_folder_tree;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::create_dir(dir.path().join("src")).unwrap();
/// std::fs::write(dir.path().join("src/main.py"), "").unwrap();
/// std::fs::write(dir.path().join("README.md"), "").unwrap();
///
/// let tree = render_folder_tree(dir.path(), 4, &[]);
/// let lines: Vec<&str> = tree.lines().skip(1).collect();
/// assert_eq!(lines, vec!["├── src", "│   └── main.py", "└── README.md"]);
/// ```
pub fn render_folder_tree(root: &Path, max_depth: usize, exclude_dirs: &[String]) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut lines = vec![name];
    render_level(root, "", 0, max_depth, exclude_dirs, &mut lines);
    lines.join("\n")
}

/// The folder-structure chunk for a project, if enabled and the root exists.
pub fn folder_tree_chunk(project: &str, root: &Path, ingest: &IngestConfig) -> Option<Chunk> {
    if !ingest.folder_tree || !root.is_dir() {
        return None;
    }
    let tree = render_folder_tree(root, ingest.folder_tree_depth, &ingest.exclude_dirs);
    Chunk::new(project, FOLDER_TREE_SOURCE, ChunkKind::FolderTree, &tree)
        .map(|chunk| chunk.with_section_title(FOLDER_TREE_TITLE))
}

fn render_level(
    dir: &Path,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    exclude_dirs: &[String],
    lines: &mut Vec<String>,
) {
    if depth > max_depth {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("cannot list {}: {e}", dir.display());
            return;
        }
    };

    let mut listed: Vec<(bool, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().ok()?;
            let is_dir = file_type.is_dir();
            let excluded = name == "__pycache__" || (is_dir && exclude_dirs.contains(&name));
            (!excluded).then_some((is_dir, name))
        })
        .collect();
    listed.sort_by(|(a_dir, a_name), (b_dir, b_name)| {
        b_dir
            .cmp(a_dir)
            .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
    });

    let count = listed.len();
    for (i, (is_dir, name)) in listed.into_iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        lines.push(format!("{prefix}{connector}{name}"));

        if is_dir {
            let extension = if last { "    " } else { "│   " };
            render_level(
                &dir.join(&name),
                &format!("{prefix}{extension}"),
                depth + 1,
                max_depth,
                exclude_dirs,
                lines,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/models")).unwrap();
        fs::create_dir_all(root.join("src/__pycache__")).unwrap();
        fs::create_dir_all(root.join(".venv/lib")).unwrap();
        fs::write(root.join("src/models/yolo.py"), "").unwrap();
        fs::write(root.join("src/__pycache__/yolo.cpython-311.pyc"), "").unwrap();
        fs::write(root.join("src/app.py"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();
        fs::write(root.join("requirements.txt"), "").unwrap();
        dir
    }

    #[test]
    fn directories_first_then_lowercase_name() {
        let dir = layout();
        let tree = render_folder_tree(dir.path(), 4, &[".venv".to_string()]);
        let lines: Vec<&str> = tree.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec![
                "├── src",
                "│   ├── models",
                "│   │   └── yolo.py",
                "│   └── app.py",
                "├── README.md",
                "└── requirements.txt",
            ]
        );
    }

    #[test]
    fn first_line_is_root_name() {
        let dir = layout();
        let tree = render_folder_tree(dir.path(), 4, &[]);
        let root_name = dir.path().file_name().unwrap().to_string_lossy();
        assert_eq!(tree.lines().next(), Some(root_name.as_ref()));
    }

    #[test]
    fn pycache_is_always_hidden() {
        let dir = layout();
        let tree = render_folder_tree(dir.path(), 4, &[]);
        assert!(!tree.contains("__pycache__"));
        assert!(tree.contains(".venv"));
    }

    #[test]
    fn depth_limits_descent() {
        let dir = layout();
        let tree = render_folder_tree(dir.path(), 0, &[".venv".to_string()]);
        assert!(tree.contains("src"));
        assert!(!tree.contains("app.py"));

        let tree = render_folder_tree(dir.path(), 1, &[".venv".to_string()]);
        assert!(tree.contains("app.py"));
        assert!(tree.contains("models"));
        assert!(!tree.contains("yolo.py"));
    }

    #[test]
    fn chunk_carries_folder_tree_provenance() {
        let dir = layout();
        let chunk = folder_tree_chunk("ocr", dir.path(), &IngestConfig::default()).unwrap();
        assert_eq!(chunk.source, "folder_tree");
        assert_eq!(chunk.kind, ChunkKind::FolderTree);
        assert_eq!(chunk.section_title.as_deref(), Some("Folder Structure"));
        assert_eq!(chunk.project, "ocr");
        assert!(!chunk.text.contains(".venv"));
    }

    #[test]
    fn chunk_skipped_when_disabled_or_missing() {
        let dir = layout();
        let disabled = IngestConfig {
            folder_tree: false,
            ..IngestConfig::default()
        };
        assert!(folder_tree_chunk("ocr", dir.path(), &disabled).is_none());
        assert!(
            folder_tree_chunk("ocr", &dir.path().join("missing"), &IngestConfig::default())
                .is_none()
        );
    }
}
