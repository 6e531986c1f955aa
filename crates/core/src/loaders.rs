use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::Result;

/// Reads each path as lossy UTF-8 and normalizes whitespace. Paths that do
/// not exist are skipped.
pub fn load_text_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Document>> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "skipping missing input");
            continue;
        }
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        docs.push(Document::normalized(source_name(path), &text));
    }
    Ok(docs)
}

/// Loads every `.md` file directly inside `dir`, sorted by file name.
/// Reference texts keep their line structure so headings stay readable.
pub fn load_reference_corpus(dir: &Path) -> Result<Vec<Document>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("md"))
        .collect();
    files.sort();
    let mut docs = Vec::with_capacity(files.len());
    for path in files {
        let text = fs::read_to_string(&path)?;
        debug!(path = %path.display(), "loaded reference document");
        docs.push(Document::new(source_name(&path), text));
    }
    Ok(docs)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_normalizes_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("chapter1.txt");
        fs::write(&good, "Emma  woke\n\nearly.").unwrap();
        let missing = dir.path().join("missing.txt");
        let docs = load_text_files(&[good, missing]).unwrap();
        assert_eq!(docs, vec![Document::new("chapter1.txt", "Emma woke early.")]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.txt");
        fs::write(&path, [b'c', b'a', 0xff, b'f', b'e']).unwrap();
        let docs = load_text_files(&[path]).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.starts_with("ca"));
        assert!(docs[0].text.ends_with("fe"));
    }

    #[test]
    fn reference_loader_only_reads_markdown() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "# B").unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let docs = load_reference_corpus(dir.path()).unwrap();
        let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "b.md"]);
    }

    #[test]
    fn missing_reference_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_reference_corpus(&dir.path().join("nope"))
            .unwrap()
            .is_empty());
    }
}
