//! Document discovery and text extraction for the supported source kinds.
//!
//! Markdown roots are walked recursively; PDF roots are scanned flat. Both
//! return paths sorted so chunk ids come out in a stable order.
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::traits::DocumentSource;
use crate::types::{Document, SourceFormat};

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn ensure_dir(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(Error::DirectoryNotFound(root.to_path_buf()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownSource;

impl DocumentSource for MarkdownSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Markdown
    }

    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        ensure_dir(root)?;
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && has_extension(e.path(), MARKDOWN_EXTENSIONS))
            .map(walkdir::DirEntry::into_path)
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_text(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| Error::document_read(path, e))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfSource;

impl DocumentSource for PdfSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Pdf
    }

    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        ensure_dir(root)?;
        let mut files = Vec::new();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, &["pdf"]) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    #[cfg(feature = "pdf")]
    fn read_text(&self, path: &Path) -> Result<String> {
        // pdf-extract panics on some malformed inputs instead of returning an error.
        match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(Error::document_read(path, e)),
            Err(_) => Err(Error::document_read(path, "malformed PDF")),
        }
    }

    #[cfg(not(feature = "pdf"))]
    fn read_text(&self, path: &Path) -> Result<String> {
        Err(Error::document_read(path, "built without the `pdf` feature"))
    }
}

/// Strategy for a configured source kind.
pub fn source_for(format: SourceFormat) -> Box<dyn DocumentSource> {
    match format {
        SourceFormat::Markdown => Box::new(MarkdownSource),
        SourceFormat::Pdf => Box::new(PdfSource),
    }
}

/// Reads one discovered path into a `Document`.
pub fn load_document(source: &dyn DocumentSource, path: &Path) -> Result<Document> {
    let content = source.read_text(path)?;
    Ok(Document { path: path.to_path_buf(), content, format: source.format() })
}
