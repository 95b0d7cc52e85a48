//! Source documents for a batch.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result, ServiceError};

/// One input document, read lazily.
#[derive(Debug, Clone)]
pub enum SourceDocument {
    File { name: String, path: PathBuf },
    Memory { name: String, bytes: Vec<u8> },
}

impl SourceDocument {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        SourceDocument::File { name, path }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        SourceDocument::Memory {
            name: name.into(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SourceDocument::File { name, .. } | SourceDocument::Memory { name, .. } => name,
        }
    }

    pub async fn read(&self) -> std::result::Result<Vec<u8>, ServiceError> {
        match self {
            SourceDocument::File { path, .. } => tokio::fs::read(path)
                .await
                .map_err(|e| ServiceError::new("document source", format!("{}: {}", path.display(), e))),
            SourceDocument::Memory { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

/// PDF files of one local folder, sorted by file name.
#[derive(Debug, Clone)]
pub struct LocalFolderSource {
    dir: PathBuf,
}

impl LocalFolderSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn documents(&self) -> Result<Vec<SourceDocument>> {
        if !self.dir.is_dir() {
            return Err(Error::Config(format!(
                "input folder {} does not exist",
                self.dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_pdf = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if path.is_file() && is_pdf {
                paths.push(path);
            }
        }
        paths.sort();
        debug!("Found {} PDF files in {}", paths.len(), self.dir.display());

        Ok(paths.into_iter().map(SourceDocument::from_path).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_folder_lists_sorted_pdfs() {
        let dir = TempDir::new().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();

        let docs = LocalFolderSource::new(dir.path()).documents().unwrap();
        let names: Vec<&str> = docs.iter().map(SourceDocument::name).collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn test_missing_folder_is_error() {
        let result = LocalFolderSource::new("/nonexistent/inbox").documents();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_service_error() {
        let doc = SourceDocument::from_path("/nonexistent/invoice.pdf");
        assert_eq!(doc.name(), "invoice.pdf");
        let err = doc.read().await.unwrap_err();
        assert_eq!(err.service, "document source");
    }
}
