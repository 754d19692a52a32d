//! Document source abstraction.
//!
//! The [`DocumentSource`] trait is the boundary to wherever folders of
//! documents actually live: it lists a folder's files and extracts each
//! file's plain text. Extraction is opaque to the pipeline — whatever the
//! underlying format, the source returns UTF-8 text.
//!
//! [`FilesystemSource`] is the built-in implementation, scanning a local
//! directory tree with include/exclude globs. Remote drive sources plug in
//! behind the same trait.

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::SourceConfig;

/// A file as listed by a source, before any extraction.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Stable id derived from the source-side identity of the file.
    pub id: String,
    pub name: String,
    /// Source-private locator used by `fetch_text`.
    pub locator: String,
    pub mime_type: String,
}

/// A folder-of-documents backend.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Display name for a folder id.
    fn folder_name(&self, folder_id: &str) -> String;

    /// List the folder's files. Order must be deterministic.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<SourceFile>>;

    /// Extract a file's plain text.
    async fn fetch_text(&self, file: &SourceFile) -> Result<String>;
}

// ============ Filesystem Source ============

/// Source over a local directory tree. Folder ids are paths relative to
/// the configured root (`"."` for the root itself).
pub struct FilesystemSource {
    root: PathBuf,
    include_set: GlobSet,
    exclude_set: GlobSet,
    follow_symlinks: bool,
}

impl FilesystemSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        if !config.root.exists() {
            bail!("Source root does not exist: {}", config.root.display());
        }

        let include_set = build_globset(&config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        Ok(Self {
            root: config.root.clone(),
            include_set,
            exclude_set,
            follow_symlinks: config.follow_symlinks,
        })
    }

    fn folder_path(&self, folder_id: &str) -> Result<PathBuf> {
        if folder_id.split('/').any(|part| part == "..") || Path::new(folder_id).is_absolute() {
            bail!("Invalid folder id: {}", folder_id);
        }
        Ok(if folder_id == "." {
            self.root.clone()
        } else {
            self.root.join(folder_id)
        })
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn folder_name(&self, folder_id: &str) -> String {
        if folder_id == "." {
            self.root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| folder_id.to_string())
        } else {
            Path::new(folder_id)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| folder_id.to_string())
        }
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<SourceFile>> {
        let folder = self.folder_path(folder_id)?;
        if !folder.exists() {
            bail!("Folder does not exist: {}", folder.display());
        }

        let mut files = Vec::new();

        let walker = WalkDir::new(&folder).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if self.exclude_set.is_match(&rel_str) {
                continue;
            }
            if !self.include_set.is_match(&rel_str) {
                continue;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            files.push(SourceFile {
                id: file_id_for(&rel_str),
                name,
                locator: rel_str.clone(),
                mime_type: mime_type_for(path),
            });
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.locator.cmp(&b.locator));

        Ok(files)
    }

    async fn fetch_text(&self, file: &SourceFile) -> Result<String> {
        let path = self.root.join(&file.locator);
        Ok(std::fs::read_to_string(&path)?)
    }
}

/// Stable file id: truncated SHA-256 of the source-side path.
fn file_id_for(locator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(locator.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn mime_type_for(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") => "text/markdown".to_string(),
        Some("txt") => "text/plain".to_string(),
        Some("csv") => "text/csv".to_string(),
        _ => "text/plain".to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn source_over(root: &Path) -> FilesystemSource {
        FilesystemSource::new(&SourceConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lists_matching_files_deterministically() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("b.md"), "# B").unwrap();
        fs::write(tmp.path().join("a.txt"), "A").unwrap();
        fs::write(tmp.path().join("skip.bin"), [0u8, 1]).unwrap();

        let source = source_over(tmp.path());
        let files = source.list_files(".").await.unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
        assert_eq!(files[1].mime_type, "text/markdown");
    }

    #[tokio::test]
    async fn test_fetch_text_reads_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("note.txt"), "hello there").unwrap();

        let source = source_over(tmp.path());
        let files = source.list_files(".").await.unwrap();
        let text = source.fetch_text(&files[0]).await.unwrap();
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn test_file_ids_are_stable() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("note.txt"), "hello").unwrap();

        let source = source_over(tmp.path());
        let first = source.list_files(".").await.unwrap();
        let second = source.list_files(".").await.unwrap();
        assert_eq!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn test_rejects_escaping_folder_ids() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = source_over(tmp.path());
        assert!(source.list_files("../outside").await.is_err());
        assert!(source.list_files("/etc").await.is_err());
    }
}
