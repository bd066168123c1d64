use std::path::{Path, PathBuf};

use anyhow::Context as _;

/// Disposable directory holding raw page captures for debugging.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    dir: PathBuf,
}

impl ScratchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes every entry under the scratch directory, keeping the directory itself.
    ///
    /// Entries that cannot be removed are logged and skipped.
    pub fn clear(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::info!(dir = %self.dir.display(), %err, "scratch dir not present; nothing to clear");
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(dir = %self.dir.display(), %err, "failed to read scratch entry");
                    continue;
                }
            };
            let path = entry.path();
            let removed = match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => std::fs::remove_dir_all(&path),
                Ok(_) => std::fs::remove_file(&path),
                Err(err) => Err(err),
            };
            match removed {
                Ok(()) => tracing::debug!(path = %path.display(), "deleted scratch entry"),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to delete scratch entry")
                }
            }
        }
    }

    pub fn ensure_exists(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create scratch dir: {}", self.dir.display()))
    }

    pub fn write(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.entry_path(name)?;
        std::fs::write(&path, content)
            .with_context(|| format!("write scratch entry: {}", path.display()))?;
        Ok(path)
    }

    fn entry_path(&self, name: &str) -> anyhow::Result<PathBuf> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            anyhow::bail!("scratch entry name must be a single path segment: {name:?}");
        }
        Ok(self.dir.join(name))
    }
}

pub fn search_result_name() -> &'static str {
    "search_result.html"
}

pub fn detail_page_name(index: usize) -> String {
    format!("project_result_{index}.html")
}
