//! Whole-document JSON persistence for project records.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use quarry_core::error::{QuarryError, Result};
use quarry_core::Project;

/// Reads and writes the record document as one pretty-printed JSON array.
///
/// No locking happens here: two callers doing read-modify-write against the
/// same document can interleave. Serialization is the caller's job.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record in document order.
    ///
    /// An absent, empty or unparseable document means "no projects yet" and
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if the document exists but cannot be read.
    pub async fn load_all(&self) -> Result<Vec<Project>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(QuarryError::Store(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        if bytes.trim_ascii().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<Project>>(&bytes) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "record document is unparseable; treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Overwrite the document with `records`.
    ///
    /// The new contents are written to a sibling temp file and renamed into
    /// place, so readers never observe a truncated document.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if the document cannot be written.
    pub async fn save_all(&self, records: &[Project]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(&e))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.write_error(&e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.write_error(&e))?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "saved records");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "records".into(), |n| n.to_string_lossy().into_owned());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn write_error(&self, e: &std::io::Error) -> QuarryError {
        QuarryError::Store(format!("failed to write {}: {e}", self.path.display()))
    }
}
