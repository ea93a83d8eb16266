//! The file vault: a directory of uploaded data files.
//!
//! Files are stored as `<unix millis>-<original basename>`, which is unique
//! enough without coordination; two uploads of the same basename within one
//! millisecond would collide and that risk is accepted.
//!
//! Stored locations are always written as `./<vault dir>/<name>` with forward
//! slashes, relative to the backend root. Older backslash forms such as
//! `.\files\x.csv` are still understood by [`FileVault::locate`].

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use quarry_core::error::{QuarryError, Result};
use quarry_core::{BoundaryPolicy, QuarryConfig};

/// Where a project's data file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file already written to disk by the upload mechanism.
    Uploaded(PathBuf),
    /// A path string supplied by the caller.
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    Upload,
    Caller,
}

/// A source file that exists, with its absolute canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub path: PathBuf,
    pub origin: SourceOrigin,
    /// File name as the caller referred to it, before symlink resolution.
    pub basename: String,
}

/// Result of a best-effort delete. Never an error: callers log it and move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed(PathBuf),
    /// The file was already gone.
    Missing(PathBuf),
    /// The location points outside the vault directory; nothing was touched.
    Refused(PathBuf),
    Failed { path: PathBuf, error: String },
}

impl RemovalOutcome {
    #[must_use]
    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Removed(_))
    }

    /// Emit the outcome at `info` when removed and `warn` otherwise.
    pub fn log(&self, location: &str) {
        match self {
            Self::Removed(path) => {
                tracing::info!(location, path = %path.display(), "removed vault file");
            }
            Self::Missing(path) => {
                tracing::warn!(location, path = %path.display(), "vault file already gone");
            }
            Self::Refused(path) => {
                tracing::warn!(
                    location,
                    path = %path.display(),
                    "refusing to delete file outside the vault"
                );
            }
            Self::Failed { path, error } => {
                tracing::warn!(
                    location,
                    path = %path.display(),
                    error = %error,
                    "failed to delete vault file"
                );
            }
        }
    }
}

/// The vault directory plus the backend root it is checked against.
#[derive(Debug, Clone)]
pub struct FileVault {
    root: PathBuf,
    dir: PathBuf,
    policy: BoundaryPolicy,
}

impl FileVault {
    pub fn new(root: impl Into<PathBuf>, dir: impl Into<PathBuf>, policy: BoundaryPolicy) -> Self {
        let root = absolute_or_given(root.into());
        let dir = dir.into();
        let dir = if dir.is_absolute() {
            normalize_lexically(&dir)
        } else {
            normalize_lexically(&root.join(dir))
        };
        Self { root, dir, policy }
    }

    #[must_use]
    pub fn from_config(config: &QuarryConfig) -> Self {
        Self::new(&config.root, &config.vault_dir, config.boundary)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the vault directory if it does not exist. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Io`] if the directory cannot be created.
    pub async fn ensure_directory(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Map a source to a single absolute, lexically normalized path without
    /// touching the filesystem.
    ///
    /// Caller strings are trimmed and `\` is treated as `/`. The forms are:
    /// - absolute paths are used as-is
    /// - `./rest` resolves to `<root>/rest`
    /// - `<root dir name>/rest` resolves to `<root>/rest`
    /// - anything else (e.g. `files/demo.csv`) resolves to `<root>/<path>`
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::InvalidArgument`] for an empty caller path.
    pub fn candidate_path(&self, source: &FileSource) -> Result<PathBuf> {
        let joined = match source {
            FileSource::Uploaded(path) if path.is_absolute() => path.clone(),
            FileSource::Uploaded(path) => self.root.join(path),
            FileSource::Path(raw) => {
                let unified = raw.trim().replace('\\', "/");
                if unified.is_empty() {
                    return Err(QuarryError::InvalidArgument(
                        "A file path is required.".to_string(),
                    ));
                }
                let marker = self.root_marker();
                if Path::new(&unified).is_absolute() {
                    PathBuf::from(&unified)
                } else if let Some(rest) = unified.strip_prefix("./") {
                    self.root.join(rest)
                } else if let Some(rest) = marker
                    .as_deref()
                    .and_then(|m| unified.strip_prefix(m))
                {
                    self.root.join(rest)
                } else {
                    self.root.join(&unified)
                }
            }
        };
        Ok(normalize_lexically(&joined))
    }

    /// Resolve a source to an existing regular file.
    ///
    /// # Errors
    ///
    /// - [`QuarryError::InvalidArgument`] for an empty path or a non-file target
    /// - [`QuarryError::SourceNotFound`] if the resolved path is not accessible
    pub async fn resolve_candidate_source(&self, source: &FileSource) -> Result<ResolvedSource> {
        let candidate = self.candidate_path(source)?;
        let origin = match source {
            FileSource::Uploaded(_) => SourceOrigin::Upload,
            FileSource::Path(_) => SourceOrigin::Caller,
        };

        let metadata = tokio::fs::metadata(&candidate)
            .await
            .map_err(|_| QuarryError::SourceNotFound(candidate.display().to_string()))?;
        if !metadata.is_file() {
            return Err(QuarryError::InvalidArgument(format!(
                "Source path is not a regular file: {}",
                candidate.display()
            )));
        }

        let basename = candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = tokio::fs::canonicalize(&candidate).await?;
        Ok(ResolvedSource {
            path,
            origin,
            basename,
        })
    }

    /// Reject paths outside the configured root unless the policy allows them.
    ///
    /// Both sides are canonicalized when they exist, so symlinks cannot be
    /// used to step outside the root.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::OutsideBoundary`] when the path escapes the root.
    pub async fn enforce_containment(&self, path: &Path) -> Result<()> {
        if self.policy.allows_outside() {
            return Ok(());
        }
        let root = canonical_or_lexical(&self.root).await;
        let target = canonical_or_lexical(path).await;
        if target.starts_with(&root) {
            Ok(())
        } else {
            Err(QuarryError::OutsideBoundary {
                path: target.display().to_string(),
                root: root.display().to_string(),
            })
        }
    }

    /// Ensure the source has a stably named copy inside the vault and return
    /// its stored location.
    ///
    /// An uploaded file the upload mechanism already placed in the vault keeps
    /// its name. Everything else is copied under a fresh name, so a record
    /// never shares its file with another record.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Io`] if the copy fails.
    pub async fn materialize(&self, source: &ResolvedSource) -> Result<String> {
        self.ensure_directory().await?;

        if source.origin == SourceOrigin::Upload {
            let vault_dir = tokio::fs::canonicalize(&self.dir).await?;
            if source.path.parent() == Some(vault_dir.as_path()) {
                if let Some(name) = source.path.file_name() {
                    let name = name.to_string_lossy();
                    tracing::debug!(name = %name, "upload already in vault; reusing");
                    return Ok(self.location_for(&name));
                }
            }
        }

        let name = stored_name(&source.basename);
        let dest = self.dir.join(&name);
        tokio::fs::copy(&source.path, &dest).await?;
        tracing::debug!(from = %source.path.display(), to = %dest.display(), "copied into vault");
        Ok(self.location_for(&name))
    }

    /// Write an uploaded body into the vault under a fresh stored name.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Io`] if the file cannot be written.
    pub async fn stage_upload(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure_directory().await?;
        let path = self.dir.join(stored_name(original_name));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Map a stored location (canonical or legacy form) to an absolute path.
    #[must_use]
    pub fn locate(&self, location: &str) -> PathBuf {
        let unified = location.trim().replace('\\', "/");
        let path = Path::new(&unified);
        if path.is_absolute() {
            return normalize_lexically(path);
        }
        let mut rest = unified.as_str();
        while let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        }
        normalize_lexically(&self.root.join(rest))
    }

    /// Best-effort delete of a stored location.
    pub async fn remove(&self, location: &str) -> RemovalOutcome {
        let path = self.locate(location);
        if path == self.dir || !path.starts_with(&self.dir) {
            return RemovalOutcome::Refused(path);
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => RemovalOutcome::Removed(path),
            Err(e) if e.kind() == ErrorKind::NotFound => RemovalOutcome::Missing(path),
            Err(e) => RemovalOutcome::Failed {
                path,
                error: e.to_string(),
            },
        }
    }

    fn location_for(&self, name: &str) -> String {
        match self.dir.strip_prefix(&self.root) {
            Ok(rel) => {
                let mut parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                parts.push(name.to_string());
                format!("./{}", parts.join("/"))
            }
            Err(_) => self
                .dir
                .join(name)
                .to_string_lossy()
                .replace('\\', "/"),
        }
    }

    /// `"<root dir name>/"`, the prefix callers sometimes include by mistake.
    fn root_marker(&self) -> Option<String> {
        self.root
            .file_name()
            .map(|n| format!("{}/", n.to_string_lossy()))
    }
}

/// `<unix millis>-<basename>` for a new vault file.
#[must_use]
pub fn stored_name(original_name: &str) -> String {
    format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        sanitize_basename(original_name)
    )
}

/// Keep only the final path segment of a client-supplied file name.
fn sanitize_basename(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match last {
        "" | "." | ".." => "upload".to_string(),
        name => name.to_string(),
    }
}

/// Fold `.` and `..` components without consulting the filesystem.
/// `..` at the root of an absolute path is dropped.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

fn absolute_or_given(path: PathBuf) -> PathBuf {
    let absolute = std::path::absolute(&path).unwrap_or(path);
    normalize_lexically(&absolute)
}

async fn canonical_or_lexical(path: &Path) -> PathBuf {
    match tokio::fs::canonicalize(path).await {
        Ok(canonical) => canonical,
        Err(_) => normalize_lexically(path),
    }
}
