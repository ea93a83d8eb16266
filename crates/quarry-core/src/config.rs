//! Runtime configuration.
//!
//! Loaded from an optional `quarry.toml` in the backend root, then
//! overridden by environment variables:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5000"
//!
//! [store]
//! database = "database.json"
//!
//! [vault]
//! dir = "files"
//! allow_outside_root = false
//!
//! [analysis]
//! endpoint = "http://127.0.0.1:8000/analyze-file-with-prompt"
//! timeout_ms = 120000
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{QuarryError, Result};

pub const CONFIG_FILE_NAME: &str = "quarry.toml";
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_DATABASE: &str = "database.json";
pub const DEFAULT_VAULT_DIR: &str = "files";
pub const DEFAULT_ANALYSIS_ENDPOINT: &str = "http://127.0.0.1:8000/analyze-file-with-prompt";
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 120_000;

/// Environment variable consulted at call time by [`BoundaryPolicy::FromEnv`].
pub const ALLOW_OUTSIDE_ENV: &str = "QUARRY_ALLOW_OUTSIDE_ROOT";

/// Whether caller-supplied source paths may live outside the backend root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryPolicy {
    /// Always reject paths outside the root.
    Enforce,
    /// Never check containment.
    AllowOutside,
    /// Read [`ALLOW_OUTSIDE_ENV`] each time a path is checked.
    #[default]
    FromEnv,
}

impl BoundaryPolicy {
    #[must_use]
    pub fn allows_outside(self) -> bool {
        match self {
            Self::Enforce => false,
            Self::AllowOutside => true,
            Self::FromEnv => std::env::var(ALLOW_OUTSIDE_ENV)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Resolved configuration with absolute paths.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarryConfig {
    /// Backend root; also the containment boundary for caller paths.
    pub root: PathBuf,
    pub bind: String,
    pub database: PathBuf,
    pub vault_dir: PathBuf,
    pub boundary: BoundaryPolicy,
    pub analysis: AnalysisConfig,
}

/// Where and how to reach the external analysis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ANALYSIS_ENDPOINT.to_string(),
            timeout_ms: DEFAULT_ANALYSIS_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    vault: VaultSection,
    #[serde(default)]
    analysis: AnalysisSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    bind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    database: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VaultSection {
    dir: Option<PathBuf>,
    allow_outside_root: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisSection {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
}

impl QuarryConfig {
    /// Defaults rooted at `root`, without reading any file or environment.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            database: root.join(DEFAULT_DATABASE),
            vault_dir: root.join(DEFAULT_VAULT_DIR),
            bind: DEFAULT_BIND.to_string(),
            boundary: BoundaryPolicy::default(),
            analysis: AnalysisConfig::default(),
            root,
        }
    }

    /// Load `<root>/quarry.toml` (if present) and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Config`] if the file exists but is malformed,
    /// or an override has an invalid value.
    pub fn load(root: &Path) -> Result<Self> {
        let root = std::path::absolute(root)?;
        let path = root.join(CONFIG_FILE_NAME);
        let file = match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut config = match file {
            Some(text) => Self::from_toml(&root, &text)?,
            None => Self::with_root(root),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse config file contents, resolving relative paths against `root`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Config`] on malformed TOML or unknown keys.
    pub fn from_toml(root: &Path, text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| QuarryError::Config(e.to_string()))?;

        let mut config = Self::with_root(root);
        if let Some(bind) = file.server.bind {
            config.bind = bind;
        }
        if let Some(database) = file.store.database {
            config.database = root.join(database);
        }
        if let Some(dir) = file.vault.dir {
            config.vault_dir = root.join(dir);
        }
        config.boundary = match file.vault.allow_outside_root {
            Some(true) => BoundaryPolicy::AllowOutside,
            Some(false) => BoundaryPolicy::Enforce,
            None => BoundaryPolicy::FromEnv,
        };
        if let Some(endpoint) = file.analysis.endpoint {
            config.analysis.endpoint = endpoint;
        }
        if let Some(timeout_ms) = file.analysis.timeout_ms {
            config.analysis.timeout_ms = timeout_ms;
        }
        Ok(config)
    }

    /// Apply `QUARRY_BIND`, `QUARRY_ANALYSIS_URL` and `QUARRY_ANALYSIS_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Config`] if the timeout is not a positive integer.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = lookup("QUARRY_BIND").filter(|v| !v.trim().is_empty()) {
            self.bind = bind.trim().to_string();
        }
        if let Some(url) = lookup("QUARRY_ANALYSIS_URL").filter(|v| !v.trim().is_empty()) {
            self.analysis.endpoint = url.trim().to_string();
        }
        if let Some(raw) = lookup("QUARRY_ANALYSIS_TIMEOUT_MS") {
            let timeout_ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| {
                    QuarryError::Config(format!(
                        "QUARRY_ANALYSIS_TIMEOUT_MS must be a positive integer, got '{raw}'"
                    ))
                })?;
            self.analysis.timeout_ms = timeout_ms;
        }
        Ok(())
    }
}
