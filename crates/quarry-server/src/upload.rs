//! Request bodies that may carry a data file.
//!
//! Create and replace-file accept `multipart/form-data` (an uploaded
//! `dataFile` part plus text fields), a JSON object, or a urlencoded form.
//! Uploaded bytes are staged straight into the vault so the manager can adopt
//! them without a second copy.

use std::path::PathBuf;

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use quarry_vault::{FileSource, FileVault, RemovalOutcome};
use serde::Deserialize;

use crate::error::ApiError;

/// Name of the multipart part holding the uploaded file.
pub const UPLOAD_FIELD: &str = "dataFile";

#[derive(Debug, Default, Deserialize)]
struct FormFields {
    name: Option<String>,
    file: Option<String>,
    file_path: Option<String>,
    file_location: Option<String>,
}

impl FormFields {
    fn set(&mut self, key: &str, value: String) {
        match key {
            "name" => self.name = Some(value),
            "file" => self.file = Some(value),
            "file_path" => self.file_path = Some(value),
            "file_location" => self.file_location = Some(value),
            _ => {}
        }
    }

    /// First non-blank of `file`, `file_path`, `file_location`.
    fn path(&self) -> Option<&str> {
        [&self.file, &self.file_path, &self.file_location]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|p| !p.trim().is_empty())
    }
}

/// A parsed create or replace-file body.
#[derive(Debug, Default)]
pub struct FileForm {
    pub name: Option<String>,
    path: Option<String>,
    staged: Option<PathBuf>,
}

impl FileForm {
    /// Parse `req` according to its content type. A body of any other type is
    /// treated as empty so the manager reports the missing fields.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`ApiError`] for a malformed body, or a 500 if an upload
    /// cannot be staged.
    pub async fn extract<S>(req: Request, state: &S, vault: &FileVault) -> Result<Self, ApiError>
    where
        S: Send + Sync,
    {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rej| ApiError::bad_request(rej.body_text()))?;
            return Self::from_multipart(multipart, vault).await;
        }

        let fields = if content_type.contains("json") {
            let Json(fields) = Json::<FormFields>::from_request(req, state)
                .await
                .map_err(|rej| ApiError::bad_request(rej.body_text()))?;
            fields
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<FormFields>::from_request(req, state)
                .await
                .map_err(|rej| ApiError::bad_request(rej.body_text()))?;
            fields
        } else {
            FormFields::default()
        };

        Ok(Self {
            path: fields.path().map(str::to_string),
            name: fields.name,
            staged: None,
        })
    }

    async fn from_multipart(mut multipart: Multipart, vault: &FileVault) -> Result<Self, ApiError> {
        let mut fields = FormFields::default();
        let mut staged: Option<PathBuf> = None;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    discard_staged(vault, staged.as_deref()).await;
                    return Err(ApiError::bad_request(e.body_text()));
                }
            };
            let key = field.name().unwrap_or_default().to_string();

            if key == UPLOAD_FIELD {
                let original = field.file_name().unwrap_or("upload").to_string();
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        discard_staged(vault, staged.as_deref()).await;
                        return Err(ApiError::bad_request(e.body_text()));
                    }
                };
                // A repeated part replaces the earlier one.
                discard_staged(vault, staged.take().as_deref()).await;
                let path = vault
                    .stage_upload(&original, &bytes)
                    .await
                    .map_err(|e| ApiError::from_error(&e, "Error storing uploaded file"))?;
                tracing::debug!(path = %path.display(), size = bytes.len(), "staged upload");
                staged = Some(path);
            } else {
                match field.text().await {
                    Ok(value) => fields.set(&key, value),
                    Err(e) => {
                        discard_staged(vault, staged.as_deref()).await;
                        return Err(ApiError::bad_request(e.body_text()));
                    }
                }
            }
        }

        Ok(Self {
            path: fields.path().map(str::to_string),
            name: fields.name,
            staged,
        })
    }

    /// The data file to use; an upload wins over a path field.
    pub fn source(&self) -> Option<FileSource> {
        self.staged
            .clone()
            .map(FileSource::Uploaded)
            .or_else(|| self.path.clone().map(FileSource::Path))
    }

    /// Delete the staged upload after the request failed.
    pub async fn discard(&self, vault: &FileVault) {
        discard_staged(vault, self.staged.as_deref()).await;
    }
}

async fn discard_staged(vault: &FileVault, staged: Option<&std::path::Path>) {
    let Some(path) = staged else {
        return;
    };
    let location = path.to_string_lossy();
    match vault.remove(&location).await {
        RemovalOutcome::Missing(_) => {}
        outcome => outcome.log(&location),
    }
}
