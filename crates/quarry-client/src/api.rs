//! Typed access to the `/api/projects` routes.

use std::time::Duration;

use quarry_core::Project;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Default timeout for calls made through [`ProjectsClient::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        error: Option<String>,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status for [`ClientError::Api`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

/// Client for one backend base URL, e.g. `http://127.0.0.1:5000`.
#[derive(Debug, Clone)]
pub struct ProjectsClient {
    http: Client,
    base: String,
}

impl ProjectsClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/api/projects{tail}", self.base)
    }

    fn project_url(&self, id: &str, tail: &str) -> String {
        self.url(&format!("/{}{tail}", urlencoding::encode(id)))
    }

    pub async fn list(&self) -> Result<Vec<Project>, ClientError> {
        send(self.http.get(self.url(""))).await
    }

    /// Create a project from a path the backend can read.
    pub async fn create_from_path(&self, name: &str, path: &str) -> Result<Project, ClientError> {
        send(
            self.http
                .post(self.url(""))
                .json(&json!({ "name": name, "file": path })),
        )
        .await
    }

    /// Create a project by uploading the file body.
    pub async fn upload(
        &self,
        name: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Project, ClientError> {
        let form = Form::new()
            .text("name", name.to_string())
            .part("dataFile", Part::bytes(bytes).file_name(file_name.to_string()));
        send(self.http.post(self.url("")).multipart(form)).await
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<Project, ClientError> {
        send(
            self.http
                .put(self.project_url(id, ""))
                .json(&json!({ "name": name })),
        )
        .await
    }

    /// Returns the backend's confirmation message.
    pub async fn delete(&self, id: &str) -> Result<String, ClientError> {
        let body: MessageBody = send(self.http.delete(self.project_url(id, ""))).await?;
        Ok(body.message)
    }

    pub async fn replace_file_from_path(
        &self,
        id: &str,
        path: &str,
    ) -> Result<Project, ClientError> {
        send(
            self.http
                .put(self.project_url(id, "/file"))
                .json(&json!({ "file_path": path })),
        )
        .await
    }

    pub async fn replace_file_upload(
        &self,
        id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Project, ClientError> {
        let form =
            Form::new().part("dataFile", Part::bytes(bytes).file_name(file_name.to_string()));
        send(self.http.put(self.project_url(id, "/file")).multipart(form)).await
    }

    /// Raw analysis answer for `prompt`.
    pub async fn insight(&self, id: &str, prompt: &str) -> Result<Value, ClientError> {
        let url = self.url(&format!("/insight/{}", urlencoding::encode(id)));
        send(self.http.post(url).json(&json!({ "prompt": prompt }))).await
    }

    /// Raw suggested-questions answer.
    pub async fn suggestions(&self, id: &str) -> Result<Value, ClientError> {
        let url = self.url(&format!("/get_suggestion/{}", urlencoding::encode(id)));
        send(self.http.get(url)).await
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let (message, error) = match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => (body.message, body.error),
            Err(_) => (String::from_utf8_lossy(&bytes).into_owned(), None),
        };
        tracing::debug!(status = status.as_u16(), %message, "backend returned an error");
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
            error,
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn rename_puts_json_and_decodes_record() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/projects/abc"))
            .and(body_json(json!({ "name": "Revenue" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc",
                "name": "Revenue",
                "file_location": "./files/1-demo.csv",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProjectsClient::new(&format!("{}/", server.uri())).unwrap();
        let project = client.rename("abc", "Revenue").await.unwrap();
        assert_eq!(project.name, "Revenue");
    }

    #[tokio::test]
    async fn error_body_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({ "message": "Project not found: nope" })),
            )
            .mount(&server)
            .await;

        let client = ProjectsClient::new(&server.uri()).unwrap();
        let err = client.delete("nope").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Project not found: nope");
    }

    #[tokio::test]
    async fn plain_text_error_keeps_body_as_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = ProjectsClient::new(&server.uri()).unwrap();
        match client.list().await.unwrap_err() {
            ClientError::Api { status, message, error } => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
                assert!(error.is_none());
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ids_are_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/projects/get_suggestion/a%20b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProjectsClient::new(&server.uri()).unwrap();
        client.suggestions("a b").await.unwrap();
    }
}
