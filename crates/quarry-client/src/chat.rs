//! A chat over one project: prompts go out as insight requests and answers
//! come back as rendered messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quarry_core::{AnalysisType, CsvTable, Insight};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::api::{ClientError, ProjectsClient};

/// Text of the assistant message that accompanies a rendered answer.
pub const RESULT_HEADLINE: &str = "Here are the results of your query:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("a request is already in progress")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<CsvTable>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisType>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sql: None,
            table: None,
            insights: Vec::new(),
            analysis: None,
            timestamp: Utc::now(),
        }
    }

    /// Render a raw insight response for `prompt`.
    ///
    /// Answers that do not carry the three insight keys are shown verbatim.
    #[must_use]
    pub fn from_answer(prompt: &str, answer: &Value) -> Self {
        let analysis = Some(AnalysisType::detect(prompt));
        let Some(insight) = Insight::from_value(answer) else {
            let content = answer
                .get("raw_response")
                .and_then(Value::as_str)
                .map_or_else(|| answer.to_string(), str::to_string);
            return Self {
                analysis,
                ..Self::plain(Role::Assistant, content)
            };
        };

        let table = insight.table();
        Self {
            sql: (!insight.generate_sql.trim().is_empty()).then(|| insight.generate_sql.clone()),
            table: (!table.is_empty()).then_some(table),
            insights: insight.insight_lines(),
            analysis,
            ..Self::plain(Role::Assistant, RESULT_HEADLINE)
        }
    }
}

/// Where insight answers come from.
#[async_trait]
pub trait InsightSource: Send + Sync {
    async fn insight(&self, project_id: &str, prompt: &str) -> Result<Value, ClientError>;
}

#[async_trait]
impl InsightSource for ProjectsClient {
    async fn insight(&self, project_id: &str, prompt: &str) -> Result<Value, ClientError> {
        ProjectsClient::insight(self, project_id, prompt).await
    }
}

pub struct ChatSession<S> {
    source: S,
    project_id: String,
    messages: Mutex<Vec<ChatMessage>>,
    busy: AtomicBool,
}

/// Clears the busy flag even if the send future is dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: InsightSource> ChatSession<S> {
    pub fn new(source: S, project_id: impl Into<String>) -> Self {
        Self {
            source,
            project_id: project_id.into(),
            messages: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask about the project and append the answer to the conversation.
    ///
    /// Upstream failures do not surface as errors; they become an
    /// [`Role::Error`] message, which is returned.
    ///
    /// # Errors
    ///
    /// - [`ChatError::EmptyPrompt`] for a blank prompt
    /// - [`ChatError::Busy`] while another send is outstanding
    pub async fn send(&self, prompt: &str) -> Result<ChatMessage, ChatError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ChatError::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        self.log().push(ChatMessage::plain(Role::User, prompt));

        let reply = match self.source.insight(&self.project_id, prompt).await {
            Ok(answer) => ChatMessage::from_answer(prompt, &answer),
            Err(e) => {
                tracing::warn!(project_id = %self.project_id, error = %e, "insight request failed");
                ChatMessage::plain(Role::Error, format!("Could not analyze your query: {e}"))
            }
        };
        self.log().push(reply.clone());
        Ok(reply)
    }
}
