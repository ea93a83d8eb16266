//! Per-project cache of suggested questions.
//!
//! A selection moves through `Idle -> Loading -> Ready | Failed`. Only one
//! fetch is in flight at a time: starting another, selecting a different
//! project, or calling [`SuggestionCache::cancel`] cancels it, and a cancelled
//! fetch leaves the state alone. Successes are kept for the cache's lifetime.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::{ClientError, ProjectsClient};

/// Shown when the backend cannot provide suggestions.
pub const DEFAULT_SUGGESTIONS: [&str; 10] = [
    "Show me sales trends over the last 6 months",
    "Compare revenue by product category",
    "Find any unusual patterns in the data",
    "Predict next month's sales forecast",
    "Segment customers by behavior",
    "What's the correlation between price and sales?",
    "Show me the top 10 performing products",
    "Identify seasonal patterns in the data",
    "Visualize monthly sales as a bar chart",
    "Show me a line graph of revenue over time",
];

/// Keys the suggestion array may arrive under, in lookup order.
const SUGGESTION_KEYS: [&str; 4] = [
    "Suggested_Questions",
    "SuggestedQuestions",
    "suggested_questions",
    "suggestions",
];

#[must_use]
pub fn default_suggestions() -> Vec<String> {
    DEFAULT_SUGGESTIONS.iter().map(|s| (*s).to_string()).collect()
}

/// Pull a non-empty list of questions out of a suggestion response.
#[must_use]
pub fn extract_suggestions(value: &Value) -> Option<Vec<String>> {
    let array = SUGGESTION_KEYS
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_array))?;
    let questions: Vec<String> = array
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect();
    (!questions.is_empty()).then_some(questions)
}

/// Where suggestions come from.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn fetch(&self, project_id: &str) -> Result<Value, ClientError>;
}

#[async_trait]
impl SuggestionSource for ProjectsClient {
    async fn fetch(&self, project_id: &str) -> Result<Value, ClientError> {
        self.suggestions(project_id).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SuggestionState {
    #[default]
    Idle,
    Loading,
    Ready(Vec<String>),
    /// The fetch failed; `fallback` holds the default questions.
    Failed { fallback: Vec<String>, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied(SuggestionState),
    /// The fetch was cancelled or overtaken by a newer one.
    Superseded,
}

#[derive(Debug)]
struct InFlight {
    project_id: String,
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    state: SuggestionState,
    selected: Option<String>,
    generation: u64,
    in_flight: Option<InFlight>,
    cache: HashMap<String, Vec<String>>,
}

impl Inner {
    fn cancel_in_flight(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            tracing::debug!(project_id = %flight.project_id, "cancelling suggestion fetch");
            flight.token.cancel();
        }
    }
}

pub struct SuggestionCache<S> {
    source: S,
    inner: Mutex<Inner>,
}

impl<S: SuggestionSource> SuggestionCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SuggestionState {
        self.inner().state.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.inner().selected.clone()
    }

    pub fn cached(&self, project_id: &str) -> Option<Vec<String>> {
        self.inner().cache.get(project_id).cloned()
    }

    /// Show suggestions for `project_id`, fetching only when nothing is cached.
    pub async fn open(&self, project_id: &str) -> FetchOutcome {
        {
            let mut inner = self.inner();
            if let Some(cached) = inner.cache.get(project_id).cloned() {
                inner.cancel_in_flight();
                inner.selected = Some(project_id.to_string());
                let state = SuggestionState::Ready(cached);
                inner.state = state.clone();
                return FetchOutcome::Applied(state);
            }
        }
        self.fetch(project_id).await
    }

    /// Fetch again even if a cached result exists.
    pub async fn retry(&self, project_id: &str) -> FetchOutcome {
        self.fetch(project_id).await
    }

    /// Change the selected project. A fetch for any other project is cancelled.
    pub fn select(&self, project_id: Option<&str>) {
        let mut inner = self.inner();
        let stale = inner
            .in_flight
            .as_ref()
            .is_some_and(|f| Some(f.project_id.as_str()) != project_id);
        if stale {
            inner.cancel_in_flight();
        }
        if inner.selected.as_deref() == project_id && !stale {
            return;
        }
        let next = match project_id.and_then(|id| inner.cache.get(id)) {
            Some(cached) => SuggestionState::Ready(cached.clone()),
            None if inner.in_flight.is_some() => SuggestionState::Loading,
            None => SuggestionState::Idle,
        };
        inner.selected = project_id.map(str::to_string);
        inner.state = next;
    }

    /// Cancel any in-flight fetch. A `Loading` state drops back to `Idle`.
    pub fn cancel(&self) {
        let mut inner = self.inner();
        inner.cancel_in_flight();
        if inner.state == SuggestionState::Loading {
            inner.state = SuggestionState::Idle;
        }
    }

    async fn fetch(&self, project_id: &str) -> FetchOutcome {
        let (token, generation) = {
            let mut inner = self.inner();
            inner.cancel_in_flight();
            inner.generation += 1;
            let generation = inner.generation;
            let token = CancellationToken::new();
            inner.in_flight = Some(InFlight {
                project_id: project_id.to_string(),
                generation,
                token: token.clone(),
            });
            inner.selected = Some(project_id.to_string());
            inner.state = SuggestionState::Loading;
            (token, generation)
        };

        let result = tokio::select! {
            () = token.cancelled() => return FetchOutcome::Superseded,
            result = self.source.fetch(project_id) => result,
        };

        let mut inner = self.inner();
        let current = inner
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation);
        if !current || token.is_cancelled() {
            return FetchOutcome::Superseded;
        }
        inner.in_flight = None;

        let state = match result {
            Ok(value) => match extract_suggestions(&value) {
                Some(questions) => {
                    inner.cache.insert(project_id.to_string(), questions.clone());
                    SuggestionState::Ready(questions)
                }
                None => {
                    tracing::warn!(project_id, "backend returned no suggestions");
                    SuggestionState::Failed {
                        fallback: default_suggestions(),
                        error: "Server returned no suggestions; using defaults.".to_string(),
                    }
                }
            },
            Err(e) => {
                tracing::warn!(project_id, error = %e, "failed to fetch suggestions");
                SuggestionState::Failed {
                    fallback: default_suggestions(),
                    error: format!("Could not load suggestions ({e}); using defaults."),
                }
            }
        };
        inner.state = state.clone();
        FetchOutcome::Applied(state)
    }
}
