//! # quarry-client
//!
//! Client side of the Quarry backend.
//!
//! - [`ProjectsClient`]: typed calls for every `/api/projects` route
//! - [`SuggestionCache`]: cancellable, per-project cache of suggested questions
//! - [`ChatSession`]: sequential prompts rendered into chat messages

pub mod api;
pub mod chat;
pub mod suggestions;

pub use api::{ClientError, ProjectsClient};
pub use chat::{ChatError, ChatMessage, ChatSession, InsightSource, Role};
pub use suggestions::{
    default_suggestions, extract_suggestions, FetchOutcome, SuggestionCache, SuggestionSource,
    SuggestionState, DEFAULT_SUGGESTIONS,
};
