//! LLM provider abstraction
//!
//! The loops talk to the model through [`LlmClient`]: one method per prompt
//! function (act planning, chunked extraction, observation, completion
//! verification). [`OpenAiClient`] is the shipped implementation; tests mock
//! the trait.

mod cache;
mod openai;
mod prompts;

pub use cache::LlmCache;
pub use openai::OpenAiClient;
pub(crate) use prompts::DEFAULT_OBSERVE_INSTRUCTION;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// When the act loop attaches a screenshot to planning calls.
///
/// `Fallback` plans text-only first and replays the last chunk with a
/// screenshot once chunked planning yields no actionable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisionPolicy {
    Off,
    On,
    #[default]
    Fallback,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Request for the next elementary UI command.
#[derive(Debug, Clone)]
pub struct ActPlanRequest {
    pub action: String,
    pub dom_elements: String,
    pub steps: String,
    pub screenshot: Option<Vec<u8>>,
    pub model: String,
    pub request_id: String,
}

/// One elementary UI command chosen by the model, or nothing — the planner
/// returns `None` when the current chunk holds no actionable element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActCommand {
    pub element: u64,
    pub method: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    pub step: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub instruction: String,
    pub progress: String,
    pub previously_extracted: serde_json::Value,
    pub dom_elements: String,
    pub schema: serde_json::Value,
    pub chunks_seen: usize,
    pub chunks_total: usize,
    pub model: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractMetadata {
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub completed: bool,
}

/// Extraction result: bookkeeping metadata plus the schema-shaped fields
/// themselves, which become the new partial value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOutcome {
    pub metadata: ExtractMetadata,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ObserveRequest {
    pub instruction: String,
    pub dom_elements: String,
    pub screenshot: Option<Vec<u8>>,
    pub model: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedElement {
    #[serde(rename = "elementId")]
    pub element_id: u64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub goal: String,
    pub steps: String,
    pub screenshot: Option<Vec<u8>>,
    pub dom_elements: Option<String>,
    pub model: String,
    pub request_id: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn supports_vision(&self, model: &str) -> bool;

    /// Plan the next UI command for the current chunk; `None` means no
    /// actionable element here.
    async fn plan_act(&self, request: ActPlanRequest) -> LlmResult<Option<ActCommand>>;

    async fn extract(&self, request: ExtractRequest) -> LlmResult<ExtractOutcome>;

    async fn observe(&self, request: ObserveRequest) -> LlmResult<Vec<ObservedElement>>;

    /// Cross-check a claimed completion against an independent view of the
    /// page (screenshot or full DOM).
    async fn verify_act_completion(&self, request: VerifyRequest) -> LlmResult<bool>;

    /// Drop any cached responses belonging to `request_id`. Called by the
    /// façade when a request fails.
    fn evict_request_cache(&self, _request_id: &str) {}
}
