//! OpenAI-compatible chat-completions client
//!
//! Speaks the `/chat/completions` wire shape over rustls, so it also works
//! against self-hosted gateways that mimic it. Screenshots ride along as
//! base64 data URLs for vision-capable models.

use base64::Engine;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::cache::LlmCache;
use super::prompts::{
    ACT_SYSTEM_PROMPT, EXTRACT_SYSTEM_PROMPT, OBSERVE_SYSTEM_PROMPT, VERIFY_SYSTEM_PROMPT,
};
use super::{
    ActCommand, ActPlanRequest, ExtractOutcome, ExtractRequest, LlmClient, LlmError, LlmResult,
    ObserveRequest, ObservedElement, VerifyRequest,
};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model-name prefixes that accept image content parts.
const VISION_MODEL_PREFIXES: &[&str] = &["gpt-4o", "gpt-4-turbo", "gpt-4.1", "o3", "o4"];

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    cache: LlmCache,
    caching_enabled: bool,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache: LlmCache::new(),
            caching_enabled: false,
        }
    }

    /// Point at an OpenAI-compatible gateway instead of api.openai.com.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// One chat round-trip, returning the assistant message content.
    async fn chat(&self, request_id: &str, body: Value) -> LlmResult<String> {
        let key = LlmCache::digest(&body);
        if self.caching_enabled
            && let Some(hit) = self.cache.get(&key)
        {
            debug!(request_id, "LLM cache hit");
            return Ok(hit.as_str().unwrap_or_default().to_string());
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LlmError::MalformedResponse("response carries no message content".to_string())
            })?
            .to_string();

        if self.caching_enabled {
            self.cache.put(request_id, key, Value::String(content.clone()));
        }
        Ok(content)
    }

    fn request_body(
        &self,
        model: &str,
        system_prompt: &str,
        user_text: String,
        screenshot: Option<Vec<u8>>,
    ) -> Value {
        let user_content = match screenshot {
            None => json!(user_text),
            Some(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                json!([
                    { "type": "text", "text": user_text },
                    { "type": "image_url", "image_url": { "url": format!("data:image/png;base64,{encoded}") } },
                ])
            }
        };

        json!({
            "model": model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content },
            ],
        })
    }
}

/// Strip a Markdown code fence if the model wrapped its JSON in one.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn supports_vision(&self, model: &str) -> bool {
        VISION_MODEL_PREFIXES
            .iter()
            .any(|prefix| model.starts_with(prefix))
    }

    async fn plan_act(&self, request: ActPlanRequest) -> LlmResult<Option<ActCommand>> {
        let user_text = format!(
            "Goal: {}\n\nSteps taken so far:\n{}\n\nPage elements:\n{}",
            request.action, request.steps, request.dom_elements
        );
        let body = self.request_body(
            &request.model,
            ACT_SYSTEM_PROMPT,
            user_text,
            request.screenshot,
        );
        let content = self.chat(&request.request_id, body).await?;

        let parsed: Value = serde_json::from_str(strip_code_fences(&content))
            .map_err(|e| LlmError::MalformedResponse(format!("{e}: {content}")))?;
        if parsed.is_null() {
            return Ok(None);
        }
        let command: ActCommand = serde_json::from_value(parsed)
            .map_err(|e| LlmError::MalformedResponse(format!("{e}: {content}")))?;
        Ok(Some(command))
    }

    async fn extract(&self, request: ExtractRequest) -> LlmResult<ExtractOutcome> {
        let user_text = format!(
            "Instruction: {}\n\nSchema:\n{}\n\nProgress so far: {}\nSections processed: {} of {}\n\nPreviously extracted value:\n{}\n\nElements of this section:\n{}",
            request.instruction,
            request.schema,
            request.progress,
            request.chunks_seen,
            request.chunks_total,
            request.previously_extracted,
            request.dom_elements,
        );
        let body = self.request_body(&request.model, EXTRACT_SYSTEM_PROMPT, user_text, None);
        let content = self.chat(&request.request_id, body).await?;

        serde_json::from_str(strip_code_fences(&content))
            .map_err(|e| LlmError::MalformedResponse(format!("{e}: {content}")))
    }

    async fn observe(&self, request: ObserveRequest) -> LlmResult<Vec<ObservedElement>> {
        #[derive(Deserialize)]
        struct Envelope {
            elements: Vec<ObservedElement>,
        }

        let user_text = format!(
            "Instruction: {}\n\nPage elements:\n{}",
            request.instruction, request.dom_elements
        );
        let body = self.request_body(
            &request.model,
            OBSERVE_SYSTEM_PROMPT,
            user_text,
            request.screenshot,
        );
        let content = self.chat(&request.request_id, body).await?;

        let envelope: Envelope = serde_json::from_str(strip_code_fences(&content))
            .map_err(|e| LlmError::MalformedResponse(format!("{e}: {content}")))?;
        Ok(envelope.elements)
    }

    async fn verify_act_completion(&self, request: VerifyRequest) -> LlmResult<bool> {
        let view = match &request.dom_elements {
            Some(elements) => format!("Page elements:\n{elements}"),
            None => "See the attached screenshot.".to_string(),
        };
        let user_text = format!(
            "Goal: {}\n\nClaimed steps:\n{}\n\n{}",
            request.goal, request.steps, view
        );
        let body = self.request_body(
            &request.model,
            VERIFY_SYSTEM_PROMPT,
            user_text,
            request.screenshot,
        );
        let content = self.chat(&request.request_id, body).await?;

        serde_json::from_str::<bool>(strip_code_fences(&content))
            .map_err(|e| LlmError::MalformedResponse(format!("{e}: {content}")))
    }

    fn evict_request_cache(&self, request_id: &str) {
        self.cache.evict_request(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\ntrue\n```"), "true");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn vision_support_is_prefix_based() {
        let client = OpenAiClient::new("test-key");
        assert!(client.supports_vision("gpt-4o"));
        assert!(client.supports_vision("gpt-4o-mini"));
        assert!(!client.supports_vision("gpt-3.5-turbo"));
    }
}
