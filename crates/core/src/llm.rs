use crate::error::ChatError;
use crate::hub::HubClient;
use crate::models::GenerationParams;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const DEFAULT_LLM_MODEL: &str = "google/flan-t5-large";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, ChatError>;
}

/// Hosted text generation through the Hugging Face inference API.
#[derive(Debug, Clone)]
pub struct HuggingFaceHubModel {
    hub: HubClient,
    repo_id: String,
}

impl HuggingFaceHubModel {
    pub fn new(hub: HubClient, repo_id: impl Into<String>) -> Self {
        Self {
            hub,
            repo_id: repo_id.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for HuggingFaceHubModel {
    fn model_name(&self) -> &str {
        &self.repo_id
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, ChatError> {
        let response = self
            .hub
            .post_json(
                &format!("models/{}", self.repo_id),
                &json!({
                    "inputs": prompt,
                    "parameters": {
                        "temperature": params.temperature,
                        "max_length": params.max_length,
                    },
                    "options": { "wait_for_model": true },
                }),
            )
            .await?;

        generated_text(&response, prompt).ok_or_else(|| ChatError::BackendResponse {
            backend: "huggingface".to_string(),
            details: format!("{} returned no generated_text", self.repo_id),
        })
    }
}

/// Pulls `generated_text` out of a list or object payload. Text-generation
/// models echo the prompt, which is stripped.
fn generated_text(response: &Value, prompt: &str) -> Option<String> {
    let entry = match response {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let text = entry.get("generated_text")?.as_str()?;
    let text = text.strip_prefix(prompt).unwrap_or(text);
    Some(text.trim().to_string())
}
