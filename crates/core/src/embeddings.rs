use crate::error::ChatError;
use crate::hub::HubClient;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const DEFAULT_EMBEDDING_MODEL: &str = "hkunlp/instructor-xl";

const DOCUMENT_INSTRUCTION: &str = "Represent the document for retrieval: ";
const QUERY_INSTRUCTION: &str = "Represent the question for retrieving supporting documents: ";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError>;

    /// Embeds a question. Models trained with separate query instructions override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        self.embed(text).await
    }
}

/// Hashed character trigram embedder. Deterministic and offline.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                hash ^= *ch as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        Ok(self.vectorize(text))
    }
}

/// Feature-extraction embeddings served by the Hugging Face inference API.
/// Instructor models get their document and query instructions prepended.
#[derive(Debug, Clone)]
pub struct HuggingFaceEmbedder {
    hub: HubClient,
    model: String,
    instructed: bool,
}

impl HuggingFaceEmbedder {
    pub fn new(hub: HubClient, model: impl Into<String>) -> Self {
        let model = model.into();
        let instructed = model.contains("instructor");
        Self {
            hub,
            model,
            instructed,
        }
    }

    async fn request(&self, instruction: &str, text: &str) -> Result<Vec<f32>, ChatError> {
        let input = if self.instructed {
            format!("{instruction}{text}")
        } else {
            text.to_string()
        };

        let response = self
            .hub
            .post_json(
                &format!("pipeline/feature-extraction/{}", self.model),
                &json!({
                    "inputs": input,
                    "options": { "wait_for_model": true },
                }),
            )
            .await?;

        pool_embedding(&response).ok_or_else(|| {
            ChatError::Embedding(format!("{} returned no usable vector", self.model))
        })
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        self.request(DOCUMENT_INSTRUCTION, text).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        self.request(QUERY_INSTRUCTION, text).await
    }
}

/// Accepts a flat vector, a token matrix (mean pooled) or a batch of one.
fn pool_embedding(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    let first = items.first()?;

    if first.is_number() {
        return items
            .iter()
            .map(|item| item.as_f64().map(|number| number as f32))
            .collect();
    }

    if first.as_array().and_then(|row| row.first()).is_some_and(Value::is_array) {
        return pool_embedding(first);
    }

    let rows = items
        .iter()
        .map(pool_embedding)
        .collect::<Option<Vec<_>>>()?;
    let width = rows.first()?.len();
    if rows.iter().any(|row| row.len() != width) {
        return None;
    }

    let mut pooled = vec![0f32; width];
    for row in &rows {
        for (total, value) in pooled.iter_mut().zip(row) {
            *total += value;
        }
    }
    let count = rows.len() as f32;
    pooled.iter_mut().for_each(|value| *value /= count);
    Some(pooled)
}
