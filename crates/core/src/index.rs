use crate::embeddings::Embedder;
use crate::error::{bounded, ChatError};
use crate::models::RetrievedChunk;
use std::time::Duration;

/// Read side of a similarity index. Built indexes are never modified.
pub trait VectorIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, ChatError>;
}

struct IndexedChunk {
    vector: Vec<f32>,
    text: String,
}

/// Brute-force cosine index held in memory.
#[derive(Default)]
pub struct InMemoryIndex {
    dimensions: Option<usize>,
    entries: Vec<IndexedChunk>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vector: Vec<f32>, text: impl Into<String>) -> Result<(), ChatError> {
        let expected = *self.dimensions.get_or_insert(vector.len());
        if vector.len() != expected {
            return Err(ChatError::Index(format!(
                "embedding dimension {} != {}",
                vector.len(),
                expected
            )));
        }

        self.entries.push(IndexedChunk {
            vector,
            text: text.into(),
        });
        Ok(())
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.text.as_str())
    }
}

impl VectorIndex for InMemoryIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, ChatError> {
        let Some(dimensions) = self.dimensions else {
            return Ok(Vec::new());
        };
        if query_vector.len() != dimensions {
            return Err(ChatError::Index(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                dimensions
            )));
        }

        let mut hits: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| RetrievedChunk {
                position,
                score: cosine_similarity(query_vector, &entry.vector),
                text: entry.text.clone(),
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.position.cmp(&right.position))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();
    if left_norm < f32::EPSILON || right_norm < f32::EPSILON {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

/// Embeds every chunk and inserts it into a fresh index. The first failure
/// aborts the build; no partial index is returned.
pub async fn build_index(
    embedder: &dyn Embedder,
    chunks: &[String],
    call_timeout: Duration,
) -> Result<InMemoryIndex, ChatError> {
    let mut index = InMemoryIndex::new();

    for (position, chunk) in chunks.iter().enumerate() {
        let vector = bounded("embedding", call_timeout, embedder.embed(chunk)).await?;
        if vector.is_empty() {
            return Err(ChatError::Embedding(format!(
                "{} returned an empty vector for chunk {position}",
                embedder.model_name()
            )));
        }
        index.insert(vector, chunk.clone())?;
    }

    tracing::debug!(
        model = embedder.model_name(),
        entries = index.len(),
        "vector index built"
    );
    Ok(index)
}
