use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One uploaded file, kept only for the duration of a build.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turn log. Only complete question/answer exchanges are recorded, so
/// the log always alternates user, assistant, user, ...
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn::user(question));
        self.turns.push(Turn::assistant(answer));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent `window` turns, or everything when `window` is `None`.
    /// The cut never starts on an assistant turn.
    pub fn recent(&self, window: Option<usize>) -> &[Turn] {
        let Some(window) = window else {
            return &self.turns;
        };
        let mut start = self.turns.len().saturating_sub(window);
        if start % 2 == 1 {
            start += 1;
        }
        &self.turns[start.min(self.turns.len())..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub position: usize,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_length: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            max_length: 512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainOptions {
    pub top_k: usize,
    /// Number of most recent turns resubmitted to the model; `None` sends all of them.
    pub history_window: Option<usize>,
    pub condense_question: bool,
    pub generation: GenerationParams,
    pub call_timeout: Duration,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            history_window: None,
            condense_question: true,
            generation: GenerationParams::default(),
            call_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub document_count: usize,
    pub raw_chars: usize,
    pub chunk_count: usize,
    pub checksums: Vec<String>,
    pub built_at: DateTime<Utc>,
}
