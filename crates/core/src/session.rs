//! Per-session state: at most one conversation chain and its history.
//!
//! A [`Session`] is replaced wholesale on a successful build and left alone on
//! a failed one, so a broken upload never costs the user a working chat.

use crate::chunking::{ChunkingConfig, TextSplitter};
use crate::conversation::{ChainResponse, ConversationChain};
use crate::embeddings::Embedder;
use crate::error::{ChatError, IngestError};
use crate::extractor::{extract_text, PdfExtractor};
use crate::index::{build_index, VectorIndex};
use crate::ingest::digest_bytes;
use crate::llm::LanguageModel;
use crate::models::{BuildReport, ChainOptions, Turn, UploadedDocument};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The external services a build wires together.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn PdfExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub chunking: ChunkingConfig,
    pub chain: ChainOptions,
}

impl Collaborators {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            llm,
            chunking: ChunkingConfig::default(),
            chain: ChainOptions::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_chain_options(mut self, chain: ChainOptions) -> Self {
        self.chain = chain;
        self
    }
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    chain: Option<ConversationChain>,
    last_build: Option<BuildReport>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            chain: None,
            last_build: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_ready(&self) -> bool {
        self.chain.is_some()
    }

    pub fn last_build(&self) -> Option<&BuildReport> {
        self.last_build.as_ref()
    }

    pub fn chain(&self) -> Option<&ConversationChain> {
        self.chain.as_ref()
    }

    pub fn history(&self) -> &[Turn] {
        self.chain
            .as_ref()
            .map(|chain| chain.history().turns())
            .unwrap_or_default()
    }

    /// Extracts, chunks and indexes `documents` into a fresh chain. Every call
    /// starts from scratch. The current chain is only replaced on success.
    pub async fn build(
        &mut self,
        collaborators: &Collaborators,
        documents: Vec<UploadedDocument>,
    ) -> Result<BuildReport, ChatError> {
        match self.rebuild(collaborators, documents).await {
            Ok((chain, report)) => {
                info!(
                    session = %self.id,
                    documents = report.document_count,
                    chars = report.raw_chars,
                    chunks = report.chunk_count,
                    "session rebuilt"
                );
                self.chain = Some(chain);
                self.last_build = Some(report.clone());
                Ok(report)
            }
            Err(error) => {
                warn!(
                    session = %self.id,
                    kept_previous = self.chain.is_some(),
                    %error,
                    "build failed"
                );
                Err(error)
            }
        }
    }

    async fn rebuild(
        &self,
        collaborators: &Collaborators,
        documents: Vec<UploadedDocument>,
    ) -> Result<(ConversationChain, BuildReport), ChatError> {
        if documents.is_empty() {
            let message = "no pdf documents were uploaded".to_string();
            return Err(IngestError::InvalidArgument(message).into());
        }

        let splitter = TextSplitter::new(collaborators.chunking)?;
        let call_timeout = collaborators.chain.call_timeout;
        let document_count = documents.len();
        let checksums = documents
            .iter()
            .map(|document| digest_bytes(&document.bytes))
            .collect::<Vec<_>>();

        let extractor = Arc::clone(&collaborators.extractor);
        let extraction =
            tokio::task::spawn_blocking(move || extract_text(extractor.as_ref(), &documents));
        let raw_text = match tokio::time::timeout(call_timeout, extraction).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                let message = format!("extraction task failed: {join_error}");
                return Err(IngestError::PdfParse(message).into());
            }
            Err(_) => return Err(IngestError::Timeout(call_timeout.as_secs()).into()),
        };

        let chunks = splitter.split_text(&raw_text);
        if chunks.is_empty() {
            return Err(IngestError::InvalidArgument(
                "uploaded documents contain no extractable text".to_string(),
            )
            .into());
        }

        let index = build_index(collaborators.embedder.as_ref(), &chunks, call_timeout).await?;
        let report = BuildReport {
            document_count,
            raw_chars: raw_text.chars().count(),
            chunk_count: index.len(),
            checksums,
            built_at: Utc::now(),
        };

        let chain = ConversationChain::new(
            index,
            Arc::clone(&collaborators.embedder),
            Arc::clone(&collaborators.llm),
            collaborators.chain.clone(),
        );
        Ok((chain, report))
    }

    /// Forwards to the active chain. Without one nothing happens.
    pub async fn ask(&mut self, question: &str) -> Result<AskOutcome, ChatError> {
        let Some(chain) = self.chain.as_mut() else {
            return Ok(AskOutcome::NoPipeline);
        };

        match chain.respond(question).await {
            Ok(response) => {
                info!(
                    session = %self.id,
                    sources = response.sources.len(),
                    turns = chain.history().len(),
                    "question answered"
                );
                Ok(AskOutcome::Answered(response))
            }
            Err(error) => {
                warn!(session = %self.id, %error, "ask failed");
                Err(error)
            }
        }
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

struct StoredSession {
    session: SharedSession,
    last_seen: Instant,
}

/// All live sessions. Holding a session's mutex for a whole build or ask
/// keeps actions on the same session strictly one at a time.
///
/// Sessions untouched for longer than the idle ttl are dropped by
/// [`SessionStore::evict_idle`], which also runs whenever a session is created.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, StoredSession>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_SESSION_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            idle_ttl,
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|stored| Arc::clone(&stored.session))
    }

    /// Returns the session for `id` and marks it active. Unknown or absent ids
    /// get a new session under a freshly generated id; client-chosen ids are
    /// never adopted.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SharedSession) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        if let Some(id) = id {
            if let Some(stored) = sessions.get_mut(&id) {
                stored.last_seen = now;
                return (id, Arc::clone(&stored.session));
            }
        }

        let evicted = Self::sweep(&mut sessions, now, self.idle_ttl);
        if evicted > 0 {
            debug!(evicted, "idle sessions dropped");
        }

        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(Session::new(id)));
        sessions.insert(
            id,
            StoredSession {
                session: Arc::clone(&session),
                last_seen: now,
            },
        );
        (id, session)
    }

    /// Drops sessions idle for longer than the ttl and returns how many went.
    /// A session someone still holds a handle to is kept.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        Self::sweep(&mut sessions, Instant::now(), self.idle_ttl)
    }

    fn sweep(
        sessions: &mut HashMap<Uuid, StoredSession>,
        now: Instant,
        idle_ttl: Duration,
    ) -> usize {
        let before = sessions.len();
        sessions.retain(|_, stored| {
            Arc::strong_count(&stored.session) > 1
                || now.saturating_duration_since(stored.last_seen) <= idle_ttl
        });
        before - sessions.len()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug, Clone)]
pub enum AskOutcome {
    Answered(ChainResponse),
    /// No successful build yet; nothing was changed.
    NoPipeline,
}

impl AskOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            AskOutcome::Answered(response) => Some(&response.answer),
            AskOutcome::NoPipeline => None,
        }
    }
}
