pub mod chunking;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod hub;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod render;
pub mod session;

pub use chunking::{chunk_text, ChunkSpan, ChunkingConfig, TextSplitter};
pub use conversation::{ChainResponse, ConversationChain};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HuggingFaceEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{ChatError, IngestError};
pub use extractor::{extract_text, LopdfExtractor, PageText, PdfExtractor};
pub use hub::{HubClient, DEFAULT_HUB_ENDPOINT};
pub use index::{build_index, InMemoryIndex, VectorIndex};
pub use ingest::{digest_bytes, discover_pdf_files, load_documents};
pub use llm::{HuggingFaceHubModel, LanguageModel, DEFAULT_LLM_MODEL};
pub use models::{
    BuildReport, ChainOptions, ChatHistory, GenerationParams, RetrievedChunk, Role, Turn,
    UploadedDocument,
};
pub use render::{render_page, Notice, PageView};
pub use session::{
    AskOutcome, Collaborators, Session, SessionStore, SharedSession, DEFAULT_SESSION_IDLE_TTL,
};
