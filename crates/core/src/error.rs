use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("pdf extraction timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("question is empty")]
    EmptyQuestion,

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("missing credentials: {0}")]
    MissingCredentials(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Runs a collaborator call under a deadline.
pub(crate) async fn bounded<T, F>(
    operation: &str,
    limit: std::time::Duration,
    call: F,
) -> std::result::Result<T, ChatError>
where
    F: std::future::Future<Output = std::result::Result<T, ChatError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Timeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}
