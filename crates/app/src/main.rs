mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_chat_core::{
    discover_pdf_files, load_documents, AskOutcome, ChainOptions, CharacterNgramEmbedder,
    ChunkingConfig, Collaborators, Embedder, GenerationParams, HubClient, HuggingFaceEmbedder,
    HuggingFaceHubModel, LopdfExtractor, Session, SessionStore,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_HUB_ENDPOINT, DEFAULT_LLM_MODEL,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Hugging Face API token
    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    /// Hugging Face inference API base URL
    #[arg(long, env = "HUGGINGFACE_ENDPOINT", default_value = DEFAULT_HUB_ENDPOINT)]
    hf_endpoint: String,

    /// Embedding model id
    #[arg(long, env = "PDF_CHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Text generation model id
    #[arg(long, env = "PDF_CHAT_LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    llm_model: String,

    /// Use the local trigram embedder instead of the hosted embedding model.
    #[arg(long, default_value_t = false)]
    offline_embeddings: bool,

    #[arg(long, default_value_t = 0.9)]
    temperature: f32,

    #[arg(long, default_value_t = 512)]
    max_length: u32,

    /// Chunks retrieved per question.
    #[arg(long, default_value_t = 4)]
    top_k: usize,

    /// Most recent turns sent back to the model. Unset sends the whole history.
    #[arg(long)]
    history_window: Option<usize>,

    /// Answer follow-ups directly instead of rephrasing them first.
    #[arg(long, default_value_t = false)]
    no_condense: bool,

    /// Deadline for each extraction, embedding and completion call.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the chat page.
    Serve {
        #[arg(long, env = "PDF_CHAT_BIND", default_value = "127.0.0.1:8501")]
        bind: String,
        /// Largest accepted upload, in megabytes.
        #[arg(long, default_value_t = 50)]
        max_upload_mb: usize,
        /// Minutes a browser session may sit unused before it is dropped.
        #[arg(long, env = "PDF_CHAT_SESSION_IDLE_MINS", default_value_t = 30)]
        session_idle_mins: u64,
    },
    /// Read PDFs and answer questions in the terminal.
    Ask {
        /// PDF file, repeatable. Read in the given order.
        #[arg(long = "pdf")]
        pdfs: Vec<PathBuf>,
        /// Folder searched recursively for PDFs, read after --pdf files.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Question, repeatable. Asked in order within one conversation.
        #[arg(long = "question", required = true)]
        questions: Vec<String>,
        /// Print the retrieved chunks under each answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
}

impl Cli {
    fn collaborators(&self) -> anyhow::Result<Collaborators> {
        let timeout = Duration::from_secs(self.timeout_secs);
        let hub = HubClient::new(
            &self.hf_endpoint,
            self.hf_token.clone().unwrap_or_default(),
            timeout,
        )
        .context("set HUGGINGFACEHUB_API_TOKEN or pass --hf-token")?;

        let embedder: Arc<dyn Embedder> = if self.offline_embeddings {
            Arc::new(CharacterNgramEmbedder::default())
        } else {
            Arc::new(HuggingFaceEmbedder::new(hub.clone(), &self.embedding_model))
        };
        let llm = Arc::new(HuggingFaceHubModel::new(hub, &self.llm_model));

        let chunking = ChunkingConfig {
            separator: '\n',
            max_chars: self.chunk_size,
            overlap_chars: self.chunk_overlap,
        };
        chunking.validate()?;

        let chain = ChainOptions {
            top_k: self.top_k,
            history_window: self.history_window,
            condense_question: !self.no_condense,
            generation: GenerationParams {
                temperature: self.temperature,
                max_length: self.max_length,
            },
            call_timeout: timeout,
        };

        Ok(Collaborators::new(Arc::new(LopdfExtractor), embedder, llm)
            .with_chunking(chunking)
            .with_chain_options(chain))
    }
}

/// Fills unset variables from a `.env` file, `path` or the nearest one up the
/// working directory. Variables already in the environment win.
fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|_| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

fn upload_limit_bytes(megabytes: usize) -> usize {
    megabytes.saturating_mul(1024 * 1024)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let env_file = load_env_file(None);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    if let Some(path) = &env_file {
        info!(path = %path.display(), "loaded environment file");
    }

    let cli = Cli::parse();
    let collaborators = cli.collaborators()?;

    info!(
        version = app_version,
        embedding_model = collaborators.embedder.model_name(),
        llm_model = collaborators.llm.model_name(),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    match cli.command {
        Command::Serve {
            bind,
            max_upload_mb,
            session_idle_mins,
        } => {
            let idle_ttl = Duration::from_secs(session_idle_mins.saturating_mul(60));
            let state = server::AppState::new(SessionStore::with_idle_ttl(idle_ttl), collaborators);
            server::serve(&bind, state, upload_limit_bytes(max_upload_mb)).await?;
        }
        Command::Ask {
            pdfs,
            folder,
            questions,
            show_sources,
        } => {
            let mut paths = pdfs;
            if let Some(folder) = folder {
                let found = discover_pdf_files(&folder);
                if found.is_empty() {
                    warn!(folder = %folder.display(), "no pdf files found");
                }
                paths.extend(found);
            }

            let documents = load_documents(&paths)?;
            let mut session = Session::new(Uuid::new_v4());
            let report = session.build(&collaborators, documents).await?;
            println!(
                "{} document(s) read into {} chunk(s) at {}",
                report.document_count,
                report.chunk_count,
                report.built_at.to_rfc3339()
            );

            for question in questions {
                match session.ask(&question).await? {
                    AskOutcome::Answered(response) => {
                        println!("\nQ: {question}\nA: {}", response.answer);
                        if show_sources {
                            for source in &response.sources {
                                println!(
                                    "  [chunk {} score={:.4}] {}",
                                    source.position,
                                    source.score,
                                    source.text.replace('\n', " ")
                                );
                            }
                        }
                    }
                    AskOutcome::NoPipeline => {
                        warn!("no documents are loaded; skipping question");
                    }
                }
            }
        }
    }

    Ok(())
}
