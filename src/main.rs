//! # foldertalk CLI (`ftalk`)
//!
//! The `ftalk` binary drives the indexing and chat pipeline from the
//! command line and can start the HTTP API.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ftalk init` | Create the SQLite database and run schema migrations |
//! | `ftalk index <folder>` | Index a folder into the vector store |
//! | `ftalk index <folder> --assistant` | Index a folder via the managed assistant |
//! | `ftalk chat <folder> "<message>"` | Send a chat turn about a folder |
//! | `ftalk search "<query>"` | Similarity-search indexed chunks |
//! | `ftalk history <chat-id>` | Print a chat transcript |
//! | `ftalk delete-chat <chat-id>` | Delete a chat and reset its folder |
//! | `ftalk serve api` | Start the JSON HTTP API |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file. See `config/ftalk.example.toml` for a full example.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use foldertalk::assistant::{AssistantApi, AssistantService, PineconeAssistantApi};
use foldertalk::chat::{ChatOrchestrator, ChatSettings};
use foldertalk::completion::{CompletionGateway, OpenAiCompletions};
use foldertalk::config::{self, Config};
use foldertalk::db;
use foldertalk::indexer::{
    FolderIndexer, IndexChunking, IndexReport, IndexStrategy, OutcomeStatus, Throttle,
};
use foldertalk::migrate;
use foldertalk::server::{self, AppContext};
use foldertalk::sources::{DocumentSource, FilesystemSource};
use foldertalk::sqlite_store::SqliteMetaStore;
use foldertalk::store::MetaStore;
use foldertalk::vector_index::{SearchOptions, VectorIndex};
use foldertalk::vector_store::{PineconeStore, VectorStore};

/// foldertalk CLI — retrieval-augmented chat over indexed document folders.
#[derive(Parser)]
#[command(
    name = "ftalk",
    about = "foldertalk — retrieval-augmented chat over indexed document folders",
    version,
    long_about = "foldertalk chunks and indexes a folder's documents into a per-user vector \
    store (or a managed document-assistant service) and answers questions grounded in that \
    folder's content, with source citations."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ftalk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Index a folder's documents.
    ///
    /// Lists the folder from the configured source, extracts and chunks
    /// each file, and indexes the chunks into the vector store. With
    /// `--assistant`, uploads the folder as size-bounded batches to the
    /// managed assistant instead.
    Index {
        /// Folder id relative to the source root (`.` for the root).
        folder: String,

        /// Upload to the managed assistant instead of the vector store.
        #[arg(long)]
        assistant: bool,
    },

    /// Send a chat message about a folder.
    ///
    /// Opens (or reuses) the folder's chat session and runs one turn of
    /// the chat protocol: managed assistant first, vector-search fallback
    /// when the assistant's terms are not accepted.
    Chat {
        /// Folder id (must be registered by a prior `index`).
        folder: String,

        /// The message to send.
        message: String,
    },

    /// Similarity-search indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Restrict results to one folder.
        #[arg(long)]
        folder: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a chat transcript, oldest message first.
    History {
        /// Chat UUID.
        chat_id: String,
    },

    /// Delete a chat and reset its folder to unindexed.
    DeleteChat {
        /// Chat UUID.
        chat_id: String,
    },

    /// Start the JSON HTTP API.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the HTTP API on the configured bind address.
    Api,
}

/// Everything a command needs, wired from config.
struct Runtime {
    store: Arc<dyn MetaStore>,
    vector_index: Arc<VectorIndex>,
    orchestrator: Arc<ChatOrchestrator>,
    indexer: Arc<FolderIndexer>,
}

async fn build_runtime(cfg: &Config) -> Result<Runtime> {
    let pool = db::connect(cfg).await?;
    let store: Arc<dyn MetaStore> = Arc::new(SqliteMetaStore::new(pool));

    let embeddings = foldertalk::embedding::create_gateway(&cfg.embedding)?;

    let vector_cfg = cfg
        .vector
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[vector] index_host not configured"))?;
    let vector_store: Arc<dyn VectorStore> = Arc::new(PineconeStore::new(vector_cfg)?);
    let vector_index = Arc::new(VectorIndex::new(vector_store, embeddings));

    let assistant_api: Arc<dyn AssistantApi> = Arc::new(PineconeAssistantApi::new(&cfg.assistant)?);
    let assistant = Arc::new(AssistantService::new(
        assistant_api,
        store.clone(),
        Duration::from_secs(cfg.assistant.readiness_delay_secs),
        cfg.batch.max_batch_bytes,
    ));

    let completions: Arc<dyn CompletionGateway> = Arc::new(OpenAiCompletions::new(&cfg.completion)?);

    let orchestrator = Arc::new(ChatOrchestrator::new(
        store.clone(),
        vector_index.clone(),
        completions,
        assistant.clone(),
        cfg.account.user_id.clone(),
        ChatSettings {
            history_limit: cfg.retrieval.history_limit,
            chat_top_k: cfg.retrieval.chat_top_k,
            min_score: cfg.retrieval.min_score,
        },
    ));

    let source_cfg = cfg
        .source
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[source] root not configured"))?;
    let source: Arc<dyn DocumentSource> = Arc::new(FilesystemSource::new(source_cfg)?);

    let indexer = Arc::new(FolderIndexer::new(
        store.clone(),
        source,
        vector_index.clone(),
        assistant,
        cfg.account.user_id.clone(),
        IndexChunking {
            target_tokens: cfg.chunking.target_tokens,
            overlap_tokens: cfg.chunking.overlap_tokens,
        },
        Throttle::new(Duration::from_millis(cfg.indexing.file_delay_ms)),
    ));

    Ok(Runtime {
        store,
        vector_index,
        orchestrator,
        indexer,
    })
}

fn print_report(report: &IndexReport) {
    println!("index {} ({})", report.folder_id, report.folder_name);
    println!("  files: {}", report.total_files);
    println!("  success: {}", report.success_count);
    println!("  errors: {}", report.error_count);
    println!("  status: {}", report.status.as_str());
    for outcome in &report.outcomes {
        if outcome.status != OutcomeStatus::Success {
            let detail = outcome.detail.as_deref().unwrap_or("");
            println!("  - {} [{:?}] {}", outcome.file_name, outcome.status, detail);
        }
    }
    println!("ok");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { folder, assistant } => {
            let runtime = build_runtime(&cfg).await?;
            let strategy = if assistant {
                IndexStrategy::AssistantBatch
            } else {
                IndexStrategy::PerFile
            };
            let report = runtime.indexer.index_folder(&folder, strategy).await?;
            print_report(&report);
        }
        Commands::Chat { folder, message } => {
            let runtime = build_runtime(&cfg).await?;

            let folder_record = runtime
                .store
                .get_folder(&folder)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Folder not found — run `ftalk index {}` first", folder))?;
            let chat = runtime.store.get_or_create_chat(&folder_record.id).await?;

            let reply = runtime
                .orchestrator
                .send_message(&message, &folder_record.id, &chat.id)
                .await?;

            println!("{}", reply.response);
            if !reply.citations.is_empty() {
                println!();
                println!("Sources:");
                for citation in &reply.citations {
                    println!(
                        "  [{:.2}] {} (chunk {})",
                        citation.score, citation.file_name, citation.chunk_index
                    );
                }
            }
            if let Some(fallback) = reply.fallback {
                eprintln!("(answered via {})", fallback);
            }
        }
        Commands::Search {
            query,
            folder,
            limit,
        } => {
            let runtime = build_runtime(&cfg).await?;
            let results = runtime
                .vector_index
                .search_similar(
                    &query,
                    &cfg.account.user_id,
                    &SearchOptions {
                        folder_id: folder,
                        top_k: limit.unwrap_or(cfg.retrieval.top_k),
                        min_score: cfg.retrieval.min_score,
                    },
                )
                .await?;

            if results.is_empty() {
                println!("No results.");
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {} (chunk {})",
                    i + 1,
                    result.score,
                    result.metadata.file_name,
                    result.metadata.chunk_index
                );
                println!(
                    "    excerpt: \"{}\"",
                    result
                        .metadata
                        .chunk_text
                        .chars()
                        .take(160)
                        .collect::<String>()
                        .replace('\n', " ")
                );
            }
        }
        Commands::History { chat_id } => {
            let runtime = build_runtime(&cfg).await?;
            let messages = runtime.store.recent_messages(&chat_id, 500).await?;
            if messages.is_empty() {
                println!("No messages.");
            } else {
                println!("{}", foldertalk::chat::format_transcript(&messages));
            }
        }
        Commands::DeleteChat { chat_id } => {
            let runtime = build_runtime(&cfg).await?;
            runtime.indexer.delete_chat(&chat_id).await?;
            println!("Chat deleted; folder reset to pending.");
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                let runtime = build_runtime(&cfg).await?;
                let ctx = AppContext {
                    store: runtime.store.clone(),
                    orchestrator: runtime.orchestrator.clone(),
                    indexer: runtime.indexer.clone(),
                };
                server::run_server(&cfg.server.bind, ctx).await?;
            }
        },
    }

    Ok(())
}
