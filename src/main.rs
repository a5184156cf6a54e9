#![forbid(unsafe_code)]

//! `kbase-chat`: command-line client for a knowledge-base chat service.
//!
//! Streams answers to stdout with stage updates on stderr, browses stored
//! conversations, and resolves citations to local files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use kbase_chat::models::reference::{FragmentRecord, ReferenceDescriptor};
use kbase_chat::references::ReferenceResolver;
use kbase_chat::session::render::{RenderSink, RenderSnapshot};
use kbase_chat::session::state::{SessionOutcome, Stage};
use kbase_chat::session::Orchestrator;
use kbase_chat::{AppError, ClientConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "kbase-chat", about = "Knowledge-base chat client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask a question and stream the answer. Ctrl-C stops the answer.
    Ask {
        /// The question.
        question: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation_id: Option<i64>,
    },
    /// Browse stored conversations.
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },
    /// Resolve a citation to a local file.
    Cite {
        /// JSON file with the answer's citation list.
        #[arg(long)]
        references: PathBuf,
        /// JSON file with the retrieved fragments.
        #[arg(long)]
        fragments: Option<PathBuf>,
        /// Which citation to resolve.
        #[arg(long, default_value_t = 0)]
        index: usize,
        /// Position of the clicked fragment in the fragments file.
        #[arg(long)]
        preferred: Option<usize>,
    },
}

#[derive(Debug, Subcommand)]
enum ConversationAction {
    /// List conversations.
    List,
    /// Show one conversation with its messages.
    Show {
        /// Conversation id.
        id: i64,
    },
    /// Delete one conversation.
    Delete {
        /// Conversation id.
        id: i64,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = ClientConfig::load_from_path(&args.config)?;
    info!(base_url = %config.server.base_url, "configuration loaded");

    match args.command {
        Command::Ask {
            question,
            conversation_id,
        } => {
            config.load_credentials().await?;
            ask(config, &question, conversation_id).await
        }
        Command::Conversations { action } => conversations(config, action).await,
        Command::Cite {
            references,
            fragments,
            index,
            preferred,
        } => cite(&config, &references, fragments.as_deref(), index, preferred),
    }
}

async fn ask(config: ClientConfig, question: &str, conversation_id: Option<i64>) -> Result<()> {
    if question.trim().is_empty() {
        return Err(AppError::Config("question must not be empty".into()));
    }

    let orchestrator = Orchestrator::from_config(config)?;
    let turn = orchestrator.begin(question, conversation_id)?;

    let abort = turn.abort_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping answer");
            abort.abort();
        }
    });

    let renderer = TerminalRenderer::default();
    let result = turn.run(&renderer).await;
    ctrl_c.abort();
    println!();

    match &result.outcome {
        SessionOutcome::Completed => {}
        SessionOutcome::NoContent => eprintln!("(no content produced)"),
        SessionOutcome::Aborted => eprintln!("(answer stopped)"),
        SessionOutcome::Failed { message } => eprintln!("answer failed: {message}"),
    }
    if let Some(id) = result.conversation_id {
        eprintln!("conversation {id}");
    }
    Ok(())
}

async fn conversations(config: ClientConfig, action: ConversationAction) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let store = orchestrator.store();

    match action {
        ConversationAction::List => {
            for conversation in store.list_conversations().await? {
                let id = conversation
                    .id
                    .map_or_else(|| "-".to_owned(), |id| id.to_string());
                println!(
                    "{id}\t{}\t{}",
                    conversation.updated_at.as_deref().unwrap_or(""),
                    conversation.title
                );
            }
        }
        ConversationAction::Show { id } => {
            let detail = store.get_conversation(id).await?;
            println!("# {}", detail.conversation.title);
            for message in &detail.messages {
                println!("\n[{:?}] {}", message.role, message.content);
            }
        }
        ConversationAction::Delete { id } => {
            store.delete_conversation(id).await?;
            println!("deleted conversation {id}");
        }
    }
    Ok(())
}

fn cite(
    config: &ClientConfig,
    references: &Path,
    fragments: Option<&Path>,
    index: usize,
    preferred: Option<usize>,
) -> Result<()> {
    let descriptors: Vec<ReferenceDescriptor> = read_json(references)?;
    let descriptor = descriptors
        .get(index)
        .ok_or_else(|| AppError::NotFound(format!("citation {index}")))?;
    let fragments: Vec<FragmentRecord> = match fragments {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let preferred = match preferred {
        Some(position) => Some(
            fragments
                .get(position)
                .ok_or_else(|| AppError::NotFound(format!("fragment {position}")))?,
        ),
        None => None,
    };

    let resolver = ReferenceResolver::from_config(&config.references);
    let matched = resolver.match_fragments(descriptor, &fragments, preferred);
    let target = resolver.resolve_target(descriptor, &matched)?;

    println!("{}", target.path.display());
    if let Some(fragment) = &target.fragment {
        println!("fragment {}", fragment.fragment_index);
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Prints the growing answer to stdout and stage changes to stderr.
#[derive(Default)]
struct TerminalRenderer {
    state: Mutex<RenderState>,
}

#[derive(Default)]
struct RenderState {
    printed: String,
    stage: Stage,
}

impl RenderSink for TerminalRenderer {
    fn render(&self, snapshot: &RenderSnapshot) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if snapshot.stage != state.stage && !snapshot.stage.message.is_empty() {
            eprintln!(
                "[{}] {}",
                snapshot.stage.step.as_deref().unwrap_or("stage"),
                snapshot.stage.message
            );
            state.stage = snapshot.stage.clone();
        }

        let content = snapshot.content.as_str();
        let fresh = match content.strip_prefix(state.printed.as_str()) {
            Some(rest) => rest.to_owned(),
            // Replaced rather than extended (final content or error text).
            None => format!("\n{content}"),
        };
        if fresh.is_empty() {
            return;
        }
        state.printed = content.to_owned();

        let mut stdout = std::io::stdout().lock();
        if let Err(err) = stdout.write_all(fresh.as_bytes()).and_then(|()| stdout.flush()) {
            warn!(%err, "failed to write answer to stdout");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
