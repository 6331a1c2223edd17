//! # Problem Pal CLI (`pal`)
//!
//! The `pal` binary is the primary interface for Problem Pal. It provides
//! commands for database initialization, response-stream watching, context
//! inspection, chat and similarity round-trips, corpus indexing, and the
//! two companion servers.
//!
//! ## Usage
//!
//! ```bash
//! pal --config ./config/pal.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pal init` | Create the SQLite database and run schema migrations |
//! | `pal watch` | Consume intercepted-response events from stdin |
//! | `pal context show` | Print the resident problem context |
//! | `pal context clear` | Drop the resident problem context |
//! | `pal kv set/get/list` | Inspect the mirrored page storage |
//! | `pal code <id>` | Recover the user's saved code for a problem |
//! | `pal ask "<question>"` | Chat round-trip through the assist server |
//! | `pal history` | Stored conversation for the open problem |
//! | `pal find "<text>"` | Similarity search by free text |
//! | `pal similar` | Similarity search for the open problem |
//! | `pal index` | Build the search corpus (`--file` dump or `--fetch`) |
//! | `pal serve assist` | Start the chat/history server |
//! | `pal serve search` | Start the similarity server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use problem_pal::config;
use problem_pal::panel::{ChatPanel, PanelEvent, SearchAction, SearchPanel};
use problem_pal::relay::{self, AssistRelay, SearchRelay};
use problem_pal::{
    assist_server, db, indexer, intercept, migrate, search_server, store, user_code,
};

/// Problem Pal — a local-first assistant sidecar for coding-problem sites.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pal.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pal",
    about = "Problem Pal — a local-first assistant sidecar for coding-problem sites",
    version,
    long_about = "Problem Pal watches intercepted page responses for problem metadata, keeps the \
    problem currently open as a resident context, and relays questions and similarity searches to \
    its companion servers: an AI chat proxy with persisted conversations and a vector search \
    service over the indexed problem corpus."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (kv, users,
    /// conversations, messages, problems, problem_vectors). Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Consume the intercepted-response stream from stdin.
    ///
    /// Reads one JSON event per line, keeps those whose URL matches the
    /// configured patterns, and makes the extracted problem context
    /// resident. Runs until EOF; malformed events are reported and skipped.
    Watch,

    /// Inspect or drop the resident problem context.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Inspect the mirrored page-local storage.
    Kv {
        #[command(subcommand)]
        action: KvAction,
    },

    /// Recover the user's saved code for a problem.
    ///
    /// Scans the mirrored page storage for the first key embedding the
    /// problem id and prints its value.
    Code {
        /// Problem id.
        id: u64,
    },

    /// Ask a question about the open problem.
    ///
    /// Requires a resident context and a resolvable user name; fails fast
    /// with no network call otherwise. Prior conversation for the same
    /// (user, problem) pair is rendered above the new exchange.
    Ask {
        /// The question to send.
        query: String,
    },

    /// Print the stored conversation for the open problem.
    History,

    /// Similarity search by free text.
    Find {
        /// Keywords to find related problems for.
        query: String,

        /// Number of matches to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Similarity search for the problem currently open.
    ///
    /// Uses the resident context's id against the already-indexed vector,
    /// the same lookup the search panel auto-triggers when a context
    /// becomes resident.
    Similar {
        /// Number of matches to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Build or refresh the similarity-search corpus.
    ///
    /// Embeds every problem's prepared text and stores the vectors.
    /// Problems whose text is unchanged since the last run are skipped.
    Index {
        /// Read problems from a local JSON dump (array of detail payloads).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Fetch the problem set from the site API. Requires
        /// PROBLEM_SITE_TOKEN in the environment.
        #[arg(long)]
        fetch: bool,
    },

    /// Start a companion server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum ContextAction {
    /// Print the resident context as pretty JSON.
    Show,
    /// Drop the resident context.
    Clear,
}

#[derive(Subcommand)]
enum KvAction {
    /// Set a key (mirroring a page-local storage entry).
    Set { key: String, value: String },
    /// Print one value.
    Get { key: String },
    /// List all keys in enumeration order.
    List,
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// The chat/history server (POST /query, GET /history).
    Assist,
    /// The similarity server (POST /query, POST /queryById).
    Search,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Watch => {
            let pool = db::connect(&cfg.db.path).await?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let stats = intercept::watch_stream(&cfg.intercept, &pool, stdin).await?;
            println!("watch");
            println!("  events: {}", stats.events);
            println!("  contexts stored: {}", stats.stored);
            println!("  skipped: {}", stats.skipped);
            println!("  failures: {}", stats.failures);
            pool.close().await;
        }
        Commands::Context { action } => {
            let pool = db::connect(&cfg.db.path).await?;
            match action {
                ContextAction::Show => match store::load_context(&pool).await? {
                    Some(ctx) => println!("{}", serde_json::to_string_pretty(&ctx)?),
                    None => println!("No context available."),
                },
                ContextAction::Clear => {
                    store::clear_context(&pool).await?;
                    println!("Context cleared.");
                }
            }
            pool.close().await;
        }
        Commands::Kv { action } => {
            let pool = db::connect(&cfg.db.path).await?;
            match action {
                KvAction::Set { key, value } => {
                    store::kv_set(&pool, &key, &value).await?;
                    println!("ok");
                }
                KvAction::Get { key } => match store::kv_get(&pool, &key).await? {
                    Some(value) => println!("{}", value),
                    None => println!("(not set)"),
                },
                KvAction::List => {
                    for (key, _) in store::kv_entries(&pool).await? {
                        println!("{}", key);
                    }
                }
            }
            pool.close().await;
        }
        Commands::Code { id } => {
            let pool = db::connect(&cfg.db.path).await?;
            match user_code::lookup_user_code(&pool, id).await? {
                Some(code) => println!("{}", code),
                None => println!("No saved code found for problem {}.", id),
            }
            pool.close().await;
        }
        Commands::Ask { query } => {
            let pool = db::connect(&cfg.db.path).await?;
            run_ask(&cfg, &pool, &query).await;
            pool.close().await;
        }
        Commands::History => {
            let pool = db::connect(&cfg.db.path).await?;
            run_history(&cfg, &pool).await;
            pool.close().await;
        }
        Commands::Find { query, top_k } => {
            let relay = SearchRelay::new(&cfg.client.search_url);
            let mut panel = SearchPanel::new();
            panel.handle(PanelEvent::OpenButton);
            if let Some(action) = panel.begin_query(&query) {
                execute_search(&relay, &mut panel, action, top_k.unwrap_or(cfg.search.top_k))
                    .await;
            }
            print_lines(&panel.render_lines());
        }
        Commands::Similar { top_k } => {
            let pool = db::connect(&cfg.db.path).await?;
            let relay = SearchRelay::new(&cfg.client.search_url);
            let mut panel = SearchPanel::new();
            panel.handle(PanelEvent::OpenButton);
            match store::load_context(&pool).await? {
                Some(ctx) => {
                    if let Some(action) = panel.on_context_resident(&ctx) {
                        execute_search(
                            &relay,
                            &mut panel,
                            action,
                            top_k.unwrap_or(cfg.search.top_k),
                        )
                        .await;
                    }
                }
                None => println!("No context available."),
            }
            print_lines(&panel.render_lines());
            pool.close().await;
        }
        Commands::Index { file, fetch } => {
            let source = match (file, fetch) {
                (Some(path), false) => indexer::IndexSource::File(path),
                (None, true) => indexer::IndexSource::Fetch,
                _ => anyhow::bail!("Pass exactly one of --file <path> or --fetch."),
            };
            indexer::run_index(&cfg, source).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Assist => {
                assist_server::run_assist_server(&cfg).await?;
            }
            ServeService::Search => {
                search_server::run_search_server(&cfg).await?;
            }
        },
    }

    Ok(())
}

/// One chat round-trip through the chat panel: hydrate stored history,
/// append the question, send it, render the reply or the error. Every
/// failure ends up as a chat line, never a crash.
async fn run_ask(cfg: &config::Config, pool: &sqlx::SqlitePool, query: &str) {
    let mut panel = ChatPanel::new();
    panel.handle(PanelEvent::OpenButton);
    let relay = AssistRelay::new(&cfg.client.assist_url);

    match relay::resolve_ask(pool, &cfg.client, query).await {
        Err(err) => panel.push_error(&err),
        Ok(request) => {
            // Re-opening the chat renders the prior conversation first; a
            // failed history fetch just leaves the panel empty.
            if let Ok(history) = relay
                .history(&request.db_data.user_name, &request.db_data.problem_title)
                .await
            {
                panel.hydrate(&history);
            }

            panel.push_user(query);
            match relay.ask(&request).await {
                Ok((reply, _conversation_id)) => panel.push_reply(&reply),
                Err(err) => panel.push_error(&err),
            }
        }
    }

    print_lines(&panel.render_lines());
}

async fn run_history(cfg: &config::Config, pool: &sqlx::SqlitePool) {
    // Same preconditions as a query: an open problem and a known user.
    let context = match store::load_context(pool).await {
        Ok(Some(ctx)) => ctx,
        Ok(None) => {
            println!("Error: No context available");
            return;
        }
        Err(err) => {
            println!("Error: {}", err);
            return;
        }
    };
    let user_name = match relay::resolve_user_name(pool, &cfg.client).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            println!("Error: No user name available");
            return;
        }
        Err(err) => {
            println!("Error: {}", err);
            return;
        }
    };

    let relay = AssistRelay::new(&cfg.client.assist_url);
    match relay.history(&user_name, &context.title).await {
        Err(err) => println!("Error: {}", err),
        Ok(messages) if messages.is_empty() => {
            println!("No conversation yet for \"{}\".", context.title);
        }
        Ok(messages) => {
            for message in messages {
                let role = match message.role {
                    problem_pal::models::MessageRole::User => "user",
                    problem_pal::models::MessageRole::Model => "model",
                };
                println!(
                    "[{}] {}: {}",
                    message.timestamp.format("%Y-%m-%d %H:%M"),
                    role,
                    message.text
                );
            }
        }
    }
}

async fn execute_search(
    relay: &SearchRelay,
    panel: &mut SearchPanel,
    action: SearchAction,
    top_k: usize,
) {
    let outcome = match action {
        SearchAction::Query(query) => relay.query(&query, top_k).await,
        SearchAction::QueryById(id) => relay.query_by_id(&id, top_k).await,
    };

    match outcome {
        Ok(results) => panel.finish(results),
        Err(err) => panel.fail(&err),
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
