//! Braid CLI
//!
//! Thin command-line wrapper over the memory engine: stats, recall,
//! decide, thread, flag, remember. Exit codes: 0 on success, 2 on invalid
//! argument, 1 otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use braid_core::{
    Config, DecisionDraft, Embedder, FlagCategory, HashedEmbedder, MemoryError, MemoryService,
    Priority, RecallRequest, SqliteVectorStore, ThreadDraft,
};

/// Braid - persistent semantic memory for LLM conversations
#[derive(Parser)]
#[command(name = "braid")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the braid semantic memory engine")]
#[command(long_about = "Braid organizes the decisions, open threads, patterns, and lineage of past \
LLM conversations into a vector-backed knowledge graph and recalls them with attention-weighted scoring.")]
struct Cli {
    /// Database path (defaults to BRAID_DB_PATH, then the platform data dir)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show collection counts
    Stats,

    /// Attention-weighted recall across all collections
    Recall {
        /// Query text
        query: String,
        /// Token budget for the packed result
        #[arg(long, default_value = "2000")]
        budget: usize,
        /// Restrict to one project
        #[arg(long)]
        project: Option<String>,
        /// Print decomposed score factors
        #[arg(long)]
        explain: bool,
    },

    /// Register a decision
    Decide {
        /// Decision text
        text: String,
        /// Owning project
        #[arg(long)]
        project: String,
        /// Project-scoped id, e.g. D042
        #[arg(long)]
        local_id: String,
        /// Why this was decided
        #[arg(long)]
        rationale: Option<String>,
        /// Epistemic tier in [0,1]
        #[arg(long)]
        tier: Option<f64>,
        /// Alternatives rejected (comma-separated)
        #[arg(long)]
        alternatives: Option<String>,
        /// Source conversation id
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Manage threads
    Thread {
        #[command(subcommand)]
        op: ThreadOp,
    },

    /// Raise an expedition flag
    Flag {
        /// The observation worth bookmarking
        description: String,
        /// Owning project
        #[arg(long)]
        project: String,
        /// Category: inversion, isomorphism, fsd, manifestation, trap, general
        #[arg(long, default_value = "general")]
        category: String,
    },

    /// Store a session value with a TTL
    Remember {
        /// Scratchpad key, conventionally <session>/<name>
        key: String,
        /// JSON value (falls back to a plain string)
        value: String,
        /// Seconds until expiry
        #[arg(long, default_value = "3600")]
        ttl: i64,
    },
}

#[derive(Subcommand)]
enum ThreadOp {
    /// Open a thread
    Open {
        #[command(flatten)]
        target: ThreadTarget,
        /// Thread title
        #[arg(long)]
        title: String,
        /// Thread body
        #[arg(long, default_value = "")]
        description: String,
        /// Priority: high, medium, low
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    /// Resolve a thread
    Resolve {
        #[command(flatten)]
        target: ThreadTarget,
        /// Resolution text (required)
        #[arg(long)]
        resolution: String,
    },
    /// Block a thread (an empty blocker list reopens it)
    Block {
        #[command(flatten)]
        target: ThreadTarget,
        /// Blocking references (comma-separated)
        #[arg(long, default_value = "")]
        blockers: String,
    },
}

#[derive(Args)]
struct ThreadTarget {
    /// Owning project
    #[arg(long)]
    project: String,
    /// Project-scoped id, e.g. T017
    #[arg(long)]
    local_id: String,
}

fn build_service(db_path: Option<PathBuf>) -> Result<MemoryService, MemoryError> {
    let mut config = Config::from_env()?;
    if db_path.is_some() {
        config.db_path = db_path;
    }
    let store = Arc::new(SqliteVectorStore::new(config.db_path.clone())?);
    let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new());
    MemoryService::new(store, embedder, config)
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn run(cli: Cli) -> Result<(), MemoryError> {
    let service = build_service(cli.db_path)?;

    match cli.command {
        Commands::Stats => {
            let stats = service.stats().await?;
            println!("{}", "braid collections".bold());
            for (name, count) in &stats.collections {
                println!("  {:<12} {}", name, count.to_string().cyan());
            }
            println!("  {:<12} {}", "events", stats.events.to_string().cyan());
            println!("  {:<12} {}", "edges", stats.lineage_edges.to_string().cyan());
            println!("  {:<12} {}", "model", stats.embedding_model.dimmed());
        }
        Commands::Recall { query, budget, project, explain } => {
            let filters = project.map(braid_core::SearchFilter::for_project);
            let response = service
                .recall(RecallRequest {
                    query,
                    budget_tokens: Some(budget),
                    filters,
                    deadline: None,
                })
                .await?;
            if !response.degraded.is_empty() {
                eprintln!("{} {}", "degraded:".yellow(), response.degraded.join(", "));
            }
            println!(
                "{} ({} of {} candidates, {}/{} tokens)",
                "recalled".bold(),
                response.items.len(),
                response.candidates,
                response.tokens_used,
                response.budget_tokens
            );
            for item in &response.items {
                println!(
                    "  {:.3} {} [{}] {}",
                    item.attention,
                    item.kind.as_str().green(),
                    item.project.dimmed(),
                    item.text
                );
                if explain {
                    let f = &item.factors;
                    println!(
                        "        sim {:.3}  tier {:.2}  fresh {:.3}  conflict {:.1}  category {:.1}",
                        f.similarity, f.epistemic_tier, f.freshness, f.conflict_bonus, f.category_boost
                    );
                }
            }
        }
        Commands::Decide { text, project, local_id, rationale, tier, alternatives, conversation } => {
            let registered = service
                .decide(
                    DecisionDraft {
                        project,
                        local_id,
                        text,
                        rationale,
                        alternatives_rejected: alternatives.as_deref().map(split_csv).unwrap_or_default(),
                        epistemic_tier: tier,
                        source_conversation: conversation,
                    },
                    None,
                )
                .await?;
            let d = &registered.decision;
            println!("{} {} ({})", "registered".green().bold(), d.local_id, d.id.dimmed());
            for conflict in &registered.conflicts {
                println!(
                    "  {} {} in {}: {}",
                    "conflicts with".red(),
                    conflict.local_id,
                    conflict.project,
                    conflict.text
                );
            }
        }
        Commands::Thread { op } => match op {
            ThreadOp::Open { target, title, description, priority } => {
                let priority = Priority::parse_name(&priority).ok_or_else(|| {
                    MemoryError::InvalidArgument(format!("unknown priority {priority}"))
                })?;
                let thread = service
                    .thread_open(
                        ThreadDraft {
                            project: target.project,
                            local_id: target.local_id,
                            title,
                            description,
                            priority: Some(priority),
                            source_conversation: None,
                        },
                        None,
                    )
                    .await?;
                println!("{} {} ({})", "opened".green().bold(), thread.local_id, thread.id.dimmed());
            }
            ThreadOp::Resolve { target, resolution } => {
                let thread = service
                    .thread_resolve(&target.project, &target.local_id, &resolution)
                    .await?;
                println!("{} {}", "resolved".green().bold(), thread.local_id);
            }
            ThreadOp::Block { target, blockers } => {
                let thread = service
                    .thread_block(&target.project, &target.local_id, split_csv(&blockers))
                    .await?;
                println!(
                    "{} {} ({})",
                    thread.status.as_str().yellow().bold(),
                    thread.local_id,
                    thread.blocked_by.join(", ")
                );
            }
        },
        Commands::Flag { description, project, category } => {
            let category = FlagCategory::parse_name(&category).ok_or_else(|| {
                MemoryError::InvalidArgument(format!("unknown category {category}"))
            })?;
            let flag = service.flag(&project, category, &description, None).await?;
            println!("{} {} ({})", "flagged".green().bold(), flag.category.as_str(), flag.id.dimmed());
        }
        Commands::Remember { key, value, ttl } => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            let entry = service.remember(&key, value, ttl)?;
            println!(
                "{} {} (expires {})",
                "remembered".green().bold(),
                entry.key,
                entry.expires_at.to_rfc3339().dimmed()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), err);
        let code = match err {
            MemoryError::InvalidArgument(_) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}
