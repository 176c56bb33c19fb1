//! ZANTARA command-line entry point: ask a question, stream the reasoning,
//! warm the collections, or check provider health.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zantara_config::AppConfig;
use zantara_llm::LlmGateway;
use zantara_retrieval::CollectionWarmupService;
use zantara_runtime::{AgenticOrchestrator, StreamEvent};
use zantara_vector::EmbeddingsGenerator;

#[derive(Parser)]
#[command(name = "zantara", about = "Agentic RAG assistant for Indonesian business, visa, and tax advisory")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "zantara.toml")]
    config: String,

    /// User identity (email) for personalization.
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question and print the final answer with citations.
    Ask { query: Vec<String> },
    /// Ask a question and print the live event stream.
    Stream { query: Vec<String> },
    /// Pre-load priority collections and the embedding model.
    Warmup,
    /// Ping every configured model tier.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    // Production refuses to serve without credentials.
    config.validate()?;

    let pool = if config.database.url.is_empty() {
        warn!("no database configured; profiles, memory, and deep-dive tools run degraded");
        None
    } else {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await
        {
            Ok(pool) => Some(pool),
            Err(err) => {
                warn!("database connection failed, continuing without it: {err}");
                None
            }
        }
    };

    match cli.command {
        Command::Ask { query } => {
            let query = query.join(" ");
            let orchestrator = Arc::new(AgenticOrchestrator::from_config(&config, pool)?);
            let result = orchestrator
                .process_query(&query, cli.user.as_deref(), None)
                .await?;

            println!("{}", result.answer);
            if !result.sources.is_empty() {
                println!("\nSources:");
                for source in &result.sources {
                    println!("  [{}] {} ({:.2})", source.id, source.title, source.score);
                }
            }
            info!(
                route = %result.route_used,
                steps = result.total_steps,
                tools = result.tools_called,
                elapsed = result.execution_time,
                "query complete"
            );
        }
        Command::Stream { query } => {
            let query = query.join(" ");
            let orchestrator = Arc::new(AgenticOrchestrator::from_config(&config, pool)?);
            let mut rx = orchestrator.stream_query(query, cli.user.clone(), None);

            while let Some(event) = rx.recv().await {
                match event {
                    StreamEvent::Token(token) => {
                        print!("{token}");
                        std::io::stdout().flush().ok();
                    }
                    StreamEvent::Status(status) => eprintln!("· {status}"),
                    StreamEvent::ToolStart { name, .. } => eprintln!("· calling {name}..."),
                    StreamEvent::ToolEnd { .. } => {}
                    StreamEvent::Sources(sources) => {
                        println!("\n\nSources:");
                        for source in sources {
                            println!("  [{}] {}", source.id, source.title);
                        }
                    }
                    StreamEvent::Error(error) => eprintln!("error: {error}"),
                    StreamEvent::Metadata(_) => {}
                    StreamEvent::Done(_) => break,
                }
            }
            println!();
        }
        Command::Warmup => {
            let embedder = EmbeddingsGenerator::from_config(&config)?;
            let manager = zantara_retrieval::CollectionManager::from_config(&config);
            let report = CollectionWarmupService
                .warmup_all_collections(&manager, &embedder)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Health => {
            let gateway = LlmGateway::from_config(&config);
            let status = gateway.health_check().await;
            let mut entries: Vec<(String, bool)> = status.into_iter().collect();
            entries.sort();
            for (model, healthy) in entries {
                println!("{model}: {}", if healthy { "ok" } else { "down" });
            }
        }
    }

    Ok(())
}
