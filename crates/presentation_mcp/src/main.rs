//! Perplexity MCP server
//!
//! Serves the `perplexity_search` tool over stdio, or runs one-off commands.

#![allow(clippy::print_stdout)]

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use infrastructure::{LogLevel, Settings, init_logging, load_dotenv};
use integration_perplexity::{PerplexityClient, SearchParams, SearchProvider, validate};
use presentation_mcp::{McpServer, PerplexitySearchTool, ToolRegistry};
use tokio::io::BufReader;
use tracing::{info, warn};

/// Perplexity search MCP server
#[derive(Parser)]
#[command(name = "perplexity-mcp")]
#[command(author, version, about = "Perplexity search exposed as an MCP tool", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warning, error, critical); overrides LOG_LEVEL
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,

    /// Validate configuration and print it with the API key masked
    CheckConfig,

    /// Run a single search and print the JSON result
    Search {
        /// The search question
        query: String,

        /// Model override (sonar, sonar-pro)
        #[arg(long)]
        model: Option<String>,

        /// Search focus (web, academic, sec)
        #[arg(long)]
        focus: Option<String>,

        /// Recency filter (hour, day, week, month, year)
        #[arg(long)]
        recency: Option<String>,
    },
}

/// Pick the effective log level, CLI flag first
fn resolve_log_level(flag: Option<&str>, configured: LogLevel) -> anyhow::Result<LogLevel> {
    flag.map_or(Ok(configured), |raw| {
        raw.parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!("Invalid --log-level: {e}"))
    })
}

fn build_client(settings: &Settings) -> anyhow::Result<PerplexityClient> {
    PerplexityClient::new(settings.perplexity.clone(), settings.api_key.clone())
        .context("Failed to create Perplexity client")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    load_dotenv();
    let settings = Settings::from_env().context("Failed to load configuration")?;

    let level = resolve_log_level(cli.log_level.as_deref(), settings.log_level)?;
    init_logging(level)?;

    if settings.cache_enabled {
        warn!("CACHE_ENABLED is set but no cache is available; ignoring");
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let client = build_client(&settings)?;
            let mut registry = ToolRegistry::new();
            registry.register(Arc::new(PerplexitySearchTool::new(Arc::new(client))));

            info!(
                model = %settings.default_model,
                "Starting Perplexity MCP server"
            );
            McpServer::new(registry)
                .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
        },

        Commands::CheckConfig => {
            println!("Configuration OK");
            println!("{settings}");
        },

        Commands::Search {
            query,
            model,
            focus,
            recency,
        } => {
            let client = build_client(&settings)?;
            let params = SearchParams {
                query,
                model,
                search_focus: focus,
                recency,
            };

            let outcome = match validate(&params, client.max_query_length()) {
                Ok(request) => client.search(&request).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => anyhow::bail!(e.user_message()),
            }
        },
    }

    Ok(())
}
