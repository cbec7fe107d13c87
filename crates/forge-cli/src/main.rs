//! mcp-forge CLI: register MCP servers and call them through one proxy.

mod commands;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use forge_config::{CliOverrides, ForgeConfig};
use forge_registry::{AuditLog, Registry};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "mcp-forge",
    version,
    about = "Registry and proxy for MCP servers"
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Home directory (overrides MCP_FORGE_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a server under an alias (replaces an existing one)
    Add(AddArgs),
    /// List registered servers
    List,
    /// Remove a registered server
    Remove { alias: String },
    /// Show a server's registry entry
    Status { alias: String },
    /// List the tools a server exposes
    Discover { alias: String },
    /// Call one tool on a server
    Call {
        alias: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["command", "url"])))]
struct AddArgs {
    alias: String,

    /// Executable to spawn (process transport)
    #[arg(long)]
    command: Option<String>,

    /// Argument for --command; repeat for more
    #[arg(long = "arg", allow_hyphen_values = true, requires = "command")]
    args: Vec<String>,

    /// Endpoint URL (remote transport)
    #[arg(long)]
    url: Option<String>,

    /// Environment variable as KEY=VALUE; repeat for more
    #[arg(long = "env", value_parser = commands::parse_env_pair)]
    env: Vec<(String, String)>,

    #[arg(long, default_value = "")]
    description: String,

    /// Mark the server as created by mcp-forge
    #[arg(long)]
    managed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config =
        ForgeConfig::load(CliOverrides { home: cli.home }).context("Failed to load configuration")?;
    tracing::debug!(home = %config.home.display(), "Loaded configuration");

    let registry = Arc::new(Registry::open(&config.home));
    let audit = AuditLog::open(&config.home);

    let output = match cli.command {
        Command::Add(args) => commands::add(&registry, &audit, args).await?,
        Command::List => commands::list(&registry).await?,
        Command::Remove { alias } => commands::remove(&registry, &audit, &alias).await?,
        Command::Status { alias } => commands::status(&registry, &alias).await?,
        Command::Discover { alias } => {
            commands::discover(&config, registry, &audit, &alias).await?
        }
        Command::Call { alias, tool, args } => {
            commands::call(&config, registry, &audit, &alias, &tool, &args).await?
        }
    };
    println!("{output}");
    Ok(())
}
