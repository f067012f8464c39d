//! GravityWatch CLI - Watch Antigravity model quotas
//!
//! A command-line tool for finding the local language server, showing
//! per-model quota and managing quota groups.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gravitywatch")]
#[command(author, version, about = "Watch Antigravity model quotas")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the language server and verify its port
    Scan,

    /// Show current quotas once
    #[command(alias = "st")]
    Status,

    /// Poll quotas until interrupted
    Watch {
        /// Poll interval in seconds (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Manage quota groups
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum GroupAction {
    /// Group models that currently share a quota
    Auto,
    /// Turn grouping on
    Enable,
    /// Turn grouping off
    Disable,
    /// Name the group containing a model
    Rename {
        /// Any model id in the group
        model_id: String,
        name: String,
    },
    /// Show current groups
    #[command(alias = "ls")]
    Show,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Scan => commands::scan::run(cli.json).await?,
        Commands::Status => commands::status::run(cli.json).await?,
        Commands::Watch { interval } => commands::watch::run(interval, cli.json).await?,
        Commands::Group { action } => match action {
            GroupAction::Auto => commands::group::auto(cli.json).await?,
            GroupAction::Enable => commands::group::set_enabled(true, cli.json).await?,
            GroupAction::Disable => commands::group::set_enabled(false, cli.json).await?,
            GroupAction::Rename { model_id, name } => {
                commands::group::rename(&model_id, &name, cli.json).await?
            }
            GroupAction::Show => commands::group::show(cli.json).await?,
        },
        Commands::Config => commands::config::show(cli.json).await?,
    }

    Ok(())
}
