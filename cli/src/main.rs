mod commands;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_add, cmd_delete, cmd_list, cmd_summary, cmd_today};
use crate::config::Config;
use nibble_core::service::NibbleService;

const DEFAULT_LOG_FILTER: &str = "nibble=info,nibble_core=info";

#[derive(Parser)]
#[command(
    name = "nibble",
    version,
    about = "A small, local-first food and calorie log",
    long_about = "\n\n  nibble: log what you eat, see what it adds up to.\n\n\
                  Days are UTC calendar days. Set NIBBLE_DB_PATH to use a specific database file."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a food entry
    #[command(alias = "log")]
    Add {
        /// Food name
        name: String,
        /// Calories per serving
        calories: f64,
        /// Number of servings (fractions allowed)
        #[arg(short, long, default_value = "1")]
        servings: f64,
        /// When it was eaten (RFC 3339, "YYYY-MM-DD HH:MM" as UTC, or a date; default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries, newest first
    List {
        /// First day to include (YYYY-MM-DD or today/yesterday)
        #[arg(long)]
        from: Option<String>,
        /// Last day to include (YYYY-MM-DD or today/yesterday)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show calorie totals per day, newest first
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show today's calorie total
    Today {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry by ID
    Delete {
        /// Entry ID to delete
        entry_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "SERVER_PORT", default_value = "2022")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = NibbleService::open(&config.db_path).with_context(|| {
        format!("Failed to open database at {}", config.db_path.display())
    })?;

    match cli.command {
        Commands::Add {
            name,
            calories,
            servings,
            at,
            json,
        } => cmd_add(&svc, &name, calories, servings, at.as_deref(), json),
        Commands::List { from, to, json } => cmd_list(&svc, from.as_deref(), to.as_deref(), json),
        Commands::Summary { json } => cmd_summary(&svc, json),
        Commands::Today { json } => cmd_today(&svc, json),
        Commands::Delete { entry_id, json } => cmd_delete(&svc, entry_id, json),
        Commands::Serve { port, bind } => server::start_server(svc, port, &bind).await,
    }
}
