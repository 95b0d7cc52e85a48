//! CLI application for converting Danish supplier invoices to OIOUBL XML.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{GlobalOpts, batch, config, directory, inspect, process};

/// oioinv - Turn PDF invoices into validated OIOUBL 2.02 documents
#[derive(Parser)]
#[command(name = "oioinv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Always use the configured default customer
    #[arg(long, global = true, env = "USE_DEFAULT_CUSTOMER_ONLY")]
    default_customer_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single invoice
    Process(process::ProcessArgs),

    /// Convert every PDF in a folder
    Batch(batch::BatchArgs),

    /// Show the key figures of an OIOUBL invoice file
    Inspect(inspect::InspectArgs),

    /// Query the company directory
    Directory(directory::DirectoryArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let globals = GlobalOpts {
        config: cli.config,
        default_customer_only: cli.default_customer_only,
    };

    // Execute command
    match cli.command {
        Commands::Process(args) => process::run(args, &globals).await,
        Commands::Batch(args) => batch::run(args, &globals).await,
        Commands::Inspect(args) => inspect::run(args),
        Commands::Directory(args) => directory::run(args, &globals),
        Commands::Config(args) => config::run(args, &globals),
    }
}
