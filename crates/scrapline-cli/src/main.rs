//! Scrapline CLI - operator tooling for the intake pipeline
//!
//! - Reconcile weighbridge readings without touching a transaction
//! - Hash evidence files the way the ledger does
//! - Decode and check a scanned gate-pass payload
//! - Run a complete truck visit against in-memory adapters

use clap::{Parser, Subcommand};
use scrapline_kernel::{telemetry, KernelConfig};

mod commands;
mod output;
mod simulate;

use output::OutputFormat;

/// Scrapline CLI application
#[derive(Parser)]
#[command(name = "scrapline")]
#[command(about = "Scrapline - scrap intake pipeline tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SCRAPLINE_CONFIG")]
    config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a gross and a tare reading
    NetWeight {
        /// Loaded vehicle weight
        #[arg(long)]
        gross: f64,

        /// Empty vehicle weight
        #[arg(long)]
        tare: f64,

        /// Discrepancy threshold in percent (defaults to configuration)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Print the SHA-256 and size of an evidence file
    HashFile {
        /// File to hash
        path: std::path::PathBuf,
    },

    /// Decode a gate-pass payload and report its expiry
    InspectPass {
        /// Payload JSON, or @path to read it from a file
        payload: String,
    },

    /// Run one truck visit end to end and print the audit trail
    Simulate {
        /// Tare reading to use (gross is 15750)
        #[arg(long, default_value_t = 8250.0)]
        tare: f64,

        /// Let the gate pass expire and exit via supervisor override
        #[arg(long)]
        expire_pass: bool,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = KernelConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    telemetry::init_tracing(&config.logging)?;

    match cli.command {
        Commands::NetWeight {
            gross,
            tare,
            threshold,
        } => commands::net_weight(&config, gross, tare, threshold, cli.output),
        Commands::HashFile { path } => commands::hash_file(&path, cli.output).await,
        Commands::InspectPass { payload } => commands::inspect_pass(&payload, cli.output).await,
        Commands::Simulate { tare, expire_pass } => {
            simulate::run(config, tare, expire_pass, cli.output).await
        }
        Commands::Config => output::print_single(&config),
    }
}
