//! Courier CLI - send mail through a Courier server and follow bulk jobs
//!
//! # Usage
//!
//! ```bash
//! # Send to one recipient (delivered inline)
//! courier send --from me@example.com --to friend@example.com --subject Hi --body Hello
//!
//! # Bulk send and follow the job until it finishes
//! courier send --from me@example.com --to a@example.com --to b@example.com \
//!     --subject Hi --body-file message.html --watch
//!
//! # Inspect or follow an existing job
//! courier status 6f1c...
//! courier watch 6f1c... --interval-ms 500
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use courier_client::CourierClient;

mod commands;

use commands::{send, status, watch};

/// Courier - bulk mail dispatch with pollable progress
#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Courier CLI - send mail and follow bulk jobs",
    long_about = "Sends mail through a Courier server.\n\n\
                  Single-recipient sends are delivered immediately; larger sends\n\
                  become background jobs whose progress can be followed live."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Base URL of the Courier server
    #[arg(
        long,
        global = true,
        env = "COURIER_URL",
        default_value = "http://localhost:8080"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to one or more recipients
    #[command(name = "send")]
    Send(send::SendArgs),

    /// Show the current status of a bulk job
    #[command(name = "status")]
    Status(status::StatusArgs),

    /// Follow a bulk job until it finishes
    #[command(name = "watch")]
    Watch(watch::WatchArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let client = CourierClient::new(&cli.server);
    tracing::debug!(server = %client.base_url(), "Using Courier server");

    match cli.command {
        Commands::Send(args) => send::run(args, client).await,
        Commands::Status(args) => status::run(args, client).await,
        Commands::Watch(args) => watch::run(args, client).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message with an X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
