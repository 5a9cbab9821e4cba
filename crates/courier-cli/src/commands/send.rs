//! Send command - Submit a message to one or more recipients
//!
//! Usage:
//! ```bash
//! courier send --from me@example.com --to friend@example.com --subject Hi --body Hello
//! courier send --from me@example.com --to a@example.com --to b@example.com \
//!     --subject Hi --body-file message.html --resume resume-42 --watch
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use courier_client::{CourierClient, SendEmail, SendOutcome};

/// Arguments for the send command
#[derive(Args)]
pub struct SendArgs {
    /// Sender address
    #[arg(long, env = "COURIER_FROM", value_name = "ADDRESS")]
    pub from: String,

    /// Recipient; repeat or separate with commas
    #[arg(long, short = 't', required = true, value_name = "ADDRESS")]
    pub to: Vec<String>,

    /// Subject line
    #[arg(long, short = 's')]
    pub subject: String,

    /// Message body (HTML allowed)
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the message body from a file
    #[arg(long, value_name = "FILE")]
    pub body_file: Option<PathBuf>,

    /// Reference to a tailored resume to attach
    #[arg(long, value_name = "ID")]
    pub resume: Option<String>,

    /// Follow a bulk job until it finishes
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Time between status polls when watching
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub interval_ms: u64,
}

/// Run the send command
pub async fn run(args: SendArgs, client: CourierClient) -> Result<()> {
    let body = match (&args.body, &args.body_file) {
        (Some(body), _) => body.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read body file: {}", path.display()))?,
        (None, None) => String::new(),
    };

    let mut request = SendEmail::new(&args.from, args.to.iter().cloned(), &args.subject, &body);
    if let Some(resume) = &args.resume {
        request = request.with_resume(resume);
    }

    let outcome = client
        .send_email(&request)
        .await
        .context("Send request failed")?;

    match outcome {
        SendOutcome::Delivered(receipt) => {
            crate::print_success(&format!("Sent to {}", receipt.recipients.join(", ")));
            if let Some(id) = receipt.message_id {
                println!("  {} {}", "Message id:".dimmed(), id);
            }
            Ok(())
        }
        SendOutcome::Queued(job) => {
            crate::print_success(&job.message);
            println!("  {} {}", "Job id:".dimmed(), job.job_id.to_string().green());

            if args.watch {
                println!();
                super::watch::follow(client, job.job_id, Duration::from_millis(args.interval_ms)).await
            } else {
                println!(
                    "  {} courier watch {}",
                    "Follow with:".dimmed(),
                    job.job_id
                );
                Ok(())
            }
        }
    }
}
