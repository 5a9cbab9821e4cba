//! Status command - Show a bulk job's current state
//!
//! Usage:
//! ```bash
//! courier status 8c3f4f5e-3b53-4b8e-9d4e-2f6b6f7d1c10
//! courier status 8c3f4f5e-3b53-4b8e-9d4e-2f6b6f7d1c10 --json
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::{ColoredString, Colorize};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Table};

use courier_client::{ClientError, CourierClient, JobId, JobStatus, JobStatusView};

/// Arguments for the status command
#[derive(Args)]
pub struct StatusArgs {
    /// Job id returned by a bulk send
    job_id: JobId,

    /// Output the raw status JSON
    #[arg(long)]
    json: bool,
}

/// Run the status command
pub async fn run(args: StatusArgs, client: CourierClient) -> Result<()> {
    let view = match client.job_status(args.job_id).await {
        Ok(view) => view,
        Err(ClientError::NotFound(_)) => {
            crate::print_error(&format!("Job {} not found", args.job_id));
            anyhow::bail!("unknown job {}", args.job_id);
        }
        Err(e) => return Err(e).context("Failed to fetch job status"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    render_view(&view);
    Ok(())
}

/// Print a full status report
pub fn render_view(view: &JobStatusView) {
    println!("{}", format!("📬 Job {}", view.job_id).bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Status", "Sent", "Failed", "Total", "Progress"]);
    table.add_row(vec![
        Cell::new(view.status.as_str()),
        Cell::new(view.sent_count),
        Cell::new(view.failed_count.map_or_else(|| "-".to_string(), |n| n.to_string())),
        Cell::new(view.total_recipients),
        Cell::new(format!("{}%", view.progress_percent)),
    ]);
    println!("{table}");
    println!();

    println!("  {} {}", "Created:".dimmed(), view.created_at.to_rfc3339());
    println!("  {} {}", "Updated:".dimmed(), view.updated_at.to_rfc3339());

    if !view.errors.is_empty() {
        println!();
        println!("{}", "Failures:".bold());
        for error in &view.errors {
            println!("  {} {}", "•".red(), error);
        }
    }
}

/// Colored status label
pub fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Pending => status.as_str().yellow(),
        JobStatus::Processing => status.as_str().blue(),
        JobStatus::Completed => status.as_str().green().bold(),
        JobStatus::Failed => status.as_str().red().bold(),
    }
}

/// Fixed-width text bar for a percentage
pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}
