//! Watch command - Follow a bulk job until it finishes
//!
//! Usage:
//! ```bash
//! courier watch 8c3f4f5e-3b53-4b8e-9d4e-2f6b6f7d1c10
//! courier watch 8c3f4f5e-3b53-4b8e-9d4e-2f6b6f7d1c10 --interval-ms 250
//! ```

use anyhow::Result;
use clap::Args;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier_client::{
    ClientError, CourierClient, JobId, JobStatus, PollEvent, PollHandle, Poller, PollerConfig,
};

use super::status::{progress_bar, render_view, status_label};

/// Arguments for the watch command
#[derive(Args)]
pub struct WatchArgs {
    /// Job id returned by a bulk send
    job_id: JobId,

    /// Time between status polls
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    interval_ms: u64,
}

/// Run the watch command
pub async fn run(args: WatchArgs, client: CourierClient) -> Result<()> {
    follow(client, args.job_id, Duration::from_millis(args.interval_ms)).await
}

/// Print progress lines until the job reaches a terminal status.
///
/// Ctrl+C stops following; the job itself keeps running on the server.
pub async fn follow(client: CourierClient, job_id: JobId, interval: Duration) -> Result<()> {
    let config = PollerConfig {
        interval: interval.max(Duration::from_millis(50)),
        ..Default::default()
    };
    let handle = Poller::start(Arc::new(client), job_id, config);

    crate::print_info(&format!("Following job {} (Ctrl+C to stop)", job_id));

    let last = render_until_final(&handle, tokio::signal::ctrl_c()).await;

    println!();
    match last {
        PollEvent::Finished { view, .. } => {
            render_view(&view);
            println!();
            if view.status == JobStatus::Failed {
                crate::print_error(&format!("Job {} failed", job_id));
                anyhow::bail!("job {} finished as FAILED", job_id);
            }
            crate::print_success(&format!(
                "Job {} completed: {} of {} delivered",
                job_id, view.sent_count, view.total_recipients
            ));
            Ok(())
        }
        PollEvent::Failed(ClientError::NotFound(_)) => {
            crate::print_error(&format!("Job {} not found", job_id));
            anyhow::bail!("unknown job {}", job_id)
        }
        PollEvent::Failed(e) => {
            crate::print_error(&format!("Lost contact with the server: {}", e));
            Err(e.into())
        }
        _ => {
            crate::print_warning("Stopped watching. The job continues on the server.");
            Ok(())
        }
    }
}

/// Print each progress update until the poller stops or `stop` resolves.
///
/// `stop` is created once so a stop request is never lost between updates.
async fn render_until_final<F>(handle: &PollHandle, stop: F) -> PollEvent
where
    F: Future,
{
    let mut events = handle.subscribe();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            changed = events.changed() => {
                if changed.is_err() {
                    return handle.latest();
                }
                let event = events.borrow_and_update().clone();
                if let Some(view) = event.view() {
                    println!(
                        "  {} {:>3}% {} sent {}/{}",
                        progress_bar(view.progress_percent, 30),
                        view.progress_percent,
                        status_label(view.status),
                        view.sent_count,
                        view.total_recipients,
                    );
                }
                if event.is_final() {
                    return event;
                }
            }
            _ = &mut stop => {
                handle.cancel();
                return handle.latest();
            }
        }
    }
}
