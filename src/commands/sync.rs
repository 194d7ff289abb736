use anyhow::{Context, Result};

use konnekt::remote::{BlobStore, Identity, RecordStore};
use konnekt::sync::{SyncCoordinator, SyncPass};

/// Run one pass and print a one-line summary.
pub async fn run<R, B, I>(coordinator: &SyncCoordinator<'_, R, B, I>) -> Result<SyncPass>
where
    R: RecordStore,
    B: BlobStore,
    I: Identity,
{
    let pass = coordinator
        .run_pass()
        .await
        .context("Could not read drafts")?;

    match &pass {
        SyncPass::Completed(report) if report.synced.is_empty() && report.is_clean() => {
            println!("No drafts to sync.");
        }
        SyncPass::Completed(report) => {
            println!(
                "Synced {} draft(s), {} left for retry.",
                report.synced.len(),
                report.failed.len()
            );
            for (id, err) in &report.failed {
                println!("  #{}: {}", id, err);
            }
        }
        SyncPass::Deferred { pending, reason } => {
            println!("{} draft(s) waiting: {}", pending, reason);
        }
        SyncPass::AlreadyRunning => {
            println!("A sync is already in progress.");
        }
    }

    Ok(pass)
}
