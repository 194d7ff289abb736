use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use konnekt::connectivity::{Backoff, Monitor, Trigger};
use konnekt::db::DraftStore;
use konnekt::remote::{BlobStore, ConnectivityProbe, Identity, RecordStore};
use konnekt::sync::{SyncCoordinator, SyncPass};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Poll connectivity until `shutdown` is set, syncing on start-up and on
/// every reconnect. Passes that leave drafts behind are retried with backoff
/// while we stay online.
pub async fn run<Q, R, B, I>(
    store: &DraftStore,
    probe: &Q,
    coordinator: &SyncCoordinator<'_, R, B, I>,
    interval: Duration,
    mut backoff: Backoff,
    shutdown: &AtomicBool,
) -> Result<usize>
where
    Q: ConnectivityProbe,
    R: RecordStore,
    B: BlobStore,
    I: Identity,
{
    let mut monitor = Monitor::new();
    let mut retry_at: Option<Instant> = None;
    let mut passes = 0;

    info!("Watching connectivity every {:?}", interval);

    while !shutdown.load(Ordering::SeqCst) {
        let online = probe.is_online().await;
        let trigger = monitor.observe(online);

        let due = match trigger {
            Some(Trigger::Startup) => match store.count() {
                Ok(n) => n > 0,
                Err(e) => {
                    warn!("Drafts unavailable: {}", e);
                    false
                }
            },
            Some(Trigger::Reconnected) => {
                info!("Back online");
                backoff.reset();
                true
            }
            None if online => retry_at.is_some_and(|at| Instant::now() >= at),
            None => false,
        };

        if !online {
            retry_at = None;
        }

        if due {
            passes += 1;
            retry_at = match coordinator.run_pass().await {
                Ok(SyncPass::Completed(report)) if report.is_clean() => {
                    backoff.reset();
                    None
                }
                Ok(SyncPass::Completed(report)) => {
                    let delay = backoff.next_delay();
                    info!(
                        left = report.failed.len(),
                        "Some drafts did not sync, retrying in {:?}", delay
                    );
                    Some(Instant::now() + delay)
                }
                Ok(SyncPass::Deferred { reason, .. }) => {
                    let delay = backoff.next_delay();
                    info!("Sync deferred ({}), retrying in {:?}", reason, delay);
                    Some(Instant::now() + delay)
                }
                Ok(SyncPass::AlreadyRunning) => retry_at,
                Err(e) => {
                    warn!("Drafts unavailable, skipping sync: {}", e);
                    Some(Instant::now() + backoff.next_delay())
                }
            };
        }

        let wake = Instant::now() + interval;
        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= wake {
                break;
            }
            tokio::time::sleep((wake - now).min(SHUTDOWN_POLL)).await;
        }
    }

    debug!(passes, "Watch loop stopped");
    Ok(passes)
}
