//! Fixed-cadence polling around [`ScanOrchestrator::run_cycle`].

use crate::pipeline::ScanOrchestrator;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs a cycle immediately and then once per `every` until `shutdown` is
/// cancelled. A running cycle is never interrupted; failed cycles are logged
/// and retried at the next tick. Returns the number of cycles run.
pub async fn run_periodic(
    orchestrator: &ScanOrchestrator,
    every: Duration,
    shutdown: CancellationToken,
) -> usize {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(cycles, "Shutdown requested, stopping poller");
                break;
            }
            _ = ticker.tick() => {}
        }

        cycles += 1;
        match orchestrator.run_cycle().await {
            Ok(summary) => info!(
                cycle = cycles,
                recorded = summary.recorded,
                seen = summary.files_seen,
                "Cycle finished"
            ),
            Err(e) => error!(cycle = cycles, error = %e, "Scan error"),
        }
    }
    cycles
}
