//! Background completion of elapsed calls.
//!
//! ```text
//! every interval:
//!   for each active InProgress call:
//!     elapsed? ── no ──▶ skipped
//!        │
//!        yes ─▶ complete under the call lock ─▶ completed | skipped | failed
//! ```
//!
//! A call counts as elapsed once the default duration has passed since its
//! scheduled start. Every participant is treated as having attended, so the
//! sweeper never charges no-show penalties. One call failing does not stop
//! the others, and a failed tick does not stop the loop.

use crate::engine::CallEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Outcome of one sweep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Active in-progress calls looked at
    pub examined: usize,
    /// Calls completed by this sweep
    pub completed: usize,
    /// Calls not yet elapsed, or no longer eligible once locked
    pub skipped: usize,
    /// Calls whose completion failed
    pub failed: usize,
}

/// Periodically completes elapsed calls
#[derive(Debug)]
pub struct LifecycleSweeper {
    engine: Arc<CallEngine>,
    interval: Duration,
}

impl LifecycleSweeper {
    /// Creates a sweeper ticking every `interval`
    #[must_use]
    pub const fn new(engine: Arc<CallEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run one sweep now
    pub async fn sweep_once(&self) -> SweepReport {
        let started = Instant::now();
        let now = self.engine.now();
        let mut report = SweepReport::default();
        metrics::counter!("sweeper.ticks").increment(1);

        let calls = match self.engine.in_progress_calls().await {
            Ok(calls) => calls,
            Err(error) => {
                metrics::counter!("sweeper.failures").increment(1);
                error!(%error, "sweeper could not list in-progress calls");
                return report;
            },
        };

        for call in calls {
            report.examined += 1;
            if !call.is_elapsed(now) {
                report.skipped += 1;
                continue;
            }

            match self.engine.complete_elapsed(call.id, now).await {
                Ok(Some(_)) => {
                    report.completed += 1;
                    metrics::counter!("sweeper.completed").increment(1);
                },
                Ok(None) => {
                    debug!(call_id = %call.id, "call no longer eligible for auto-completion");
                    report.skipped += 1;
                },
                Err(error) => {
                    report.failed += 1;
                    metrics::counter!("sweeper.failures").increment(1);
                    error!(call_id = %call.id, %error, "auto-completion failed");
                },
            }
        }

        metrics::histogram!("sweeper.tick_duration_seconds").record(started.elapsed().as_secs_f64());
        if report.completed > 0 || report.failed > 0 {
            info!(
                examined = report.examined,
                completed = report.completed,
                failed = report.failed,
                "sweep finished"
            );
        }
        report
    }

    /// Run the sweep loop on a background task until `shutdown` fires
    ///
    /// The first sweep runs immediately.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "lifecycle sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("lifecycle sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("lifecycle sweeper stopped");
    }
}
