//! Scheduled collection and batched delivery to a sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ReporterConfig;
use crate::monitoring::Monitoring;
use crate::sink::DataPointSink;

/// Shortest period between passes; `tokio::time::interval` rejects zero.
const MIN_SCHEDULE: Duration = Duration::from_millis(1);

/// Outcome of one reporting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Points collected in the pass.
    pub points: usize,
    /// Batches the sink accepted.
    pub batches_written: usize,
    /// Batches the sink rejected.
    pub batches_failed: usize,
}

/// Runs a collection pass on a fixed schedule and hands the points to a sink.
pub struct Reporter<S: DataPointSink> {
    monitoring: Arc<Monitoring>,
    sink: S,
    schedule: Duration,
    batch_size: usize,
}

impl<S: DataPointSink> Reporter<S> {
    pub fn new(monitoring: Arc<Monitoring>, sink: S, config: &ReporterConfig) -> Self {
        Self {
            monitoring,
            sink,
            schedule: Duration::from_secs(config.schedule_secs).max(MIN_SCHEDULE),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Override the schedule (mainly for short-lived runs).
    pub fn with_schedule(mut self, schedule: Duration) -> Self {
        self.schedule = schedule.max(MIN_SCHEDULE);
        self
    }

    pub fn schedule(&self) -> Duration {
        self.schedule
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Collect once and deliver the points in batches.
    ///
    /// A failing batch is logged and the remaining batches are still delivered.
    pub fn report_once(&self) -> ReportSummary {
        let points = self.monitoring.collect();
        let mut summary = ReportSummary {
            points: points.len(),
            ..Default::default()
        };

        for batch in points.chunks(self.batch_size) {
            match self.sink.write_batch(batch) {
                Ok(()) => summary.batches_written += 1,
                Err(e) => {
                    summary.batches_failed += 1;
                    warn!(error = %e, size = batch.len(), "Failed to write batch");
                }
            }
        }

        debug!(
            points = summary.points,
            batches = summary.batches_written,
            failed = summary.batches_failed,
            "Report complete"
        );
        summary
    }

    /// Report on every tick until `shutdown` flips to true, then report once more.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            schedule_ms = self.schedule.as_millis() as u64,
            batch_size = self.batch_size,
            "Starting reporter"
        );

        let mut interval = tokio::time::interval(self.schedule);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.report_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let summary = self.report_once();
        info!(points = summary.points, "Reporter stopped after final flush");
    }
}
