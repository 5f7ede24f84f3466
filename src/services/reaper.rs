use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ReaperConfig;
use crate::error::BookingError;
use crate::services::coordinator::{ExpireOutcome, ReservationCoordinator};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Returns seats of pending bookings that outlived their hold.
///
/// The reaper only finds candidates; each one is expired through
/// [`ReservationCoordinator::expire`], which re-checks status and deadline
/// under the booking's lock. Running several reapers, or a reaper alongside
/// confirm and release, is therefore safe.
pub struct ExpiryReaper {
    coordinator: Arc<ReservationCoordinator>,
    config: ReaperConfig,
}

impl ExpiryReaper {
    pub fn new(coordinator: Arc<ReservationCoordinator>, config: ReaperConfig) -> Self {
        Self { coordinator, config }
    }

    /// One pass over at most `batch_size` expired holds.
    pub async fn sweep(&self) -> Result<SweepReport, BookingError> {
        let candidates = self.coordinator.expired_pending(self.config.batch_size).await?;
        if candidates.is_empty() {
            return Ok(SweepReport::default());
        }

        info!(candidates = candidates.len(), "Expiring stale holds");

        let outcomes: Vec<(Uuid, Result<ExpireOutcome, BookingError>)> = stream::iter(candidates)
            .map(|booking_id| async move { (booking_id, self.coordinator.expire(booking_id).await) })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (booking_id, outcome) in outcomes {
            match outcome {
                Ok(ExpireOutcome::Expired { .. }) => report.expired += 1,
                Ok(ExpireOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(
                        %booking_id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Failed to expire booking, it stays pending until a later sweep succeeds"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            "Expiry sweep completed"
        );
        Ok(report)
    }

    /// Sweeps every `interval` until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.config.interval.as_secs(), "Expiry reaper started");
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    warn!(error = %e, "Expiry sweep aborted");
                }
            }
        })
    }
}
