//! Periodic job re-resolving recent shipments and pushing them downstream.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::model::TrackingHints;
use crate::ports::{ShipmentFilter, StoreError};
use crate::service::TrackingService;
use crate::sync::DownstreamSync;

/// Shortest accepted time between passes.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
/// Cadence and scope of the refresh job.
pub struct RefreshSettings {
    /// Time between passes, at least [`MIN_INTERVAL`].
    pub interval: Duration,
    /// Only shipments created within this window are refreshed.
    pub lookback: TimeDelta,
    /// Pause between two shipments of a pass, to throttle carrier calls.
    pub item_delay: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            lookback: TimeDelta::days(7),
            item_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Outcome of one pass.
pub struct RefreshSummary {
    /// Shipments looked at.
    pub checked: usize,
    /// Shipments that got at least one new mirror row.
    pub updated: usize,
    /// Shipments whose lookup reported an error.
    pub failed: usize,
}

/// Background refresher.
pub struct RefreshJob {
    service: Arc<TrackingService>,
    sync: Option<Arc<DownstreamSync>>,
    settings: RefreshSettings,
}

impl RefreshJob {
    /// Create a job; without a sync target passes only warm the cache.
    #[must_use]
    pub fn new(
        service: Arc<TrackingService>,
        sync: Option<Arc<DownstreamSync>>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            service,
            sync,
            settings,
        }
    }

    /// Refresh every agent-linked shipment created within the lookback window
    /// ending at `now`, one after the other.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the shipment list cannot be read. Failures of
    /// single shipments are counted, never returned.
    pub async fn run_once(&self, now: NaiveDateTime) -> Result<RefreshSummary, StoreError> {
        // A window reaching past the calendar covers every shipment.
        let since = now
            .checked_sub_signed(self.settings.lookback)
            .unwrap_or(NaiveDateTime::MIN);
        let filter = ShipmentFilter {
            created_since: Some(since),
            requires_agent: true,
            ..ShipmentFilter::default()
        };
        let shipments = self.service.store().shipments_matching(&filter).await?;
        info!(count = shipments.len(), "refresh_started");

        let mut summary = RefreshSummary::default();
        for (index, shipment) in shipments.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.item_delay).await;
            }
            summary.checked += 1;

            let result = self
                .service
                .resolve_tracking(&shipment.tracking_number, &TrackingHints::default())
                .await;

            if let Some(err) = &result.error {
                warn!(tracking_number = %shipment.tracking_number, error = %err, "refresh_lookup_failed");
                summary.failed += 1;
                continue;
            }

            let Some(sync) = &self.sync else { continue };
            if result.events.is_empty() {
                continue;
            }

            let report = sync.push(shipment, &result.events).await;
            if report.inserted > 0 {
                info!(tracking_number = %shipment.tracking_number, inserted = report.inserted, "refresh_updated");
                summary.updated += 1;
            }
        }

        info!(
            checked = summary.checked,
            updated = summary.updated,
            failed = summary.failed,
            "refresh_finished"
        );
        Ok(summary)
    }

    /// Run a pass immediately and then every interval until `shutdown` turns true
    /// or its sender is dropped. A pass in progress is abandoned on shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = if self.settings.interval < MIN_INTERVAL {
            warn!(interval = ?self.settings.interval, "refresh_interval_raised_to_minimum");
            MIN_INTERVAL
        } else {
            self.settings.interval
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = stopped(&mut shutdown) => break,
            }
            tokio::select! {
                pass = self.run_once(Utc::now().naive_utc()) => {
                    if let Err(err) = pass {
                        error!(error = %err, "refresh_pass_failed");
                    }
                }
                () = stopped(&mut shutdown) => {
                    warn!("refresh_pass_interrupted");
                    break;
                }
            }
        }
        info!("refresh_stopped");
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        debug!("refresh_shutdown_sender_dropped");
    }
}
