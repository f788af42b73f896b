//! Pushes merged events to the downstream mirror without writing duplicates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::model::{EventTime, MirrorRecord, ShipmentRef, TrackingEvent, TrackingNumber};
use crate::ports::{MirrorError, MirrorPort};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Per-event tally of one push.
pub struct SyncReport {
    /// Rows written.
    pub inserted: usize,
    /// Rows skipped because the mirror already had them.
    pub duplicates: usize,
    /// Rows that could not be checked or written.
    pub failed: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} inserted, {} duplicates, {} failed",
            self.inserted, self.duplicates, self.failed
        )
    }
}

/// Writer for the downstream mirror.
pub struct DownstreamSync {
    mirror: Arc<dyn MirrorPort>,
}

impl DownstreamSync {
    /// Create a writer for the given mirror.
    #[must_use]
    pub fn new(mirror: Arc<dyn MirrorPort>) -> Self {
        Self { mirror }
    }

    /// Push the events of one shipment.
    ///
    /// Events sharing a description collapse to one row (the last one seen
    /// provides location and time). Every row is checked and written on its
    /// own; a failure is counted and the batch continues.
    pub async fn push(&self, shipment: &ShipmentRef, events: &[TrackingEvent]) -> SyncReport {
        let tracking_number = &shipment.tracking_number;
        let mut report = SyncReport::default();

        for record in unique_records(tracking_number, events) {
            match self.mirror.contains(&record.key()).await {
                Ok(true) => {
                    debug!(%tracking_number, description = %record.description, "mirror_duplicate");
                    report.duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(%tracking_number, error = %err, "mirror_lookup_failed");
                    report.failed += 1;
                    continue;
                }
            }

            match self.mirror.insert(&record).await {
                Ok(()) => report.inserted += 1,
                Err(MirrorError::Conflict) => report.duplicates += 1,
                Err(err) => {
                    warn!(%tracking_number, error = %err, "mirror_insert_failed");
                    report.failed += 1;
                }
            }
        }

        if report.inserted > 0 {
            self.update_status(tracking_number, events).await;
        }

        info!(%tracking_number, inserted = report.inserted, duplicates = report.duplicates, failed = report.failed, "mirror_push");
        report
    }

    async fn update_status(&self, tracking_number: &TrackingNumber, events: &[TrackingEvent]) {
        let Some(latest) = events
            .iter()
            .max_by_key(|event| event.occurred_at.as_ref().and_then(EventTime::sort_key))
        else {
            return;
        };

        if let Err(err) = self
            .mirror
            .update_status(tracking_number, &latest.description)
            .await
        {
            warn!(%tracking_number, error = %err, "mirror_status_update_failed");
        }
    }
}

/// One record per description, in first-seen order; later duplicates replace
/// the earlier record's location and time.
fn unique_records(tracking_number: &TrackingNumber, events: &[TrackingEvent]) -> Vec<MirrorRecord> {
    let mut records: Vec<MirrorRecord> = Vec::with_capacity(events.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for event in events {
        let record = MirrorRecord::new(tracking_number, event);
        match positions.get(event.description.as_str()) {
            Some(&position) => {
                if let Some(slot) = records.get_mut(position) {
                    *slot = record;
                }
            }
            None => {
                positions.insert(event.description.as_str(), records.len());
                records.push(record);
            }
        }
    }

    records
}
