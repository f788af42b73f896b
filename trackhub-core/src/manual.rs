//! Operator-entered events read from the record store.

use std::sync::Arc;

use crate::model::{ShipmentRef, TrackingEvent};
use crate::ports::{ShipmentStore, StoreError};

/// Source of manual tracking events.
pub struct ManualEventSource {
    store: Arc<dyn ShipmentStore>,
}

impl ManualEventSource {
    /// Create a source backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ShipmentStore>) -> Self {
        Self { store }
    }

    /// Manual events of a shipment, most recent first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store cannot be read.
    pub async fn events(&self, shipment: &ShipmentRef) -> Result<Vec<TrackingEvent>, StoreError> {
        let mut records = self.store.manual_events(shipment.id).await?;
        records.sort_by(|left, right| right.happened_at.cmp(&left.happened_at));
        Ok(records.iter().map(TrackingEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{EventSource, ManualEvent, ShipmentId, TrackingNumber};
    use crate::store::{MemoryStore, StoreSnapshot};

    #[tokio::test]
    async fn newest_first_and_tagged_manual() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date");
        let at = |hour| day.and_hms_opt(hour, 0, 0).expect("valid time");
        let shipment = ShipmentRef {
            id: ShipmentId(1),
            tracking_number: TrackingNumber::from("M1"),
            carrier_shipment_id: None,
            agent_id: None,
            carrier_id: None,
            customer_id: None,
            created_at: at(0),
        };
        let entry = |shipment_id, hour, text: &str| ManualEvent {
            shipment_id: ShipmentId(shipment_id),
            happened_at: at(hour),
            location: None,
            description: text.to_owned(),
            author: Some("admin".to_owned()),
        };
        let store = MemoryStore::new(StoreSnapshot {
            agents: Vec::new(),
            shipments: vec![shipment.clone()],
            manual_events: vec![
                entry(1, 9, "received at warehouse"),
                entry(2, 10, "other shipment"),
                entry(1, 15, "handed to airline"),
            ],
        });

        let events = ManualEventSource::new(Arc::new(store))
            .events(&shipment)
            .await
            .expect("store ok");

        let texts: Vec<&str> = events.iter().map(|event| event.description.as_str()).collect();
        assert_eq!(texts, ["handed to airline", "received at warehouse"]);
        assert!(events.iter().all(|event| event.source == EventSource::Manual));
        assert!(events.iter().all(|event| event.location.is_empty()));
    }
}
