//! In-memory record store loaded from a JSON snapshot.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{AgentId, AgentProfile, ManualEvent, ShipmentId, ShipmentRef, TrackingNumber};
use crate::ports::{ShipmentFilter, ShipmentStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// Serializable content of the record store.
pub struct StoreSnapshot {
    /// Configured agents, active or not.
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
    /// Shipment records.
    #[serde(default)]
    pub shipments: Vec<ShipmentRef>,
    /// Operator-entered events.
    #[serde(default)]
    pub manual_events: Vec<ManualEvent>,
}

/// [`ShipmentStore`] kept entirely in memory.
pub struct MemoryStore {
    state: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    /// Create a store holding the given records.
    #[must_use]
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Parse a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the document is not a valid snapshot.
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        let snapshot = serde_json::from_str(raw)
            .map_err(|err| StoreError::Backend(format!("invalid snapshot: {err}")))?;
        Ok(Self::new(snapshot))
    }

    /// Copy of the current records.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().clone()
    }

    /// Render the current records as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if serialization fails.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(&*self.state.read())
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn shipment_by_tracking_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> Result<Option<ShipmentRef>, StoreError> {
        Ok(self
            .state
            .read()
            .shipments
            .iter()
            .find(|shipment| &shipment.tracking_number == tracking_number)
            .cloned())
    }

    async fn agent(&self, id: AgentId) -> Result<Option<AgentProfile>, StoreError> {
        Ok(self
            .state
            .read()
            .agents
            .iter()
            .find(|agent| agent.id == id)
            .cloned())
    }

    async fn manual_events(&self, shipment: ShipmentId) -> Result<Vec<ManualEvent>, StoreError> {
        Ok(self
            .state
            .read()
            .manual_events
            .iter()
            .filter(|event| event.shipment_id == shipment)
            .cloned()
            .collect())
    }

    async fn shipments_matching(
        &self,
        filter: &ShipmentFilter,
    ) -> Result<Vec<ShipmentRef>, StoreError> {
        Ok(self
            .state
            .read()
            .shipments
            .iter()
            .filter(|shipment| filter.matches(shipment))
            .cloned()
            .collect())
    }

    async fn deactivate_agent(&self, id: AgentId) -> Result<usize, StoreError> {
        let mut state = self.state.write();

        state
            .agents
            .iter_mut()
            .find(|agent| agent.id == id)
            .ok_or(StoreError::AgentNotFound(id))?
            .deactivate()?;

        let mut unlinked = 0;
        for shipment in &mut state.shipments {
            if shipment.agent_id == Some(id) {
                shipment.agent_id = None;
                unlinked += 1;
            }
        }

        Ok(unlinked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentStatus;

    const SNAPSHOT: &str = r#"{
        "agents": [
            {"id": 1, "name": "rtb", "base_url": "http://ywsl.rtb56.com/ws",
             "credentials": {"kind": "token_key", "app_token": "t", "app_key": "k"}}
        ],
        "shipments": [
            {"id": 10, "tracking_number": "FBA1", "agent_id": 1, "customer_id": 5,
             "created_at": "2024-03-01T08:00:00"},
            {"id": 11, "tracking_number": "FBA2", "agent_id": 1,
             "created_at": "2024-03-02T08:00:00"},
            {"id": 12, "tracking_number": "LOCAL", "created_at": "2024-03-03T08:00:00"}
        ]
    }"#;

    #[tokio::test]
    async fn snapshot_defaults_apply() {
        let store = MemoryStore::from_json(SNAPSHOT).expect("valid snapshot");
        let agent = store
            .agent(AgentId(1))
            .await
            .expect("store ok")
            .expect("agent present");

        assert!(agent.supports_api);
        assert_eq!(agent.status, AgentStatus::Active);
        assert!(store.snapshot().manual_events.is_empty());
    }

    #[tokio::test]
    async fn deactivation_unlinks_dependents_once() {
        let store = MemoryStore::from_json(SNAPSHOT).expect("valid snapshot");

        assert_eq!(store.deactivate_agent(AgentId(1)).await, Ok(2));
        assert_eq!(
            store.deactivate_agent(AgentId(1)).await,
            Err(StoreError::AlreadyDeactivated(AgentId(1)))
        );
        assert_eq!(
            store.deactivate_agent(AgentId(9)).await,
            Err(StoreError::AgentNotFound(AgentId(9)))
        );

        let linked = store
            .shipments_matching(&ShipmentFilter {
                requires_agent: true,
                ..ShipmentFilter::default()
            })
            .await
            .expect("store ok");
        assert!(linked.is_empty());
    }

    #[tokio::test]
    async fn filter_by_customer() {
        let store = MemoryStore::from_json(SNAPSHOT).expect("valid snapshot");
        let shipments = store
            .shipments_matching(&ShipmentFilter {
                customer_id: Some(crate::model::CustomerId(5)),
                ..ShipmentFilter::default()
            })
            .await
            .expect("store ok");

        assert_eq!(shipments.len(), 1);
        assert_eq!(shipments[0].tracking_number.as_str(), "FBA1");
    }

    #[test]
    fn rejects_malformed_snapshot() {
        assert!(matches!(
            MemoryStore::from_json("{\"agents\": 3}"),
            Err(StoreError::Backend(_))
        ));
    }
}
