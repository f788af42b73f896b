//! Traits describing carrier, record store and mirror interfaces, plus their errors.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Error as ReqwestError;

use crate::model::{
    AdapterMeta, AgentId, AgentProfile, CarrierEndpoint, CustomerId, EventKey, ManualEvent,
    MirrorRecord, ShipmentId, ShipmentRef, TrackingEvent, TrackingNumber, TrackingRequest,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors produced while resolving tracking for a number.
///
/// The type is `Clone` because failed lookups are cached like successful ones.
pub enum TrackError {
    /// Transport failed: timeout, refused connection, or a non-200 status.
    #[error("Network error: {0}")]
    Network(String),
    /// The carrier answered with something that is not the expected JSON.
    #[error("Unrecognized upstream response: {0}")]
    UpstreamFormat(String),
    /// The carrier reported a structured failure; the message is shown as is.
    #[error("{0}")]
    UpstreamBusiness(String),
    /// No adapter, agent or carrier could be resolved.
    #[error("Not configured: {0}")]
    NotConfigured(String),
    /// Shipment or agent records could not be read.
    #[error("Record store error: {0}")]
    Store(String),
}

impl From<StoreError> for TrackError {
    fn from(err: StoreError) -> Self {
        TrackError::Store(err.to_string())
    }
}

impl From<ReqwestError> for TrackError {
    fn from(err: ReqwestError) -> Self {
        if err.is_timeout() {
            TrackError::Network("request timed out".to_owned())
        } else if let Some(status) = err.status() {
            TrackError::Network(format!("upstream returned HTTP {}", status.as_u16()))
        } else if err.is_decode() {
            TrackError::UpstreamFormat(err.to_string())
        } else {
            TrackError::Network(err.to_string())
        }
    }
}

/// Outcome of one adapter call, cached as a unit.
pub type FetchOutcome = Result<Vec<TrackingEvent>, TrackError>;

#[async_trait]
/// Strategy for one carrier API family.
pub trait CarrierAdapter: Send + Sync {
    /// Metadata describing the adapter.
    fn meta(&self) -> &AdapterMeta;

    /// Fetch and normalize the events of one shipment.
    ///
    /// # Errors
    ///
    /// Every failure, including transport errors and malformed bodies, is
    /// returned as a [`TrackError`]; adapters never panic on upstream input.
    async fn fetch(
        &self,
        endpoint: &CarrierEndpoint,
        request: &TrackingRequest,
    ) -> Result<Vec<TrackingEvent>, TrackError>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised by the shipment/agent record store.
pub enum StoreError {
    /// No agent with that id.
    #[error("Agent {0} not found")]
    AgentNotFound(AgentId),
    /// Agent was deactivated before.
    #[error("Agent {0} is already deactivated")]
    AlreadyDeactivated(AgentId),
    /// Storage backend failed.
    #[error("Store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Default)]
/// Filter for listing shipments.
pub struct ShipmentFilter {
    /// Only shipments of this customer.
    pub customer_id: Option<CustomerId>,
    /// Only shipments linked to this agent.
    pub agent_id: Option<AgentId>,
    /// Only shipments created at or after this time.
    pub created_since: Option<NaiveDateTime>,
    /// Only shipments linked to some agent.
    pub requires_agent: bool,
}

impl ShipmentFilter {
    /// Whether a shipment passes the filter.
    #[must_use]
    pub fn matches(&self, shipment: &ShipmentRef) -> bool {
        self.customer_id.is_none_or(|customer| shipment.customer_id == Some(customer))
            && self.agent_id.is_none_or(|agent| shipment.agent_id == Some(agent))
            && self
                .created_since
                .is_none_or(|since| shipment.created_at >= since)
            && (!self.requires_agent || shipment.agent_id.is_some())
    }
}

#[async_trait]
/// Read access to shipment, agent and manual event records.
pub trait ShipmentStore: Send + Sync {
    /// Look a shipment up by its customer-facing number.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    async fn shipment_by_tracking_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> Result<Option<ShipmentRef>, StoreError>;

    /// Load an agent by id, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    async fn agent(&self, id: AgentId) -> Result<Option<AgentProfile>, StoreError>;

    /// Operator-entered events of a shipment, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    async fn manual_events(&self, shipment: ShipmentId) -> Result<Vec<ManualEvent>, StoreError>;

    /// Shipments passing the filter, in store order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    async fn shipments_matching(
        &self,
        filter: &ShipmentFilter,
    ) -> Result<Vec<ShipmentRef>, StoreError>;

    /// Deactivate an agent and unlink all of its shipments in one step.
    /// Returns the number of shipments unlinked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AgentNotFound`] or [`StoreError::AlreadyDeactivated`].
    async fn deactivate_agent(&self, id: AgentId) -> Result<usize, StoreError>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised by the downstream mirror.
pub enum MirrorError {
    /// Mirror could not be reached.
    #[error("Mirror unreachable: {0}")]
    Network(String),
    /// Mirror answered with a non-2xx status.
    #[error("Mirror returned HTTP {0}")]
    Status(u16),
    /// Row already exists.
    #[error("Mirror row already exists")]
    Conflict,
}

#[async_trait]
/// External store mirroring pushed tracking events.
pub trait MirrorPort: Send + Sync {
    /// Point lookup on the event identity.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`] when the lookup cannot be answered.
    async fn contains(&self, key: &EventKey) -> Result<bool, MirrorError>;

    /// Insert one event row.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Conflict`] when the row exists, or another
    /// [`MirrorError`] when the write fails.
    async fn insert(&self, record: &MirrorRecord) -> Result<(), MirrorError>;

    /// Record the latest known status of a shipment.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`] when the update fails.
    async fn update_status(
        &self,
        tracking_number: &TrackingNumber,
        status: &str,
    ) -> Result<(), MirrorError>;
}
