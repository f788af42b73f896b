//! Domain data structures for shipments, agents, carriers and tracking events.

use std::cmp::Reverse;
use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ports::StoreError;

/// Rendering of epoch timestamps and operator-entered times.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Layouts observed in carrier payloads, tried in order.
const CARRIER_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Customer-facing tracking number of a shipment.
pub struct TrackingNumber(pub String);

impl TrackingNumber {
    /// Borrow the raw number.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for TrackingNumber {
    fn from(raw: &str) -> Self {
        TrackingNumber(raw.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Primary key of a shipment record.
pub struct ShipmentId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Primary key of a configured agent.
pub struct AgentId(pub i64);

impl fmt::Display for AgentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Primary key of a customer.
pub struct CustomerId(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Environment-level carrier identifier, independent of any agent (e.g. `rtb56`).
pub struct CarrierId(pub String);

impl fmt::Display for CarrierId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
/// Time at which a tracking event happened.
///
/// Carrier text is always shown as the carrier sent it; the parsed value only
/// orders events. Anything that does not parse is kept verbatim.
pub enum EventTime {
    /// Time without carrier text, from epoch seconds or a manual entry.
    Parsed(NaiveDateTime),
    /// Carrier text understood by one of the known layouts.
    Reported {
        /// Wall-clock time used for ordering.
        at: NaiveDateTime,
        /// Text as received.
        raw: String,
    },
    /// Carrier text that could not be interpreted.
    Raw(String),
}

impl EventTime {
    /// Interpret a carrier-provided time string. Blank input yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let parsed = CARRIER_TIME_FORMATS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
            .or_else(|| {
                DateTime::parse_from_rfc3339(trimmed)
                    .ok()
                    .map(|instant| instant.naive_local())
            });

        let raw = trimmed.to_owned();
        Some(match parsed {
            Some(at) => EventTime::Reported { at, raw },
            None => EventTime::Raw(raw),
        })
    }

    /// Convert integer epoch seconds (UTC).
    #[must_use]
    pub fn from_epoch_seconds(seconds: i64) -> Option<Self> {
        DateTime::from_timestamp(seconds, 0).map(|instant| EventTime::Parsed(instant.naive_utc()))
    }

    /// Ordering key; raw strings have none and sort after every parsed time.
    #[must_use]
    pub fn sort_key(&self) -> Option<NaiveDateTime> {
        match self {
            EventTime::Parsed(at) | EventTime::Reported { at, .. } => Some(*at),
            EventTime::Raw(_) => None,
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Parsed(at) => write!(formatter, "{}", at.format(EVENT_TIME_FORMAT)),
            EventTime::Reported { raw, .. } | EventTime::Raw(raw) => formatter.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Where a tracking event came from.
pub enum EventSource {
    /// Returned by a carrier API.
    Api,
    /// Entered by an operator.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Normalized tracking event shared by every source.
pub struct TrackingEvent {
    /// When it happened, if the source said so.
    pub occurred_at: Option<EventTime>,
    /// Free-form location, empty when unknown.
    pub location: String,
    /// Human-readable status text. Part of the dedup identity.
    pub description: String,
    /// Provenance of the event.
    pub source: EventSource,
}

impl TrackingEvent {
    /// Build an event reported by a carrier API.
    #[must_use]
    pub fn api(
        occurred_at: Option<EventTime>,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            occurred_at,
            location: location.into(),
            description: description.into(),
            source: EventSource::Api,
        }
    }
}

impl fmt::Display for TrackingEvent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self
            .occurred_at
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        write!(formatter, "{time} {} {}", self.location, self.description)
    }
}

/// Order events newest first. Events without a usable time go last; ties keep
/// their input order.
pub fn sort_newest_first(events: &mut [TrackingEvent]) {
    events.sort_by_key(|event| {
        Reverse(
            event
                .occurred_at
                .as_ref()
                .and_then(EventTime::sort_key),
        )
    });
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Credentials for a carrier API, chosen once when the agent is configured.
pub enum CarrierCredentials {
    /// Application token plus application key, sent as form fields.
    TokenKey {
        /// Application token.
        app_token: String,
        /// Application key.
        app_key: String,
    },
    /// Single access token sent as a bearer `Authorization` header.
    Bearer {
        /// Access token.
        token: String,
    },
    /// HTTP basic authentication.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
}

impl CarrierCredentials {
    /// Short name of the credential scheme, safe to log.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CarrierCredentials::TokenKey { .. } => "token_key",
            CarrierCredentials::Bearer { .. } => "bearer",
            CarrierCredentials::Basic { .. } => "basic",
        }
    }
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for CarrierCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "CarrierCredentials::{}(..)", self.kind())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Lifecycle of an agent. Agents are never hard-deleted.
pub enum AgentStatus {
    /// Usable for lookups.
    #[default]
    Active,
    /// Soft-deleted; kept for shipment history only.
    Deactivated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Configured account used to call a carrier API on behalf of the business.
pub struct AgentProfile {
    /// Primary key.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Carrier endpoint; also decides which adapter is used.
    pub base_url: String,
    /// Credentials for the endpoint.
    pub credentials: CarrierCredentials,
    /// When false the agent is tracked manually only.
    #[serde(default = "default_supports_api")]
    pub supports_api: bool,
    /// Soft-delete state.
    #[serde(default)]
    pub status: AgentStatus,
}

fn default_supports_api() -> bool {
    true
}

impl AgentProfile {
    /// Whether the agent may be used for outbound API calls.
    #[must_use]
    pub fn api_enabled(&self) -> bool {
        self.supports_api && self.status == AgentStatus::Active && !self.base_url.trim().is_empty()
    }

    /// Move the agent from `Active` to `Deactivated`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyDeactivated`] if the agent was deactivated before.
    pub fn deactivate(&mut self) -> Result<(), StoreError> {
        match self.status {
            AgentStatus::Active => {
                self.status = AgentStatus::Deactivated;
                Ok(())
            }
            AgentStatus::Deactivated => Err(StoreError::AlreadyDeactivated(self.id)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Carrier configured at environment level and addressed by [`CarrierId`].
pub struct CarrierConfig {
    /// Identifier referenced by shipments and hints.
    pub id: CarrierId,
    /// Display name.
    pub name: String,
    /// Carrier endpoint.
    pub base_url: String,
    /// Credentials for the endpoint.
    pub credentials: CarrierCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Shipment record as seen by the tracking layer.
pub struct ShipmentRef {
    /// Primary key.
    pub id: ShipmentId,
    /// Customer-facing number.
    pub tracking_number: TrackingNumber,
    /// Carrier-internal id, required by carriers that look shipments up by reference.
    #[serde(default)]
    pub carrier_shipment_id: Option<String>,
    /// Owning agent, if any.
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    /// Environment carrier, used when no agent is linked.
    #[serde(default)]
    pub carrier_id: Option<CarrierId>,
    /// Customer the shipment belongs to.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    /// Creation time of the record.
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Operator-entered status update for a shipment.
pub struct ManualEvent {
    /// Shipment the event belongs to.
    pub shipment_id: ShipmentId,
    /// When it happened.
    pub happened_at: NaiveDateTime,
    /// Optional location.
    #[serde(default)]
    pub location: Option<String>,
    /// Status text.
    pub description: String,
    /// Who entered it.
    #[serde(default)]
    pub author: Option<String>,
}

impl From<&ManualEvent> for TrackingEvent {
    fn from(manual: &ManualEvent) -> Self {
        Self {
            occurred_at: Some(EventTime::Parsed(manual.happened_at)),
            location: manual.location.clone().unwrap_or_default(),
            description: manual.description.clone(),
            source: EventSource::Manual,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Optional hints supplied with a query.
///
/// Agent and carrier hints only matter when no shipment record exists for a
/// number. The customer hint narrows the shipment list when no numbers are given.
pub struct TrackingHints {
    /// Explicit agent.
    pub agent_id: Option<AgentId>,
    /// Explicit environment carrier.
    pub carrier_id: Option<CarrierId>,
    /// Customer filter.
    pub customer_id: Option<CustomerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier of a carrier adapter family (e.g. `rtb56`, `generic`).
pub struct AdapterId(pub String);

impl fmt::Display for AdapterId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a carrier adapter.
pub struct AdapterMeta {
    /// Unique identifier.
    pub id: AdapterId,
    /// Human-friendly name.
    pub name: String,
}

#[derive(Debug, Clone)]
/// Where and how to call a carrier: taken from an agent or an environment carrier.
pub struct CarrierEndpoint {
    /// Carrier endpoint URL.
    pub base_url: String,
    /// Credentials for the endpoint.
    pub credentials: CarrierCredentials,
}

impl From<&AgentProfile> for CarrierEndpoint {
    fn from(agent: &AgentProfile) -> Self {
        Self {
            base_url: agent.base_url.clone(),
            credentials: agent.credentials.clone(),
        }
    }
}

impl From<&CarrierConfig> for CarrierEndpoint {
    fn from(carrier: &CarrierConfig) -> Self {
        Self {
            base_url: carrier.base_url.clone(),
            credentials: carrier.credentials.clone(),
        }
    }
}

#[derive(Debug, Clone)]
/// Shipment identity handed to an adapter.
pub struct TrackingRequest {
    /// Customer-facing number.
    pub tracking_number: TrackingNumber,
    /// Carrier-internal id from the shipment record, when known.
    pub carrier_shipment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Identity of an event in the downstream mirror.
///
/// Location and time are deliberately excluded: carriers resend the same
/// physical event with reformatted timestamps.
pub struct EventKey {
    /// Shipment number.
    pub tracking_number: TrackingNumber,
    /// Event text.
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
/// Row written to the downstream mirror.
pub struct MirrorRecord {
    /// Shipment number.
    pub tracking_number: String,
    /// Event text.
    pub description: String,
    /// Event location.
    pub location: String,
    /// Event time as displayed, if any.
    pub occurred_at: Option<String>,
    /// Provenance.
    pub source: EventSource,
}

impl MirrorRecord {
    /// Build the mirror row for an event of the given shipment.
    #[must_use]
    pub fn new(tracking_number: &TrackingNumber, event: &TrackingEvent) -> Self {
        Self {
            tracking_number: tracking_number.0.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            occurred_at: event.occurred_at.as_ref().map(ToString::to_string),
            source: event.source,
        }
    }

    /// Identity of the row.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            tracking_number: TrackingNumber(self.tracking_number.clone()),
            description: self.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|day| day.and_hms_opt(hour, 0, 0))
            .expect("valid test time")
    }

    #[test]
    fn parses_known_layouts_and_keeps_unknown_text() {
        let slashed = EventTime::parse("2024/03/01 08:00:00").expect("not blank");
        assert_eq!(slashed.sort_key(), Some(at(8)));
        assert_eq!(slashed.to_string(), "2024/03/01 08:00:00");
        assert_eq!(
            EventTime::parse("2024-03-01 08:00").and_then(|time| time.sort_key()),
            Some(at(8))
        );
        assert_eq!(
            EventTime::parse(" yesterday evening "),
            Some(EventTime::Raw("yesterday evening".to_owned()))
        );
        assert_eq!(EventTime::parse("   "), None);
    }

    #[test]
    fn offsets_stay_in_the_rendered_text() {
        let time = EventTime::parse("2024-03-01T08:00:00+08:00").expect("not blank");

        assert_eq!(time.sort_key(), Some(at(8)));
        assert_eq!(time.to_string(), "2024-03-01T08:00:00+08:00");
    }

    #[test]
    fn epoch_seconds_render_in_fixed_format() {
        let time = EventTime::from_epoch_seconds(1_709_280_000).expect("in range");
        assert_eq!(time.to_string(), "2024-03-01 08:00:00");
    }

    #[test]
    fn newest_first_puts_unparsed_times_last_and_is_stable() {
        let mut events = vec![
            TrackingEvent::api(Some(EventTime::Raw("soon".into())), "", "raw"),
            TrackingEvent::api(Some(EventTime::Parsed(at(1))), "", "old"),
            TrackingEvent::api(None, "", "untimed"),
            TrackingEvent::api(Some(EventTime::Parsed(at(5))), "", "new"),
        ];

        sort_newest_first(&mut events);

        let order: Vec<&str> = events.iter().map(|event| event.description.as_str()).collect();
        assert_eq!(order, ["new", "old", "raw", "untimed"]);
    }

    #[test]
    fn deactivation_is_one_way() {
        let mut agent = AgentProfile {
            id: AgentId(3),
            name: "demo".into(),
            base_url: "https://api.example.com".into(),
            credentials: CarrierCredentials::Bearer {
                token: "secret".into(),
            },
            supports_api: true,
            status: AgentStatus::Active,
        };

        assert!(agent.api_enabled());
        assert!(agent.deactivate().is_ok());
        assert!(!agent.api_enabled());
        assert!(matches!(
            agent.deactivate(),
            Err(StoreError::AlreadyDeactivated(AgentId(3)))
        ));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let credentials = CarrierCredentials::TokenKey {
            app_token: "tok-123".into(),
            app_key: "key-456".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("tok-123"));
        assert!(rendered.contains("token_key"));
    }
}
