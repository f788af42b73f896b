//! Carrier adapter for the nextsls shipment tracking API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use trackhub_core::{
    model::{AdapterId, AdapterMeta, CarrierCredentials, CarrierEndpoint, TrackingEvent, TrackingRequest},
    plugin::{CarrierPlugin, UrlSignature},
    ports::{CarrierAdapter, TrackError},
    transport::{event_time, first_text, send_for_json},
};

/// URL fragment identifying agents served by this adapter.
pub const DOMAIN: &str = "nextsls.com";

const LANGUAGE: &str = "zh";

/// Request body of the tracking call.
#[derive(Debug, Serialize)]
struct TrackBody<'a> {
    access_token: &'a str,
    shipment: ShipmentQuery<'a>,
}

/// Shipment selector; exactly one of the id fields is filled.
#[derive(Debug, Serialize)]
struct ShipmentQuery<'a> {
    shipment_id: &'a str,
    client_reference: &'a str,
    tracking_number: &'a str,
    parcel_number: &'a str,
    waybill_number: &'a str,
    language: &'a str,
}

/// `data` of a successful answer.
#[derive(Debug, Default, Deserialize)]
struct TrackData {
    #[serde(default)]
    shipment: Option<ShipmentTraces>,
}

#[derive(Debug, Default, Deserialize)]
struct ShipmentTraces {
    #[serde(default)]
    traces: Vec<Value>,
}

/// Tracking lookups against a nextsls tenant.
pub struct NextslsAdapter {
    client: Client,
    meta: AdapterMeta,
}

impl NextslsAdapter {
    /// Create a new adapter bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            meta: adapter_meta(),
        }
    }
}

#[async_trait]
impl CarrierAdapter for NextslsAdapter {
    fn meta(&self) -> &AdapterMeta {
        &self.meta
    }

    async fn fetch(
        &self,
        endpoint: &CarrierEndpoint,
        request: &TrackingRequest,
    ) -> Result<Vec<TrackingEvent>, TrackError> {
        let CarrierCredentials::Bearer { token } = &endpoint.credentials else {
            return Err(TrackError::NotConfigured(format!(
                "nextsls needs bearer credentials, got {}",
                endpoint.credentials.kind()
            )));
        };

        // Without the carrier's own id the customer reference is the best we have.
        let (shipment_id, client_reference) = match request.carrier_shipment_id.as_deref() {
            Some(id) if !id.trim().is_empty() => (id.trim(), ""),
            _ => {
                warn!(tracking_number = %request.tracking_number, "nextsls_shipment_id_missing");
                ("", request.tracking_number.as_str())
            }
        };

        let body = TrackBody {
            access_token: token,
            shipment: ShipmentQuery {
                shipment_id,
                client_reference,
                tracking_number: "",
                parcel_number: "",
                waybill_number: "",
                language: LANGUAGE,
            },
        };
        let req = self
            .client
            .post(&endpoint.base_url)
            .bearer_auth(token)
            .json(&body);

        let answer = send_for_json(req).await?;
        let events = parse_traces(&answer)?;
        debug!(tracking_number = %request.tracking_number, count = events.len(), "nextsls_traces");
        Ok(events)
    }
}

/// Build the plugin bundle for the nextsls adapter.
#[must_use]
pub fn plugin(client: Client) -> CarrierPlugin {
    CarrierPlugin {
        meta: adapter_meta(),
        signature: UrlSignature::domain(DOMAIN),
        adapter: Arc::new(NextslsAdapter::new(client)),
    }
}

fn adapter_meta() -> AdapterMeta {
    AdapterMeta {
        id: AdapterId(String::from("nextsls")),
        name: String::from("NextSLS shipment API"),
    }
}

fn succeeded(status: Option<&Value>) -> bool {
    match status {
        Some(Value::Number(number)) => number.as_i64() == Some(1),
        Some(Value::String(text)) => text.trim() == "1",
        _ => false,
    }
}

/// Read an answer: `status == 1`, then `data.shipment.traces[]`.
fn parse_traces(answer: &Value) -> Result<Vec<TrackingEvent>, TrackError> {
    if !answer.is_object() {
        return Err(TrackError::UpstreamFormat(
            "expected a JSON object".to_owned(),
        ));
    }

    if !succeeded(answer.get("status")) {
        let message = first_text(answer, &["info"])
            .unwrap_or_else(|| "carrier reported a failure without a message".to_owned());
        return Err(TrackError::UpstreamBusiness(message));
    }

    let data = match answer.get("data") {
        None | Some(Value::Null) => TrackData::default(),
        Some(data) => serde_json::from_value(data.clone())
            .map_err(|err| TrackError::UpstreamFormat(format!("unexpected `data`: {err}")))?,
    };

    Ok(data
        .shipment
        .unwrap_or_default()
        .traces
        .iter()
        .filter(|trace| trace.is_object())
        .map(|trace| {
            TrackingEvent::api(
                event_time(trace.get("time")),
                first_text(trace, &["location"]).unwrap_or_default(),
                first_text(trace, &["info"]).unwrap_or_default(),
            )
        })
        .collect())
}
