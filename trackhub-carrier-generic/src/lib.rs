//! Fallback carrier adapter for APIs without a dedicated implementation.
//!
//! The request carries the tracking number plus whatever credentials the
//! agent has; the answer is searched for a track list under a few common
//! field names.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use trackhub_core::{
    model::{AdapterId, AdapterMeta, CarrierCredentials, CarrierEndpoint, TrackingEvent, TrackingRequest},
    plugin::{CarrierPlugin, UrlSignature},
    ports::{CarrierAdapter, TrackError},
    transport::{event_time, first_text, send_for_json},
};

const TIME_FIELDS: [&str; 6] = [
    "time",
    "track_occur_date",
    "occurred_at",
    "datetime",
    "date",
    "timestamp",
];
const LOCATION_FIELDS: [&str; 4] = ["location", "track_location", "place", "city"];
const DESCRIPTION_FIELDS: [&str; 6] = [
    "description",
    "track_description",
    "info",
    "status",
    "content",
    "desc",
];

/// Best-effort adapter, matched by every URL.
pub struct GenericAdapter {
    client: Client,
    meta: AdapterMeta,
}

impl GenericAdapter {
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
impl CarrierAdapter for GenericAdapter {
    fn meta(&self) -> &AdapterMeta {
        &self.meta
    }

    async fn fetch(
        &self,
        endpoint: &CarrierEndpoint,
        request: &TrackingRequest,
    ) -> Result<Vec<TrackingEvent>, TrackError> {
        let number = request.tracking_number.as_str();
        let req = self.client.post(&endpoint.base_url);
        let req = match &endpoint.credentials {
            CarrierCredentials::TokenKey { app_token, app_key } => req.form(&[
                ("appKey", app_key.as_str()),
                ("appToken", app_token.as_str()),
                ("tracking_number", number),
            ]),
            CarrierCredentials::Bearer { token } => {
                req.bearer_auth(token).form(&[("tracking_number", number)])
            }
            CarrierCredentials::Basic { username, password } => req
                .basic_auth(username, Some(password))
                .form(&[("tracking_number", number)]),
        };

        let answer = send_for_json(req).await?;
        let events = parse_tracks(&answer)?;
        debug!(tracking_number = %request.tracking_number, count = events.len(), "generic_tracks");
        Ok(events)
    }
}

/// Build the plugin bundle for the fallback adapter.
#[must_use]
pub fn plugin(client: Client) -> CarrierPlugin {
    CarrierPlugin {
        meta: adapter_meta(),
        signature: UrlSignature::Any,
        adapter: Arc::new(GenericAdapter::new(client)),
    }
}

fn adapter_meta() -> AdapterMeta {
    AdapterMeta {
        id: AdapterId(String::from("generic")),
        name: String::from("Generic JSON API"),
    }
}

/// Pick the track list: `tracks`, then a non-empty `data`, then `result.list`.
fn locate_tracks(answer: &Value) -> Option<(&'static str, &Value)> {
    if let Some(tracks) = answer.get("tracks") {
        return Some(("tracks", tracks));
    }
    if let Some(data) = answer.get("data").filter(|data| !is_blank(data)) {
        return Some(("data", data));
    }
    answer
        .get("result")
        .filter(|result| result.is_object())
        .and_then(|result| result.get("list"))
        .map(|list| ("result.list", list))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Number(number) => number.as_f64() == Some(0.0),
    }
}

fn parse_tracks(answer: &Value) -> Result<Vec<TrackingEvent>, TrackError> {
    let Some((field, tracks)) = locate_tracks(answer) else {
        return Err(TrackError::UpstreamFormat(
            "no recognizable track field".to_owned(),
        ));
    };

    let items = match tracks {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(TrackError::UpstreamFormat(format!(
                "`{field}` is not a list"
            )));
        }
    };

    Ok(items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| {
            TrackingEvent::api(
                TIME_FIELDS
                    .iter()
                    .find_map(|name| event_time(item.get(name))),
                first_text(item, &LOCATION_FIELDS).unwrap_or_default(),
                first_text(item, &DESCRIPTION_FIELDS).unwrap_or_default(),
            )
        })
        .collect())
}
