//! HTTP and JSON helpers shared by carrier adapters.

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::model::EventTime;
use crate::ports::TrackError;

/// Send a request and decode its body as JSON.
///
/// Anything other than `200 OK` and any body that is not JSON become a
/// [`TrackError`]; nothing is raised past this point.
///
/// # Errors
///
/// [`TrackError::Network`] for transport failures, timeouts and non-200
/// statuses; [`TrackError::UpstreamFormat`] for bodies that are not JSON.
pub async fn send_for_json(request: RequestBuilder) -> Result<Value, TrackError> {
    let response = request.send().await?;
    let status = response.status();
    debug!(status = status.as_u16(), "carrier_response");

    if status != StatusCode::OK {
        return Err(TrackError::Network(format!(
            "upstream returned HTTP {}",
            status.as_u16()
        )));
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|err| TrackError::UpstreamFormat(format!("body is not JSON: {err}")))
}

/// Scalar rendered as trimmed text; empty strings, objects and arrays give `None`.
#[must_use]
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// First field of `object` holding non-empty text.
#[must_use]
pub fn first_text(object: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| object.get(field).and_then(text_of))
}

/// Interpret a boolean-like flag: `true`, non-zero numbers, `"true"`, `"1"`, `"yes"`.
#[must_use]
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|raw| raw != 0.0),
        Some(Value::String(text)) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "success"
        ),
        _ => false,
    }
}

/// Event time from a JSON value: integers are epoch seconds, strings are parsed
/// best-effort.
#[must_use]
pub fn event_time(value: Option<&Value>) -> Option<EventTime> {
    match value? {
        Value::Number(number) => number.as_i64().and_then(EventTime::from_epoch_seconds),
        Value::String(text) => EventTime::parse(text),
        _ => None,
    }
}
