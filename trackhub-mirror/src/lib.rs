//! Downstream mirror backed by a PostgREST-style REST endpoint.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use trackhub_core::{
    model::{EventKey, MirrorRecord, TrackingNumber},
    ports::{MirrorError, MirrorPort},
};

const DEFAULT_EVENTS_TABLE: &str = "tracking_events";
const DEFAULT_SHIPMENTS_TABLE: &str = "shipments";

#[derive(Clone)]
/// Connection settings of the mirror.
pub struct MirrorSettings {
    /// REST root, e.g. `https://db.example.com/rest/v1`.
    pub base_url: String,
    /// Value of the `apikey` header.
    pub api_key: String,
    /// Bearer token.
    pub token: String,
    /// Table receiving one row per event.
    pub events_table: String,
    /// Table holding one row per shipment, with a `status` column.
    pub shipments_table: String,
}

impl MirrorSettings {
    /// Settings using the default table names.
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, token: &str) -> Self {
        Self {
            base_url: base_url.to_owned(),
            api_key: api_key.to_owned(),
            token: token.to_owned(),
            events_table: DEFAULT_EVENTS_TABLE.to_owned(),
            shipments_table: DEFAULT_SHIPMENTS_TABLE.to_owned(),
        }
    }
}

impl fmt::Debug for MirrorSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MirrorSettings")
            .field("base_url", &self.base_url)
            .field("events_table", &self.events_table)
            .field("shipments_table", &self.shipments_table)
            .finish_non_exhaustive()
    }
}

/// [`MirrorPort`] speaking to a REST table API.
pub struct RestMirror {
    client: Client,
    settings: MirrorSettings,
}

impl RestMirror {
    /// Create a mirror client bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: MirrorSettings) -> Self {
        Self { client, settings }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.settings.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.settings.api_key)
            .bearer_auth(&self.settings.token)
    }
}

#[async_trait]
impl MirrorPort for RestMirror {
    async fn contains(&self, key: &EventKey) -> Result<bool, MirrorError> {
        let req = self
            .client
            .get(self.table_url(&self.settings.events_table))
            .query(&[
                ("select", "tracking_number".to_owned()),
                ("tracking_number", eq(key.tracking_number.as_str())),
                ("description", eq(&key.description)),
                ("limit", "1".to_owned()),
            ]);

        let response = self.authorized(req).send().await.map_err(|err| network(&err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Status(status.as_u16()));
        }

        let rows: Value = response.json().await.map_err(|err| network(&err))?;
        Ok(rows.as_array().is_some_and(|rows| !rows.is_empty()))
    }

    async fn insert(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        let req = self
            .client
            .post(self.table_url(&self.settings.events_table))
            .header("Prefer", "return=minimal")
            .json(record);

        let response = self.authorized(req).send().await.map_err(|err| network(&err))?;
        let status = response.status();
        debug!(status = status.as_u16(), tracking_number = %record.tracking_number, "mirror_insert");

        match status {
            StatusCode::CONFLICT => Err(MirrorError::Conflict),
            status if status.is_success() => Ok(()),
            status => Err(MirrorError::Status(status.as_u16())),
        }
    }

    async fn update_status(
        &self,
        tracking_number: &TrackingNumber,
        status: &str,
    ) -> Result<(), MirrorError> {
        let req = self
            .client
            .patch(self.table_url(&self.settings.shipments_table))
            .query(&[("tracking_number", eq(tracking_number.as_str()))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "status": status }));

        let response = self.authorized(req).send().await.map_err(|err| network(&err))?;
        let code = response.status();
        if code.is_success() {
            Ok(())
        } else {
            Err(MirrorError::Status(code.as_u16()))
        }
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn network(err: &reqwest::Error) -> MirrorError {
    MirrorError::Network(err.to_string())
}
