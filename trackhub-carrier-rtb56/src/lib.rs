//! Carrier adapter for the rtb56 token/key tracking API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use trackhub_core::{
    model::{AdapterId, AdapterMeta, CarrierCredentials, CarrierEndpoint, TrackingEvent, TrackingRequest},
    plugin::{CarrierPlugin, UrlSignature},
    ports::{CarrierAdapter, TrackError},
    transport::{event_time, first_text, send_for_json, truthy},
};

/// URL fragment identifying agents served by this adapter.
pub const DOMAIN: &str = "rtb56.com";

const SERVICE_METHOD: &str = "gettrack";
const MESSAGE_FIELDS: [&str; 3] = ["cnmessage", "enmessage", "message"];

/// Tracking lookups against the rtb56 web service.
pub struct Rtb56Adapter {
    client: Client,
    meta: AdapterMeta,
}

impl Rtb56Adapter {
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
impl CarrierAdapter for Rtb56Adapter {
    fn meta(&self) -> &AdapterMeta {
        &self.meta
    }

    async fn fetch(
        &self,
        endpoint: &CarrierEndpoint,
        request: &TrackingRequest,
    ) -> Result<Vec<TrackingEvent>, TrackError> {
        let CarrierCredentials::TokenKey { app_token, app_key } = &endpoint.credentials else {
            return Err(TrackError::NotConfigured(format!(
                "rtb56 needs token_key credentials, got {}",
                endpoint.credentials.kind()
            )));
        };

        let params = json!({ "tracking_number": request.tracking_number.as_str() }).to_string();
        let req = self.client.post(&endpoint.base_url).form(&[
            ("appToken", app_token.as_str()),
            ("appKey", app_key.as_str()),
            ("serviceMethod", SERVICE_METHOD),
            ("paramsJson", params.as_str()),
        ]);

        let body = send_for_json(req).await?;
        let events = parse_tracks(&body)?;
        debug!(tracking_number = %request.tracking_number, count = events.len(), "rtb56_tracks");
        Ok(events)
    }
}

/// Build the plugin bundle for the rtb56 adapter.
#[must_use]
pub fn plugin(client: Client) -> CarrierPlugin {
    CarrierPlugin {
        meta: adapter_meta(),
        signature: UrlSignature::domain(DOMAIN),
        adapter: Arc::new(Rtb56Adapter::new(client)),
    }
}

fn adapter_meta() -> AdapterMeta {
    AdapterMeta {
        id: AdapterId(String::from("rtb56")),
        name: String::from("RTB56 token/key API"),
    }
}

/// Read a `gettrack` response: the `success` flag, then `data[0].details[]`.
fn parse_tracks(body: &Value) -> Result<Vec<TrackingEvent>, TrackError> {
    if !body.is_object() {
        return Err(TrackError::UpstreamFormat(
            "expected a JSON object".to_owned(),
        ));
    }

    if !truthy(body.get("success")) {
        let message = first_text(body, &MESSAGE_FIELDS)
            .unwrap_or_else(|| "carrier reported a failure without a message".to_owned());
        return Err(TrackError::UpstreamBusiness(message));
    }

    // A successful answer without details means the carrier has no events yet.
    let details = body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|shipments| shipments.first())
        .and_then(|shipment| shipment.get("details"))
        .and_then(Value::as_array);

    Ok(details
        .into_iter()
        .flatten()
        .filter(|detail| detail.is_object())
        .map(|detail| {
            TrackingEvent::api(
                event_time(detail.get("track_occur_date")),
                first_text(detail, &["track_location"]).unwrap_or_default(),
                first_text(detail, &["track_description"]).unwrap_or_default(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use trackhub_core::model::{EventTime, TrackingNumber};

    use super::*;

    fn endpoint(base_url: String) -> CarrierEndpoint {
        CarrierEndpoint {
            base_url,
            credentials: CarrierCredentials::TokenKey {
                app_token: "tok".to_owned(),
                app_key: "key".to_owned(),
            },
        }
    }

    fn request(number: &str) -> TrackingRequest {
        TrackingRequest {
            tracking_number: TrackingNumber::from(number),
            carrier_shipment_id: None,
        }
    }

    #[tokio::test]
    async fn posts_form_and_reads_details() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webservice/PublicService.asmx/ServiceInterfaceUTF8")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("appToken".into(), "tok".into()),
                Matcher::UrlEncoded("appKey".into(), "key".into()),
                Matcher::UrlEncoded("serviceMethod".into(), "gettrack".into()),
                Matcher::UrlEncoded(
                    "paramsJson".into(),
                    r#"{"tracking_number":"FBA15K9XQ"}"#.into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success":1,"cnmessage":"","data":[{"tracking_number":"FBA15K9XQ","details":[
                    {"track_occur_date":"2024-05-02 08:15:00","track_location":"Shenzhen","track_description":"Departed facility"},
                    {"track_occur_date":"2024-05-01 20:00:00","track_location":"","track_description":"Shipment information received"}
                ]}]}"#,
            )
            .create_async()
            .await;

        let adapter = Rtb56Adapter::new(Client::new());
        let events = adapter
            .fetch(
                &endpoint(format!(
                    "{}/webservice/PublicService.asmx/ServiceInterfaceUTF8",
                    server.url()
                )),
                &request("FBA15K9XQ"),
            )
            .await
            .expect("events");

        mock.assert_async().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].location, "Shenzhen");
        assert_eq!(events[0].description, "Departed facility");
        assert_eq!(
            events[0].occurred_at,
            EventTime::parse("2024-05-02 08:15:00")
        );
        assert_eq!(events[1].location, "");
    }

    #[tokio::test]
    async fn failure_message_comes_from_first_non_empty_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ws")
            .with_status(200)
            .with_body(r#"{"success":0,"cnmessage":"","enmessage":"Tracking number not found"}"#)
            .create_async()
            .await;

        let err = Rtb56Adapter::new(Client::new())
            .fetch(&endpoint(format!("{}/ws", server.url())), &request("X1"))
            .await
            .expect_err("business failure");

        assert_eq!(
            err,
            TrackError::UpstreamBusiness("Tracking number not found".to_owned())
        );
        assert_eq!(err.to_string(), "Tracking number not found");
    }

    #[tokio::test]
    async fn success_without_details_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ws")
            .with_status(200)
            .with_body(r#"{"success":true,"data":[]}"#)
            .create_async()
            .await;

        let events = Rtb56Adapter::new(Client::new())
            .fetch(&endpoint(format!("{}/ws", server.url())), &request("X1"))
            .await
            .expect("no events");

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn server_error_and_html_are_typed_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/down")
            .with_status(502)
            .create_async()
            .await;
        server
            .mock("POST", "/html")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;
        let adapter = Rtb56Adapter::new(Client::new());

        let down = adapter
            .fetch(&endpoint(format!("{}/down", server.url())), &request("X1"))
            .await;
        let html = adapter
            .fetch(&endpoint(format!("{}/html", server.url())), &request("X1"))
            .await;

        assert_eq!(
            down,
            Err(TrackError::Network("upstream returned HTTP 502".to_owned()))
        );
        assert!(matches!(html, Err(TrackError::UpstreamFormat(_))));
    }

    #[tokio::test]
    async fn wrong_credentials_kind_is_not_configured() {
        let endpoint = CarrierEndpoint {
            base_url: "http://127.0.0.1:9/ws".to_owned(),
            credentials: CarrierCredentials::Bearer {
                token: "t".to_owned(),
            },
        };

        let result = Rtb56Adapter::new(Client::new())
            .fetch(&endpoint, &request("X1"))
            .await;

        assert!(matches!(result, Err(TrackError::NotConfigured(_))));
    }

    #[test]
    fn plugin_matches_rtb56_urls() {
        let plugin = plugin(Client::new());

        assert!(plugin.signature.matches("http://ywsl.RTB56.com/webservice"));
        assert!(!plugin.signature.matches("https://api.nextsls.com/v1"));
        assert_eq!(plugin.adapter.meta().id.0, "rtb56");
    }
}
