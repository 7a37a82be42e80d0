//! Long-connection event stream.
//!
//! Asks the open platform for a websocket endpoint using the app
//! credentials, then holds the connection open: answers pings, acks
//! event envelopes, and hands decoded message events to the dispatcher.
//! Transport drops reconnect after a delay; a credential rejection is
//! fatal and bubbles up to terminate the process.

use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

use crate::bot::dispatcher::Dispatcher;
use crate::config::Config;
use crate::feishu::client::DEFAULT_API_BASE;
use crate::feishu::events::{EventEnvelope, InboundMessageEvent, MESSAGE_RECEIVE_EVENT};

const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PING_INTERVAL_SEC: u64 = 120;
const DEFAULT_RECONNECT_INTERVAL_SEC: u64 = 15;

/// Connection-level failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The platform refused the handshake, typically bad credentials.
    #[error("platform refused the connection: code={code} msg={msg}")]
    Rejected { code: i64, msg: String },

    #[error("endpoint response carried no usable websocket url")]
    MissingUrl,

    #[error("endpoint returned an invalid websocket url: {0:?}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
}

impl ConnectionError {
    /// Credential and handshake-shape errors cannot be retried;
    /// transport drops can.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::MissingUrl | Self::InvalidUrl(_)
        )
    }
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<EndpointData>,
}

#[derive(Debug, Deserialize)]
struct EndpointData {
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(rename = "ClientConfig", default)]
    client_config: Option<WsClientConfig>,
}

/// Tuning the platform hands back with the endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
struct WsClientConfig {
    #[serde(rename = "PingInterval", default)]
    ping_interval: Option<u64>,
    #[serde(rename = "ReconnectInterval", default)]
    reconnect_interval: Option<u64>,
}

#[derive(Debug)]
struct Endpoint {
    url: String,
    ping_interval: Duration,
    reconnect_interval: Duration,
}

/// Owns the long-lived connection to the event stream and keeps the
/// process alive. Reconnection is handled here; everything downstream
/// of a decoded event is the dispatcher's business.
pub struct LongConnClient {
    http: reqwest::Client,
    api_base: String,
    app_id: String,
    app_secret: String,
    verification_token: String,
    dispatcher: Dispatcher,
}

impl LongConnClient {
    pub fn new(config: &Config, dispatcher: Dispatcher) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(ENDPOINT_TIMEOUT)
            .build()
            .context("failed to build the endpoint http client")?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            verification_token: config.verification_token.clone(),
            dispatcher,
        })
    }

    /// Connect and listen until a fatal error. Returns only on fatal
    /// errors; transient drops are logged and retried here.
    pub async fn run(&self) -> Result<(), ConnectionError> {
        let mut reconnect_interval = Duration::from_secs(DEFAULT_RECONNECT_INTERVAL_SEC);
        loop {
            let endpoint = match self.open_endpoint().await {
                Ok(endpoint) => endpoint,
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!("failed to open long-connection endpoint: {error}");
                    sleep(reconnect_interval).await;
                    continue;
                }
            };
            reconnect_interval = endpoint.reconnect_interval;

            match self.run_session(&endpoint).await {
                Ok(()) => info!("long connection closed by server, reconnecting"),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => warn!("long connection dropped: {error}"),
            }
            sleep(reconnect_interval).await;
        }
    }

    async fn open_endpoint(&self) -> Result<Endpoint, ConnectionError> {
        let response: EndpointResponse = self
            .http
            .post(format!("{}/callback/ws/endpoint", self.api_base))
            .json(&json!({
                "AppID": self.app_id,
                "AppSecret": self.app_secret,
            }))
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(ConnectionError::Rejected {
                code: response.code,
                msg: response.msg,
            });
        }
        let data = response.data.ok_or(ConnectionError::MissingUrl)?;
        if data.url.is_empty() {
            return Err(ConnectionError::MissingUrl);
        }
        let parsed =
            Url::parse(&data.url).map_err(|_| ConnectionError::InvalidUrl(data.url.clone()))?;
        if parsed.scheme() != "wss" && parsed.scheme() != "ws" {
            return Err(ConnectionError::InvalidUrl(data.url));
        }

        let client_config = data.client_config.unwrap_or_default();
        Ok(Endpoint {
            url: data.url,
            ping_interval: Duration::from_secs(
                client_config
                    .ping_interval
                    .filter(|&secs| secs > 0)
                    .unwrap_or(DEFAULT_PING_INTERVAL_SEC),
            ),
            reconnect_interval: Duration::from_secs(
                client_config
                    .reconnect_interval
                    .filter(|&secs| secs > 0)
                    .unwrap_or(DEFAULT_RECONNECT_INTERVAL_SEC),
            ),
        })
    }

    async fn run_session(&self, endpoint: &Endpoint) -> Result<(), ConnectionError> {
        let (stream, _response) = connect_async(endpoint.url.as_str()).await?;
        let (mut sink, mut source) = stream.split();
        info!("long connection established");

        let mut heartbeat = tokio::time::interval(endpoint.ping_interval);
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    sink.send(WsMessage::Ping(Bytes::new())).await?;
                }
                maybe_frame = source.next() => {
                    let Some(frame) = maybe_frame else {
                        return Ok(());
                    };
                    match frame? {
                        WsMessage::Text(raw) => self.handle_frame(raw.as_str(), &mut sink).await?,
                        WsMessage::Ping(payload) => sink.send(WsMessage::Pong(payload)).await?,
                        WsMessage::Close(_) => return Ok(()),
                        WsMessage::Pong(_) | WsMessage::Binary(_) | WsMessage::Frame(_) => {}
                    }
                }
            }
        }
    }

    async fn handle_frame<S>(&self, raw: &str, sink: &mut S) -> Result<(), ConnectionError>
    where
        S: futures::Sink<WsMessage, Error = WsError> + Unpin,
    {
        let envelope: EventEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                debug!("ignoring undecodable frame: {error}");
                return Ok(());
            }
        };

        // Delivery is at-least-once; ack before handling so a slow
        // script cannot hold up redelivery of everything behind it.
        let ack = json!({ "event_id": envelope.header.event_id, "code": 0 }).to_string();
        sink.send(WsMessage::Text(ack.into())).await?;

        if envelope.header.token != self.verification_token {
            warn!(
                event_id = %envelope.header.event_id,
                "dropping event with mismatched verification token"
            );
            return Ok(());
        }

        if envelope.header.event_type != MESSAGE_RECEIVE_EVENT {
            debug!(
                event_type = %envelope.header.event_type,
                "ignoring unhandled event type"
            );
            return Ok(());
        }

        match InboundMessageEvent::from_payload(&envelope.event) {
            Ok(event) => self.dispatcher.dispatch(event),
            Err(error) => warn!(
                event_id = %envelope.header.event_id,
                "failed to decode message event: {error}"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_endpoint_response() {
        let raw = r#"{
            "code": 0,
            "msg": "success",
            "data": {
                "URL": "wss://open.feishu.cn/callback/ws/stream?device_id=d1",
                "ClientConfig": {
                    "ReconnectCount": 30,
                    "ReconnectInterval": 10,
                    "PingInterval": 60
                }
            }
        }"#;

        let response: EndpointResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.code, 0);

        let data = response.data.unwrap();
        assert!(data.url.starts_with("wss://"));
        let client_config = data.client_config.unwrap();
        assert_eq!(client_config.ping_interval, Some(60));
        assert_eq!(client_config.reconnect_interval, Some(10));
    }

    #[test]
    fn rejection_is_fatal_transport_is_not() {
        let rejected = ConnectionError::Rejected {
            code: 10003,
            msg: "invalid app_id or app_secret".to_string(),
        };
        assert!(rejected.is_fatal());
        assert!(ConnectionError::MissingUrl.is_fatal());
        assert!(ConnectionError::InvalidUrl("http://not-ws".to_string()).is_fatal());

        let transport = ConnectionError::WebSocket(WsError::ConnectionClosed);
        assert!(!transport.is_fatal());
    }
}
