//! Inbound event payloads.
//!
//! Serde models for the schema-2.0 `im.message.receive_v1` callback and
//! the envelope the long connection delivers it in.

use serde::Deserialize;

/// Event type this bot subscribes to.
pub const MESSAGE_RECEIVE_EVENT: &str = "im.message.receive_v1";

/// Envelope wrapping one pushed event. Header fields the bot does not
/// act on (schema, app_id, create_time) are left to serde to skip.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub header: EventHeader,
    #[serde(default)]
    pub event: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventHeader {
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub token: String,
}

/// `im.message.receive_v1` event body.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageReceiveEvent {
    #[serde(default)]
    pub sender: Option<EventSender>,
    pub message: EventMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSender {
    #[serde(default)]
    pub sender_id: Option<SenderId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderId {
    #[serde(default)]
    pub open_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub message_id: String,
    pub chat_id: String,
    #[serde(default)]
    pub chat_type: String,
    pub message_type: String,
    #[serde(default)]
    pub content: String,
}

/// A decoded inbound message, detached from the wire format.
///
/// One instance per received event; owned by the dispatch call and
/// discarded when handling completes.
#[derive(Debug, Clone)]
pub struct InboundMessageEvent {
    pub message_id: String,
    pub chat_id: String,
    pub chat_type: String,
    pub sender_id: String,
    pub message_type: String,
    /// Plain text extracted from the message content; empty for
    /// non-text content.
    pub text: String,
}

impl InboundMessageEvent {
    /// True for plain text messages posted in a group chat; everything
    /// else is ignored by the trigger handler.
    pub fn is_group_text(&self) -> bool {
        self.chat_type == "group" && self.message_type == "text"
    }

    /// Decode the `event` object of an `im.message.receive_v1` envelope.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let event: MessageReceiveEvent = serde_json::from_value(payload.clone())?;
        let sender_id = event
            .sender
            .and_then(|sender| sender.sender_id)
            .and_then(|sender_id| sender_id.open_id)
            .unwrap_or_default();

        Ok(Self {
            sender_id,
            text: extract_text(&event.message.content),
            message_id: event.message.message_id,
            chat_id: event.message.chat_id,
            chat_type: event.message.chat_type,
            message_type: event.message.message_type,
        })
    }
}

/// Pull the `text` field out of a message content blob.
///
/// Content arrives as a JSON string like `{"text":"..."}`; anything
/// unparsable yields an empty string rather than an error.
pub fn extract_text(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => value
            .get("text")
            .and_then(|text| text.as_str())
            .unwrap_or_default()
            .to_string(),
        Err(_) => String::new(),
    }
}
