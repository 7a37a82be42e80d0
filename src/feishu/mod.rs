//! Feishu open platform integration.
//!
//! The pieces a vendor SDK would otherwise provide: an HTTP API client
//! (tenant token, message send) and the long-connection event stream.

pub mod client;
pub mod events;
pub mod ws;

pub use client::{FeishuClient, MessageSender, SendError};
pub use events::InboundMessageEvent;
pub use ws::LongConnClient;
