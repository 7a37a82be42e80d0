//! Feishu open platform HTTP client.
//!
//! Covers the two API calls the bot makes on its own: fetching a tenant
//! access token and sending a text message to a chat. The token is
//! cached in-process and refreshed shortly before the platform-reported
//! expiry.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;

pub(crate) const DEFAULT_API_BASE: &str = "https://open.feishu.cn";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(120);
const TOKEN_DEFAULT_LIFETIME_SEC: u64 = 7200;

/// Failure to deliver an outbound message. Recoverable per event; the
/// caller logs it and moves on.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("platform rejected the request: code={code} msg={msg}")]
    Api { code: i64, msg: String },
}

#[derive(Debug, Deserialize)]
struct TenantTokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_after: Instant,
}

/// Message-send seam. The trigger handler talks to this trait so tests
/// can record sends without touching the network.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a plain text message to a chat.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), SendError>;
}

/// Authenticated client for the open platform REST API.
pub struct FeishuClient {
    http: reqwest::Client,
    api_base: String,
    app_id: String,
    app_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl FeishuClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build the Feishu http client")?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            token: Mutex::new(None),
        })
    }

    /// Tenant access token, fetched lazily and reused until shortly
    /// before expiry.
    async fn tenant_access_token(&self) -> Result<String, SendError> {
        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_after {
                return Ok(cached.value.clone());
            }
        }

        let response: TenantTokenResponse = self
            .http
            .post(format!(
                "{}/open-apis/auth/v3/tenant_access_token/internal",
                self.api_base
            ))
            .json(&json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret,
            }))
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(SendError::Api {
                code: response.code,
                msg: response.msg,
            });
        }
        let value = response.tenant_access_token.unwrap_or_default();
        if value.is_empty() {
            return Err(SendError::Api {
                code: response.code,
                msg: "response carried no tenant_access_token".to_string(),
            });
        }

        let lifetime = Duration::from_secs(response.expire.unwrap_or(TOKEN_DEFAULT_LIFETIME_SEC));
        *slot = Some(CachedToken {
            value: value.clone(),
            refresh_after: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        debug!("tenant access token refreshed");
        Ok(value)
    }
}

#[async_trait]
impl MessageSender for FeishuClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        let token = self.tenant_access_token().await?;
        let content = json!({ "text": text }).to_string();

        let response: SendMessageResponse = self
            .http
            .post(format!("{}/open-apis/im/v1/messages", self.api_base))
            .query(&[("receive_id_type", "chat_id")])
            .bearer_auth(token)
            .json(&json!({
                "receive_id": chat_id,
                "msg_type": "text",
                "content": content,
            }))
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(SendError::Api {
                code: response.code,
                msg: response.msg,
            });
        }
        debug!(chat_id, "message sent");
        Ok(())
    }
}
