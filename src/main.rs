//! Tripwire - Feishu group-message script trigger.
//!
//! Subscribes to the platform's long-connection event stream, matches
//! group text messages against a configured regular expression, and
//! runs a local script when a message matches.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `matcher` - Compiled match pattern
//! - `script` - Subprocess execution with timeout
//! - `feishu` - Open platform API client and long-connection worker
//! - `bot` - Dispatch and runtime
//! - `events` - Event handlers (extensible)

mod bot;
mod config;
mod events;
mod feishu;
mod matcher;
mod script;

use std::sync::Arc;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use feishu::{FeishuClient, LongConnClient};
use matcher::PatternMatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // Initialize logging: RUST_LOG wins, then LOG_LEVEL, then info
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tripwire={default_level}")));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting tripwire bot...");

    // Load configuration; any validation error aborts here, before a
    // connection is attempted.
    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    debug!("{:?}", config);

    let matcher = PatternMatcher::compile(&config.match_pattern)?;
    info!("Match pattern compiled: {}", matcher.as_str());
    info!(
        "Script command: {} (timeout {:?})",
        config.script_command, config.script_timeout
    );

    let client = Arc::new(FeishuClient::new(&config)?);
    let dispatcher = bot::build_dispatcher(&config, client, matcher);

    let worker = LongConnClient::new(&config, dispatcher)?;
    info!("Starting Feishu long-connection client");
    bot::run(worker).await
}
