//! Script trigger event handler.
//!
//! Watches group text messages for the configured pattern. A match
//! sends a short acknowledgement back to the chat and runs the
//! configured script with the trigger values in its environment.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::bot::dispatcher::EventSubscriber;
use crate::config::Config;
use crate::feishu::{InboundMessageEvent, MessageSender};
use crate::matcher::PatternMatcher;
use crate::script::{ScriptExecutionResult, ScriptRunner, TriggerContext};

pub struct TriggerHandler {
    sender: Arc<dyn MessageSender>,
    matcher: PatternMatcher,
    runner: ScriptRunner,
}

impl TriggerHandler {
    pub fn new(config: &Config, sender: Arc<dyn MessageSender>, matcher: PatternMatcher) -> Self {
        Self {
            sender,
            matcher,
            runner: ScriptRunner::new(config.script_command.clone(), config.script_timeout),
        }
    }

    /// Returns the matched text when this event should trigger the
    /// script. Non-group chats, non-text messages, and empty text never
    /// reach the matcher.
    fn evaluate(&self, event: &InboundMessageEvent) -> Option<String> {
        if !event.is_group_text() {
            return None;
        }
        if event.text.is_empty() {
            return None;
        }

        let result = self.matcher.find(&event.text);
        if !result.matched {
            return None;
        }
        Some(result.matched_text.unwrap_or_default())
    }

    async fn trigger(&self, event: &InboundMessageEvent, matched_text: String) {
        info!(
            message_id = %event.message_id,
            chat_id = %event.chat_id,
            "pattern matched: {:?}",
            matched_text
        );

        // Best-effort: a failed acknowledgement never blocks the script.
        let ack = format!(
            "Executing update script triggered by message {}",
            event.message_id
        );
        if let Err(error) = self.sender.send_text(&event.chat_id, &ack).await {
            warn!(
                message_id = %event.message_id,
                "failed to send acknowledgement: {error}"
            );
        }

        let ctx = TriggerContext {
            text: event.text.clone(),
            chat_id: event.chat_id.clone(),
            sender_id: event.sender_id.clone(),
            message_id: event.message_id.clone(),
            matched_text,
        };
        let result = self.runner.run(&ctx).await;
        log_result(&event.message_id, &result);
    }
}

#[async_trait]
impl EventSubscriber for TriggerHandler {
    async fn handle(&self, event: InboundMessageEvent) {
        debug!(
            chat_type = %event.chat_type,
            chat_id = %event.chat_id,
            sender_id = %event.sender_id,
            "received message: {:?}",
            event.text.chars().take(80).collect::<String>()
        );

        let Some(matched_text) = self.evaluate(&event) else {
            return;
        };
        self.trigger(&event, matched_text).await;
    }
}

fn log_result(message_id: &str, result: &ScriptExecutionResult) {
    if result.timed_out {
        error!(
            message_id,
            "script timed out after {:?} and was killed", result.elapsed
        );
        return;
    }
    if let Some(spawn_error) = &result.spawn_error {
        error!(message_id, "failed to execute script: {spawn_error}");
        return;
    }

    info!(
        message_id,
        "script finished: returncode={:?} elapsed={:?}", result.exit_code, result.elapsed
    );
    if !result.stdout.trim().is_empty() {
        info!(message_id, "script stdout: {}", result.stdout.trim());
    }
    if !result.stderr.trim().is_empty() {
        warn!(message_id, "script stderr: {}", result.stderr.trim());
    }
}
