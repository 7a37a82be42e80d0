//! Event dispatch.
//!
//! Decoded events fan out to every registered subscriber, one spawned
//! task per subscriber per event, so a slow handler never blocks the
//! receive loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::events::TriggerHandler;
use crate::feishu::{InboundMessageEvent, MessageSender};
use crate::matcher::PatternMatcher;

/// Callback interface the connection worker dispatches into.
///
/// Implementations must tolerate concurrent invocation and never return
/// errors; per-event failures are caught and logged inside the handler.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: InboundMessageEvent);
}

/// Fans decoded events out to the registered subscribers.
#[derive(Clone, Default)]
pub struct Dispatcher {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl Dispatcher {
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Hand one event to every subscriber. Returns immediately; the
    /// handlers run in their own tasks and each gets its own copy of
    /// the event.
    pub fn dispatch(&self, event: InboundMessageEvent) {
        debug!(
            message_id = %event.message_id,
            "dispatching event to {} subscriber(s)",
            self.subscribers.len()
        );
        for subscriber in &self.subscribers {
            let subscriber = Arc::clone(subscriber);
            let event = event.clone();
            tokio::spawn(async move { subscriber.handle(event).await });
        }
    }
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(
    config: &Config,
    sender: Arc<dyn MessageSender>,
    matcher: PatternMatcher,
) -> Dispatcher {
    let mut dispatcher = Dispatcher::default();
    dispatcher.subscribe(Arc::new(TriggerHandler::new(config, sender, matcher)));
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CountingSubscriber {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventSubscriber for CountingSubscriber {
        async fn handle(&self, _event: InboundMessageEvent) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SlowSubscriber;

    #[async_trait]
    impl EventSubscriber for SlowSubscriber {
        async fn handle(&self, _event: InboundMessageEvent) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    fn event(message_id: &str) -> InboundMessageEvent {
        InboundMessageEvent {
            message_id: message_id.to_string(),
            chat_id: "oc_group".to_string(),
            chat_type: "group".to_string(),
            sender_id: "ou_sender".to_string(),
            message_type: "text".to_string(),
            text: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let first = Arc::new(CountingSubscriber::default());
        let second = Arc::new(CountingSubscriber::default());
        let mut dispatcher = Dispatcher::default();
        dispatcher.subscribe(first.clone());
        dispatcher.subscribe(second.clone());

        for i in 0..3 {
            dispatcher.dispatch(event(&format!("om_{i}")));
        }

        for _ in 0..100 {
            if first.seen.load(Ordering::SeqCst) == 3 && second.seen.load(Ordering::SeqCst) == 3 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "subscribers saw {}/{} events",
            first.seen.load(Ordering::SeqCst),
            second.seen.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn dispatch_does_not_wait_for_handlers() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.subscribe(Arc::new(SlowSubscriber));

        let started = Instant::now();
        dispatcher.dispatch(event("om_slow"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
