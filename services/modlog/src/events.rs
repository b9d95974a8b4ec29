//! Typed poll events and a fan-out event bus
//!
//! Each subscriber owns an unbounded channel, so events reach a given
//! subscriber in publication order. Dropped receivers are pruned on the
//! next publish.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// One decoded register value (cooperative engine, one per register per tick)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleEvent {
    pub register_name: String,
    pub value: f64,
    pub timestamp: DateTime<Local>,
}

/// All values of one background pass, in register order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEvent {
    pub values: Vec<(String, f64)>,
    pub timestamp: DateTime<Local>,
}

impl BatchEvent {
    pub fn to_map(&self) -> HashMap<String, f64> {
        self.values.iter().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResultEvent {
    pub register_name: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollEvent {
    Sample(SampleEvent),
    Batch(BatchEvent),
    WriteResult(WriteResultEvent),
    Error(ErrorEvent),
}

impl PollEvent {
    pub fn error(message: impl Into<String>) -> Self {
        PollEvent::Error(ErrorEvent {
            message: message.into(),
        })
    }

    /// Sample or batch (data-carrying) event
    pub fn is_data(&self) -> bool {
        matches!(self, PollEvent::Sample(_) | PollEvent::Batch(_))
    }
}

/// Publisher side of the poll event stream
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<PollEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> UnboundedReceiver<PollEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber; returns how many received it
    pub fn publish(&self, event: PollEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Drop every subscriber sender
    ///
    /// Receivers still get the events already queued, then `None`.
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn sample(name: &str, value: f64) -> PollEvent {
        PollEvent::Sample(SampleEvent {
            register_name: name.to_string(),
            value,
            timestamp: Local::now(),
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(sample("pv", 1.0)), 0);
    }

    #[tokio::test]
    async fn test_each_subscriber_gets_events_in_order() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(sample("a", 1.0));
        bus.publish(sample("b", 2.0));

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                PollEvent::Sample(e) => assert_eq!(e.register_name, "a"),
                other => panic!("unexpected {:?}", other),
            }
            match rx.recv().await.unwrap() {
                PollEvent::Sample(e) => assert_eq!(e.register_name, "b"),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_dropped_subscribers_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx);
        assert_eq!(bus.publish(PollEvent::error("boom")), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_close_delivers_queued_then_ends() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let publisher = bus.clone();

        publisher.publish(sample("pv", 1.0));
        bus.close();

        assert!(matches!(rx.recv().await, Some(PollEvent::Sample(_))));
        assert!(rx.recv().await.is_none());
        assert_eq!(publisher.publish(sample("pv", 2.0)), 0);
    }

    #[test]
    fn test_batch_helpers() {
        let batch = BatchEvent {
            values: vec![("pv".to_string(), 1.0), ("flag".to_string(), 0.0)],
            timestamp: Local::now(),
        };
        assert_eq!(batch.get("flag"), Some(0.0));
        assert_eq!(batch.get("missing"), None);
        assert_eq!(batch.to_map().len(), 2);
        assert!(PollEvent::Batch(batch).is_data());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(PollEvent::error("x")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "x");
    }
}
