//! Unordered broadcast event bus. Each event type keeps its own handler
//! list; each dispatch runs on its own task so a slow handler never blocks
//! delivery to the others.
//!
//! Grounded in `original_source/mcp-server/luna_core/systemic_integration.py`
//! (`broadcast_event`, `register_event_handler`, `event_handlers`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub type EventHandler = Arc<dyn Fn(SystemEvent) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub event_type: String,
    pub source: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SystemEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: serde_json::Value) -> Self {
        SystemEvent { event_type: event_type.into(), source: source.into(), data, timestamp: Utc::now() }
    }
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub async fn register(&self, event_type: impl Into<String>, handler: EventHandler) {
        self.handlers.write().await.entry(event_type.into()).or_default().push(handler);
    }

    /// Deliver `event` to every handler currently registered for its type,
    /// each on its own task.
    pub async fn broadcast(&self, event: SystemEvent) {
        let handlers = self.handlers.read().await;
        let Some(list) = handlers.get(&event.event_type) else {
            return;
        };
        for handler in list {
            let handler = handler.clone();
            let event = event.clone();
            tokio::spawn(async move { handler(event).await });
        }
    }

    pub async fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().await.get(event_type).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn broadcast_delivers_to_all_registered_handlers() {
        let bus = EventBus::new();
        let (tx1, mut rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(1);

        bus.register("threat_detected", Arc::new(move |e: SystemEvent| {
            let tx1 = tx1.clone();
            Box::pin(async move { let _ = tx1.send(e.source).await; })
        }))
        .await;
        bus.register("threat_detected", Arc::new(move |e: SystemEvent| {
            let tx2 = tx2.clone();
            Box::pin(async move { let _ = tx2.send(e.source).await; })
        }))
        .await;

        bus.broadcast(SystemEvent::new("threat_detected", "detector", serde_json::json!({}))).await;

        assert_eq!(rx1.recv().await, Some("detector".to_string()));
        assert_eq!(rx2.recv().await, Some("detector".to_string()));
    }

    #[tokio::test]
    async fn event_with_no_handlers_is_a_no_op() {
        let bus = EventBus::new();
        bus.broadcast(SystemEvent::new("nobody_listens", "x", serde_json::json!({}))).await;
        assert_eq!(bus.handler_count("nobody_listens").await, 0);
    }
}
