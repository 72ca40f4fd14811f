//! Priority message bus: FIFO within equal priority, with optional
//! correlation-id response matching and a timeout.
//!
//! Grounded in `original_source/mcp-server/luna_core/systemic_integration.py`
//! (`send_message`, the `message_bus` priority queue, `response_callbacks`).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use memoria_core::ids::generate_correlation_id;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};

pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentMessage {
    pub sender: String,
    pub receiver: String,
    pub message_type: String,
    pub payload: serde_json::Value,
    /// 1 (highest) to 10 (lowest).
    pub priority: u8,
    pub correlation_id: Option<String>,
}

struct Entry {
    priority: u8,
    sequence: u64,
    message: ComponentMessage,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse priority so the numerically
        // smallest (highest-priority) entry sorts greatest, and within a
        // priority favor the smaller (earlier) sequence number.
        other.priority.cmp(&self.priority).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub struct MessageBus {
    queue: Mutex<BinaryHeap<Entry>>,
    next_sequence: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
    default_timeout: Duration,
}

impl MessageBus {
    pub fn new(default_timeout_ms: u64) -> Self {
        MessageBus {
            queue: Mutex::new(BinaryHeap::new()),
            next_sequence: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            default_timeout: Duration::from_millis(default_timeout_ms),
        }
    }

    /// Enqueue a message without waiting for a response.
    pub async fn send(
        &self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
        priority: u8,
    ) -> ComponentMessage {
        self.enqueue(sender.into(), receiver.into(), message_type.into(), payload, priority, None).await
    }

    /// Enqueue a message and await a matching response, or `None` after
    /// `default_timeout` elapses.
    pub async fn send_and_wait(
        &self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
        priority: u8,
    ) -> Option<serde_json::Value> {
        let correlation_id = generate_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation_id.clone(), tx);

        self.enqueue(sender.into(), receiver.into(), message_type.into(), payload, priority, Some(correlation_id.clone()))
            .await;

        match tokio::time::timeout(self.default_timeout, rx).await {
            Ok(Ok(value)) => Some(value),
            _ => {
                self.pending.lock().await.remove(&correlation_id);
                None
            }
        }
    }

    async fn enqueue(
        &self,
        sender: String,
        receiver: String,
        message_type: String,
        payload: serde_json::Value,
        priority: u8,
        correlation_id: Option<String>,
    ) -> ComponentMessage {
        let message = ComponentMessage { sender, receiver, message_type, payload, priority, correlation_id };
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
        self.queue.lock().await.push(Entry { priority, sequence, message: message.clone() });
        message
    }

    /// Pop the highest-priority, earliest-queued message, if any.
    pub async fn dequeue(&self) -> Option<ComponentMessage> {
        self.queue.lock().await.pop().map(|e| e.message)
    }

    /// Resolve a pending `send_and_wait` call by correlation id. Returns
    /// `false` if no caller is waiting (already timed out, or no response
    /// was requested).
    pub async fn respond(&self, correlation_id: &str, payload: serde_json::Value) -> bool {
        if let Some(tx) = self.pending.lock().await.remove(correlation_id) {
            tx.send(payload).is_ok()
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let bus = MessageBus::new(DEFAULT_MESSAGE_TIMEOUT_MS);
        bus.send("a", "b", "low", serde_json::json!({}), 9).await;
        bus.send("a", "b", "high", serde_json::json!({}), 1).await;
        bus.send("a", "b", "mid", serde_json::json!({}), 5).await;

        assert_eq!(bus.dequeue().await.unwrap().message_type, "high");
        assert_eq!(bus.dequeue().await.unwrap().message_type, "mid");
        assert_eq!(bus.dequeue().await.unwrap().message_type, "low");
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let bus = MessageBus::new(DEFAULT_MESSAGE_TIMEOUT_MS);
        bus.send("a", "b", "first", serde_json::json!({}), 5).await;
        bus.send("a", "b", "second", serde_json::json!({}), 5).await;

        assert_eq!(bus.dequeue().await.unwrap().message_type, "first");
        assert_eq!(bus.dequeue().await.unwrap().message_type, "second");
    }

    #[tokio::test]
    async fn response_resolves_the_waiting_caller() {
        let bus = std::sync::Arc::new(MessageBus::new(DEFAULT_MESSAGE_TIMEOUT_MS));
        let responder = bus.clone();
        let waiter = tokio::spawn(async move { bus.send_and_wait("a", "b", "ping", serde_json::json!({}), 5).await });

        // Drain then respond, as a dispatcher loop would.
        let msg = loop {
            if let Some(m) = responder.dequeue().await {
                break m;
            }
            tokio::task::yield_now().await;
        };
        responder.respond(msg.correlation_id.as_ref().unwrap(), serde_json::json!({"ok": true})).await;

        let result = waiter.await.unwrap();
        assert_eq!(result, Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn unanswered_request_times_out_to_none() {
        let bus = MessageBus::new(10);
        let result = bus.send_and_wait("a", "b", "ping", serde_json::json!({}), 5).await;
        assert_eq!(result, None);
    }
}
