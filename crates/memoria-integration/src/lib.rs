//! Cross-component plumbing: a priority message bus, a broadcast event bus,
//! versioned shared state, and the two background watchdogs (health,
//! coherence) that keep the rest of the system honest.
//!
//! Grounded in `original_source/mcp-server/luna_core/systemic_integration.py`'s
//! `LunaSystemicIntegration`, re-scoped to the four mechanisms spec'd for
//! this system (message bus, event bus, shared state, health/coherence)
//! rather than the original's full component-lifecycle manager.

pub mod coherence;
pub mod event_bus;
pub mod health;
pub mod message_bus;
pub mod shared_state;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

pub use coherence::{CoherenceChecker, CoherenceReport, DEFAULT_COHERENCE_THRESHOLD, DEFAULT_SYNC_INTERVAL_SECS};
pub use event_bus::{EventBus, EventHandler, SystemEvent};
pub use health::{HealthMonitor, DEFAULT_SAMPLE_INTERVAL_SECS, HEALTH_DEGRADED_THRESHOLD};
pub use message_bus::{ComponentMessage, MessageBus, DEFAULT_MESSAGE_TIMEOUT_MS};
pub use shared_state::{ConflictResolver, Consensus, PhiWeighted, PriorityBased, SharedState, WriteOutcome};

pub type MessageHandler = Arc<dyn Fn(ComponentMessage) -> BoxFuture<'static, Option<serde_json::Value>> + Send + Sync>;

/// Owns the message bus, event bus, and shared state; drains the message
/// bus on a dispatcher task that routes each message to its receiver's
/// registered handler.
pub struct SystemicIntegration {
    pub message_bus: Arc<MessageBus>,
    pub event_bus: Arc<EventBus>,
    pub shared_state: Arc<SharedState>,
    receivers: RwLock<HashMap<String, MessageHandler>>,
}

impl SystemicIntegration {
    pub fn new(message_timeout_ms: u64) -> Self {
        SystemicIntegration {
            message_bus: Arc::new(MessageBus::new(message_timeout_ms)),
            event_bus: Arc::new(EventBus::new()),
            shared_state: Arc::new(SharedState::phi_weighted()),
            receivers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_receiver(&self, component: impl Into<String>, handler: MessageHandler) {
        self.receivers.write().await.insert(component.into(), handler);
    }

    /// Drain and dispatch every currently-queued message once. Intended to
    /// be called from inside a loop the caller owns (`spawn_dispatcher`
    /// wraps this into a background task).
    pub async fn dispatch_once(&self) -> usize {
        let mut dispatched = 0;
        while let Some(message) = self.message_bus.dequeue().await {
            dispatched += 1;
            let receivers = self.receivers.read().await;
            let Some(handler) = receivers.get(&message.receiver).cloned() else {
                tracing::debug!(receiver = %message.receiver, "message dropped: no registered receiver");
                continue;
            };
            drop(receivers);

            let correlation_id = message.correlation_id.clone();
            let message_bus = self.message_bus.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Some(response) = handler(message).await {
                    if let Some(correlation_id) = correlation_id {
                        message_bus.respond(&correlation_id, response).await;
                    }
                }
            });
        }
        dispatched
    }

    pub fn spawn_dispatcher(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let dispatched = self.dispatch_once().await;
                if dispatched == 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_routes_to_the_registered_receiver_and_responds() {
        let integration = Arc::new(SystemicIntegration::new(1000));
        integration
            .register_receiver(
                "detector",
                Arc::new(|msg: ComponentMessage| {
                    Box::pin(async move { Some(serde_json::json!({ "echo": msg.payload })) })
                }),
            )
            .await;

        let integration_for_dispatch = integration.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                if integration_for_dispatch.dispatch_once().await > 0 {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });

        let response =
            integration.message_bus.send_and_wait("orchestrator", "detector", "check", serde_json::json!({"v": 1}), 5).await;
        dispatcher.await.unwrap();

        assert_eq!(response, Some(serde_json::json!({"echo": {"v": 1}})));
    }

    #[tokio::test]
    async fn message_to_unknown_receiver_is_dropped_not_panicking() {
        let integration = SystemicIntegration::new(1000);
        integration.message_bus.send("orchestrator", "nobody", "check", serde_json::json!({}), 5).await;
        assert_eq!(integration.dispatch_once().await, 1);
    }
}
