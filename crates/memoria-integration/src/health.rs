//! Component health sampling and the `health_degraded` broadcast.
//!
//! Grounded in `original_source/mcp-server/luna_core/systemic_integration.py`
//! (`_monitoring_service`, `_check_component_health`, `_calculate_system_health`).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::event_bus::{EventBus, SystemEvent};

pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 5;
pub const HEALTH_DEGRADED_THRESHOLD: f64 = 0.7;

pub struct HealthMonitor {
    scores: DashMap<String, f64>,
    event_bus: Arc<EventBus>,
    sample_interval: Duration,
}

impl HealthMonitor {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        HealthMonitor { scores: DashMap::new(), event_bus, sample_interval: Duration::from_secs(DEFAULT_SAMPLE_INTERVAL_SECS) }
    }

    pub fn with_interval(event_bus: Arc<EventBus>, sample_interval: Duration) -> Self {
        HealthMonitor { scores: DashMap::new(), event_bus, sample_interval }
    }

    pub fn report(&self, component: &str, score: f64) {
        self.scores.insert(component.to_string(), score.clamp(0.0, 1.0));
    }

    /// Mean health across every component that has reported; `1.0` when no
    /// component has reported yet.
    pub fn composite(&self) -> f64 {
        if self.scores.is_empty() {
            return 1.0;
        }
        self.scores.iter().map(|s| *s).sum::<f64>() / self.scores.len() as f64
    }

    /// Sample once; broadcasts `health_degraded` if composite health falls
    /// below [`HEALTH_DEGRADED_THRESHOLD`]. Returns the sampled composite.
    pub async fn sample_once(&self) -> f64 {
        let composite = self.composite();
        if composite < HEALTH_DEGRADED_THRESHOLD {
            self.event_bus
                .broadcast(SystemEvent::new("health_degraded", "health_monitor", serde_json::json!({ "composite": composite })))
                .await;
        }
        composite
    }

    /// Spawn the periodic sampling task. Dropping the returned handle does
    /// not stop it; callers that need clean shutdown should `abort()` it.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.sample_interval);
            loop {
                ticker.tick().await;
                self.sample_once().await;
            }
        })
    }
}
