//! Periodic system-coherence scoring and the `low_coherence` broadcast.
//!
//! Grounded in `original_source/mcp-server/luna_core/systemic_integration.py`
//! (`check_system_coherence`, `_check_phi_coherence`, `_check_memory_consistency`,
//! `_check_state_sync`, `_check_component_health`).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event_bus::{EventBus, SystemEvent};
use crate::health::HealthMonitor;
use crate::shared_state::SharedState;

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_COHERENCE_THRESHOLD: f64 = 0.8;
const FRESHNESS_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub score: f64,
    pub phi_alignment: f64,
    pub memory_consistency: f64,
    pub state_synchronization: f64,
    pub component_health: f64,
}

/// Callbacks supplying the two factors this crate has no direct visibility
/// into: phi alignment and memory consistency live in the orchestrator and
/// memory tiers respectively, which `memoria-integration` does not depend on.
pub type FactorFn = Box<dyn Fn() -> f64 + Send + Sync>;

pub struct CoherenceChecker {
    health: Arc<HealthMonitor>,
    state: Arc<SharedState>,
    phi_alignment: FactorFn,
    memory_consistency: FactorFn,
    threshold: f64,
    sync_interval: Duration,
    event_bus: Arc<EventBus>,
}

impl CoherenceChecker {
    pub fn new(
        event_bus: Arc<EventBus>,
        health: Arc<HealthMonitor>,
        state: Arc<SharedState>,
        phi_alignment: FactorFn,
        memory_consistency: FactorFn,
    ) -> Self {
        CoherenceChecker {
            health,
            state,
            phi_alignment,
            memory_consistency,
            threshold: DEFAULT_COHERENCE_THRESHOLD,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            event_bus,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_sync_interval(mut self, sync_interval: Duration) -> Self {
        self.sync_interval = sync_interval;
        self
    }

    pub async fn check_once(&self) -> CoherenceReport {
        let phi_alignment = (self.phi_alignment)().clamp(0.0, 1.0);
        let memory_consistency = (self.memory_consistency)().clamp(0.0, 1.0);
        let state_synchronization = self.state.freshness(FRESHNESS_WINDOW_SECS);
        let component_health = self.health.composite();

        let score = (phi_alignment + memory_consistency + state_synchronization + component_health) / 4.0;
        let report = CoherenceReport { score, phi_alignment, memory_consistency, state_synchronization, component_health };

        if score < self.threshold {
            self.event_bus
                .broadcast(SystemEvent::new("low_coherence", "coherence_checker", serde_json::to_value(&report).unwrap()))
                .await;
        }

        report
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.sync_interval);
            loop {
                ticker.tick().await;
                self.check_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_state::PhiWeighted;

    fn checker(event_bus: Arc<EventBus>, phi: f64, memory: f64) -> CoherenceChecker {
        CoherenceChecker::new(
            event_bus,
            Arc::new(HealthMonitor::new(Arc::new(EventBus::new()))),
            Arc::new(SharedState::new(Box::new(PhiWeighted))),
            Box::new(move || phi),
            Box::new(move || memory),
        )
    }

    #[tokio::test]
    async fn high_factors_yield_approved_coherence() {
        let bus = Arc::new(EventBus::new());
        let report = checker(bus, 0.9, 0.9).check_once().await;
        assert!(report.score > 0.8);
    }

    #[tokio::test]
    async fn low_factors_broadcast_low_coherence() {
        let bus = Arc::new(EventBus::new());
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        bus.register(
            "low_coherence",
            Arc::new(move |e: SystemEvent| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(e.event_type).await;
                })
            }),
        )
        .await;

        checker(bus, 0.1, 0.1).check_once().await;
        assert_eq!(rx.recv().await, Some("low_coherence".to_string()));
    }
}
