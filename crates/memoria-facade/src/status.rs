//! `get_status()`'s return shape: a flat health snapshot a caller can poll
//! without having to know the component graph.
//!
//! Grounded in `original_source/mcp-server/luna_core/facade.py`'s
//! `ComponentLevel`/`ComponentStatus` dataclasses: the original tags every
//! component with its place in the 9-level Luna architecture and a free-form
//! `metrics` dict; `ComponentLevel` here renames those levels onto the
//! components this workspace actually tracks rather than the original's
//! full (and partly reserved/unported) 9-level list.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentLevel {
    PureMemory,
    ManipulationDetection,
    PredictiveCore,
    Orchestrator,
    Validator,
    SystemicIntegration,
    HealthMonitor,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub level: ComponentLevel,
    pub initialized: bool,
    pub healthy: bool,
    pub detail: Option<String>,
    pub metrics: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub initialized: bool,
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
    pub phi_alignment: f64,
    pub initialization_time_ms: u64,
}
