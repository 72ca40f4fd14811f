//! Key-versioned shared state with pluggable conflict resolution.
//!
//! Grounded in `original_source/mcp-server/luna_core/systemic_integration.py`
//! (`synchronize_state`, `get_shared_state`, `_detect_conflict`,
//! `_phi_weighted_resolution`/`_consensus_resolution`/`_priority_resolution`).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use memoria_core::{SharedStateCell, PHI_INVERSE};

/// Decides which of two competing writes to the same key wins.
pub trait ConflictResolver: Send + Sync {
    /// `true` if the incoming write should replace the existing cell.
    fn accept(&self, existing_priority: u8, incoming_priority: u8) -> bool;
}

/// Weighs each writer by `PHI_INVERSE^(priority-1)`, so higher-priority
/// (numerically smaller) writers dominate but never absolutely — a
/// priority-1 writer still loses to a tied or better incoming priority.
pub struct PhiWeighted;
impl ConflictResolver for PhiWeighted {
    fn accept(&self, existing_priority: u8, incoming_priority: u8) -> bool {
        let existing_weight = PHI_INVERSE.powi(existing_priority.saturating_sub(1) as i32);
        let incoming_weight = PHI_INVERSE.powi(incoming_priority.saturating_sub(1) as i32);
        incoming_weight >= existing_weight
    }
}

/// Every write is accepted; conflicts are resolved by whichever call
/// reaches `write` last, under the assumption callers already agreed out
/// of band.
pub struct Consensus;
impl ConflictResolver for Consensus {
    fn accept(&self, _existing_priority: u8, _incoming_priority: u8) -> bool {
        true
    }
}

/// Strict priority order: only a write at least as urgent as the existing
/// one is accepted.
pub struct PriorityBased;
impl ConflictResolver for PriorityBased {
    fn accept(&self, existing_priority: u8, incoming_priority: u8) -> bool {
        incoming_priority <= existing_priority
    }
}

#[derive(Clone)]
struct Record {
    cell: SharedStateCell,
    priority: u8,
    last_updated: DateTime<Utc>,
}

/// Outcome of a `write` call.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub cell: SharedStateCell,
    pub accepted: bool,
    pub conflicted: bool,
}

pub struct SharedState {
    cells: DashMap<String, Record>,
    resolver: Box<dyn ConflictResolver>,
}

impl SharedState {
    pub fn new(resolver: Box<dyn ConflictResolver>) -> Self {
        SharedState { cells: DashMap::new(), resolver }
    }

    pub fn phi_weighted() -> Self {
        SharedState::new(Box::new(PhiWeighted))
    }

    pub fn get(&self, key: &str) -> Option<SharedStateCell> {
        self.cells.get(key).map(|r| r.cell.clone())
    }

    /// Write `value` under `key` from a writer at `priority` (1 highest,
    /// 10 lowest). First write to a key always succeeds; subsequent writes
    /// go through the configured [`ConflictResolver`].
    pub fn write(&self, key: &str, value: serde_json::Value, priority: u8) -> WriteOutcome {
        match self.cells.get_mut(key) {
            None => {
                let cell = SharedStateCell { key: key.to_string(), value, version: 1 };
                self.cells.insert(key.to_string(), Record { cell: cell.clone(), priority, last_updated: Utc::now() });
                WriteOutcome { cell, accepted: true, conflicted: false }
            }
            Some(mut record) => {
                let accepted = self.resolver.accept(record.priority, priority);
                if accepted {
                    record.cell.value = value;
                    record.cell.version += 1;
                    record.priority = priority;
                    record.last_updated = Utc::now();
                    WriteOutcome { cell: record.cell.clone(), accepted: true, conflicted: true }
                } else {
                    WriteOutcome { cell: record.cell.clone(), accepted: false, conflicted: true }
                }
            }
        }
    }

    /// Fraction of keys last updated within `window_secs` of now. `1.0`
    /// when there are no keys (vacuously fresh).
    pub fn freshness(&self, window_secs: i64) -> f64 {
        if self.cells.is_empty() {
            return 1.0;
        }
        let now = Utc::now();
        let fresh = self.cells.iter().filter(|r| (now - r.last_updated).num_seconds() <= window_secs).count();
        fresh as f64 / self.cells.len() as f64
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_always_succeeds() {
        let state = SharedState::phi_weighted();
        let outcome = state.write("phi_value", serde_json::json!(1.618), 5);
        assert!(outcome.accepted);
        assert!(!outcome.conflicted);
        assert_eq!(outcome.cell.version, 1);
    }

    #[test]
    fn phi_weighted_prefers_higher_priority_incoming_write() {
        let state = SharedState::phi_weighted();
        state.write("mood", serde_json::json!("calm"), 8);
        let outcome = state.write("mood", serde_json::json!("urgent"), 1);
        assert!(outcome.accepted);
        assert_eq!(outcome.cell.value, serde_json::json!("urgent"));
        assert_eq!(outcome.cell.version, 2);
    }

    #[test]
    fn priority_based_rejects_a_lower_priority_overwrite() {
        let state = SharedState::new(Box::new(PriorityBased));
        state.write("mood", serde_json::json!("calm"), 1);
        let outcome = state.write("mood", serde_json::json!("noise"), 9);
        assert!(!outcome.accepted);
        assert_eq!(outcome.cell.value, serde_json::json!("calm"));
    }

    #[test]
    fn freshness_is_vacuously_full_when_empty() {
        let state = SharedState::phi_weighted();
        assert_eq!(state.freshness(60), 1.0);
    }
}
