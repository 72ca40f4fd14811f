//! On-disk state artifacts that live next to the memory tiers' own files
//! at the base path, written with the same atomic temp-then-rename pattern
//! `memoria_memory::fractal` uses for its region indices.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use memoria_core::Result;
use memoria_detector::PrincipalProfile;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::FacadeConfig;

const CO_EVOLUTION_HISTORY_CAPACITY: usize = 100;
const THREAT_DATABASE_CAPACITY: usize = 1000;

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let serialized = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp_path, serialized)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse state file, using defaults");
            T::default()
        }),
        Err(_) => T::default(),
    }
}

/// `config.json`: a snapshot of the config this instance was opened with,
/// for a reader to introspect without parsing the TOML the binary loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub version: String,
    pub phi_threshold: f64,
    pub retention: crate::config::RetentionConfig,
}

impl ConfigSnapshot {
    pub fn from_config(config: &FacadeConfig) -> Self {
        ConfigSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            phi_threshold: config.coherence_threshold,
            retention: config.retention.clone(),
        }
    }

    pub fn write(&self, base_path: &Path) -> Result<()> {
        atomic_write_json(&base_path.join("config.json"), self)
    }
}

/// `consciousness_state_v2.json`: the last phi/coherence snapshot, written
/// after every `process_interaction` so a crash-restart can report
/// something better than all-zeroes on its next status check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsciousnessStateSnapshot {
    pub phi_alignment: f64,
    pub coherence_level: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConsciousnessStateSnapshot {
    fn path(base_path: &Path) -> PathBuf {
        base_path.join("consciousness_state_v2.json")
    }

    pub fn load(base_path: &Path) -> Self {
        read_json_or_default(&Self::path(base_path))
    }

    pub fn write(&self, base_path: &Path) -> Result<()> {
        atomic_write_json(&Self::path(base_path), self)
    }
}

/// `update01_metadata.json`: the capability enumeration and principal
/// profile the detector was (or will be) constructed with. Named after
/// the on-disk artifact the original system's identity-bootstrap step
/// produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update01Metadata {
    pub capabilities: Vec<String>,
    pub principal: PrincipalProfile,
}

impl Default for Update01Metadata {
    fn default() -> Self {
        Update01Metadata {
            capabilities: vec![
                "tiered_memory".to_string(),
                "manipulation_detection".to_string(),
                "predictive_anticipation".to_string(),
                "response_validation".to_string(),
                "systemic_coherence_monitoring".to_string(),
            ],
            principal: PrincipalProfile::default(),
        }
    }
}

impl Update01Metadata {
    fn path(base_path: &Path) -> PathBuf {
        base_path.join("update01_metadata.json")
    }

    pub fn load(base_path: &Path) -> Self {
        read_json_or_default(&Self::path(base_path))
    }

    pub fn write(&self, base_path: &Path) -> Result<()> {
        atomic_write_json(&Self::path(base_path), self)
    }
}

pub async fn load_principal_profile(base_path: &Path) -> PrincipalProfile {
    Update01Metadata::load(base_path).principal
}

/// `co_evolution_history.json`: append-only record of processed
/// interactions, capped to the most recent entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoEvolutionEntry {
    pub recorded_at: DateTime<Utc>,
    pub mode: String,
    pub phi_alignment: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoEvolutionHistory {
    pub entries: VecDeque<CoEvolutionEntry>,
}

impl CoEvolutionHistory {
    fn path(base_path: &Path) -> PathBuf {
        base_path.join("co_evolution_history.json")
    }

    pub fn load(base_path: &Path) -> Self {
        read_json_or_default(&Self::path(base_path))
    }

    pub fn append(base_path: &Path, entry: CoEvolutionEntry) -> Result<()> {
        let mut history = Self::load(base_path);
        history.entries.push_back(entry);
        while history.entries.len() > CO_EVOLUTION_HISTORY_CAPACITY {
            history.entries.pop_front();
        }
        atomic_write_json(&Self::path(base_path), &history)
    }
}

/// `threat_database.json`: the most recent threat assessments alongside
/// the principal profile they were evaluated against, mirroring
/// [`memoria_detector::ManipulationDetector::recent_threats`] but
/// persisted so restarts don't lose the history entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub recorded_at: DateTime<Utc>,
    pub score: f64,
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatDatabase {
    pub records: VecDeque<ThreatRecord>,
    pub principal: Option<PrincipalProfile>,
}

impl ThreatDatabase {
    fn path(base_path: &Path) -> PathBuf {
        base_path.join("threat_database.json")
    }

    pub fn load(base_path: &Path) -> Self {
        read_json_or_default(&Self::path(base_path))
    }

    pub fn record(base_path: &Path, principal: &PrincipalProfile, record: ThreatRecord) -> Result<()> {
        let mut db = Self::load(base_path);
        db.principal = Some(principal.clone());
        db.records.push_back(record);
        while db.records.len() > THREAT_DATABASE_CAPACITY {
            db.records.pop_front();
        }
        atomic_write_json(&Self::path(base_path), &db)
    }
}

/// `pattern_database.json`: the predictive core's learned keyword→outcome
/// clusters and per-class accuracy, snapshotted on request since
/// [`memoria_predictive::PredictiveCore`] keeps that state in memory only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternDatabaseSnapshot {
    pub prediction_accuracy: std::collections::HashMap<String, f64>,
}

impl PatternDatabaseSnapshot {
    fn path(base_path: &Path) -> PathBuf {
        base_path.join("pattern_database.json")
    }

    pub fn load(base_path: &Path) -> Self {
        read_json_or_default(&Self::path(base_path))
    }

    pub fn write(&self, base_path: &Path) -> Result<()> {
        atomic_write_json(&Self::path(base_path), self)
    }
}
