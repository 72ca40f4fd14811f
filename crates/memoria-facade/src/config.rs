//! Facade-wide configuration. One struct, serde defaults throughout, so the
//! binary crate can load it straight out of a TOML file and every field
//! still has a sane value when that file is partial or absent.

use std::path::Path;

use memoria_core::PHI;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    pub buffer_capacity: usize,
    pub buffer_ttl_seconds: u64,
    pub consolidation_interval_seconds: f64,
    pub retention: RetentionConfig,
    pub archive_master_key_hex: Option<String>,
    pub archive_compression: bool,
    pub message_timeout_ms: u64,
    pub coherence_threshold: f64,
    pub manipulation_threshold: f64,
    pub orchestrator_confidence_threshold: f64,
    pub orchestrator_guided_threshold: f64,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        FacadeConfig {
            buffer_capacity: 1000,
            buffer_ttl_seconds: 86_400,
            consolidation_interval_seconds: 3600.0 * PHI,
            retention: RetentionConfig::default(),
            archive_master_key_hex: None,
            archive_compression: true,
            message_timeout_ms: 5000,
            coherence_threshold: 0.8,
            manipulation_threshold: 0.3,
            orchestrator_confidence_threshold: 0.8,
            orchestrator_guided_threshold: 0.5,
        }
    }
}

impl FacadeConfig {
    /// Loads config from `path`, falling back to defaults on a missing
    /// file or a parse error rather than failing startup.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("failed to parse {}: {e} — using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("no config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Mirrors the fixed retention policy `memoria_memory::consolidation`
/// bakes in (ROOT never ages out; the rest age by tier). Not wired back
/// into the consolidation engine as an override yet — kept here so
/// `config.json` can describe the policy a reader would otherwise have to
/// find by reading the consolidation module's constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub branch_days: u32,
    pub leaf_days: u32,
    pub seed_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig { branch_days: 90, leaf_days: 30, seed_days: 7 }
    }
}
