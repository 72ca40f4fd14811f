//! Persisted orchestrator counters and thresholds.
//!
//! Written as a single JSON document, atomically replaced on every change —
//! the same temp-file-then-rename idiom `memoria-memory`'s fractal and
//! archive tiers use, grounded in
//! `agenticlaw-consciousness::cores::checkpoint_state`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use memoria_core::{DispatchMode, Result};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    #[serde(default)]
    pub mode_usage: HashMap<DispatchMode, u64>,
    #[serde(default)]
    pub total_processed: u64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_guided_threshold")]
    pub guided_threshold: f64,
    #[serde(default = "default_manipulation_threshold")]
    pub manipulation_threshold: f64,
}

fn default_confidence_threshold() -> f64 {
    0.8
}
fn default_guided_threshold() -> f64 {
    0.5
}
fn default_manipulation_threshold() -> f64 {
    0.3
}

impl Default for OrchestratorState {
    fn default() -> Self {
        OrchestratorState {
            mode_usage: HashMap::new(),
            total_processed: 0,
            confidence_threshold: default_confidence_threshold(),
            guided_threshold: default_guided_threshold(),
            manipulation_threshold: default_manipulation_threshold(),
        }
    }
}

impl OrchestratorState {
    pub fn record(&mut self, mode: DispatchMode) {
        *self.mode_usage.entry(mode).or_insert(0) += 1;
        self.total_processed += 1;
    }

    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OrchestratorState::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = tmp_path(path);
        {
            let mut f = tokio::fs::File::create(&tmp).await?;
            f.write_all(&bytes).await?;
            f.sync_all().await?;
        }
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = tmp.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    tmp.set_file_name(format!("{file_name}.tmp"));
    tmp
}
