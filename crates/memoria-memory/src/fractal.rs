//! Level 2 memory: on-disk JSON storage partitioned by `memory_type`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use memoria_core::{Error, Layer, MemoryExperience, MemoryType, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

const REGIONS: [MemoryType; 4] = [MemoryType::Root, MemoryType::Branch, MemoryType::Leaf, MemoryType::Seed];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegionIndex {
    #[serde(rename = "type")]
    region_type: String,
    version: u32,
    updated: DateTime<Utc>,
    count: usize,
    memories: Vec<String>,
}

impl RegionIndex {
    fn empty(region_type: &str) -> Self {
        RegionIndex {
            region_type: region_type.to_string(),
            version: 1,
            updated: Utc::now(),
            count: 0,
            memories: Vec::new(),
        }
    }
}

/// On-disk persistence for Fractal-tier experiences, one region per
/// `MemoryType`.
pub struct Fractal {
    base_path: PathBuf,
    indices: Mutex<std::collections::HashMap<MemoryType, RegionIndex>>,
}

impl Fractal {
    /// Open (or initialize) the Fractal store rooted at `base_path`,
    /// repairing each region's index by pruning references to missing
    /// files.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let mut indices = std::collections::HashMap::new();
        for region in REGIONS {
            std::fs::create_dir_all(Self::region_dir(&base_path, region))?;
            let mut index = Self::load_region_index(&base_path, region)?;
            let repaired = Self::repair_index(&base_path, region, &mut index);
            if repaired > 0 {
                warn!(region = region.region(), pruned = repaired, "fractal index repaired on startup");
                Self::write_region_index(&base_path, region, &index)?;
            }
            indices.insert(region, index);
        }
        Ok(Fractal {
            base_path,
            indices: Mutex::new(indices),
        })
    }

    fn region_dir(base_path: &Path, region: MemoryType) -> PathBuf {
        base_path.join(region.region())
    }

    fn index_path(base_path: &Path, region: MemoryType) -> PathBuf {
        Self::region_dir(base_path, region).join("index.json")
    }

    fn entry_path(base_path: &Path, region: MemoryType, id: &str) -> PathBuf {
        Self::region_dir(base_path, region).join(format!("{id}.json"))
    }

    fn load_region_index(base_path: &Path, region: MemoryType) -> Result<RegionIndex> {
        let path = Self::index_path(base_path, region);
        if !path.exists() {
            return Ok(RegionIndex::empty(region.region()));
        }
        let raw = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(idx) => Ok(idx),
            Err(e) => {
                warn!(error = %e, region = region.region(), "corrupt region index, starting fresh");
                Ok(RegionIndex::empty(region.region()))
            }
        }
    }

    fn repair_index(base_path: &Path, region: MemoryType, index: &mut RegionIndex) -> usize {
        let before = index.memories.len();
        index.memories.retain(|id| Self::entry_path(base_path, region, id).exists());
        let pruned = before - index.memories.len();
        index.count = index.memories.len();
        pruned
    }

    fn write_region_index(base_path: &Path, region: MemoryType, index: &RegionIndex) -> Result<()> {
        let path = Self::index_path(base_path, region);
        let mut fresh = index.clone();
        fresh.count = fresh.memories.len();
        fresh.updated = Utc::now();
        atomic_write_json(&path, &fresh)
    }

    /// `store(exp)` writes the serialized file atomically, then updates the
    /// region index last; if `parent_id` is set, the parent's
    /// `children_ids` is updated in the same call.
    pub async fn store(&self, mut exp: MemoryExperience) -> Result<()> {
        exp.layer = Layer::Fractal;
        let region = exp.memory_type;
        let path = Self::entry_path(&self.base_path, region, &exp.id);
        atomic_write_json(&path, &exp.wrapped_envelope())?;

        let mut indices = self.indices.lock().await;
        let index = indices.entry(region).or_insert_with(|| RegionIndex::empty(region.region()));
        if !index.memories.contains(&exp.id) {
            index.memories.push(exp.id.clone());
        }
        Self::write_region_index(&self.base_path, region, index)?;
        drop(indices);

        if let Some(parent_id) = exp.parent_id.clone() {
            self.link_child(&parent_id, &exp.id).await?;
        }
        Ok(())
    }

    async fn link_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        if let Some(mut parent) = self.retrieve(parent_id).await {
            if !parent.children_ids.iter().any(|c| c == child_id) {
                parent.children_ids.push(child_id.to_string());
                parent.touch();
                let region = parent.memory_type;
                let path = Self::entry_path(&self.base_path, region, &parent.id);
                atomic_write_json(&path, &parent.wrapped_envelope())?;
            }
        }
        Ok(())
    }

    pub async fn retrieve(&self, id: &str) -> Option<MemoryExperience> {
        let indices = self.indices.lock().await;
        for region in REGIONS {
            let known = indices.get(&region).map(|idx| idx.memories.contains(&id.to_string())).unwrap_or(false);
            if known {
                if let Ok(exp) = Self::read_entry(&self.base_path, region, id) {
                    return Some(exp);
                }
            }
        }
        None
    }

    fn read_entry(base_path: &Path, region: MemoryType, id: &str) -> Result<MemoryExperience> {
        let path = Self::entry_path(base_path, region, id);
        let raw = std::fs::read_to_string(&path)?;
        let envelope: serde_json::Value = serde_json::from_str(&raw)?;
        let experience = envelope
            .get("memory_pure_v2")
            .and_then(|v| v.get("experience"))
            .ok_or_else(|| Error::persistence(format!("malformed envelope for {id}")))?;
        let exp: MemoryExperience = serde_json::from_value(experience.clone())?;
        Ok(exp)
    }

    pub async fn search(&self, query: &str, types: Option<&[MemoryType]>, limit: usize) -> Vec<MemoryExperience> {
        let indices = self.indices.lock().await;
        let query_lower = query.to_lowercase();
        let regions: Vec<MemoryType> = match types {
            Some(t) => t.to_vec(),
            None => REGIONS.to_vec(),
        };

        let mut scored: Vec<(f64, MemoryExperience)> = Vec::new();
        for region in regions {
            let Some(index) = indices.get(&region) else { continue };
            for id in &index.memories {
                if let Ok(exp) = Self::read_entry(&self.base_path, region, id) {
                    let content_lower = exp.content.to_lowercase();
                    let mut score = 0.0;
                    if content_lower.contains(&query_lower) {
                        score += 1.0;
                    }
                    for kw in &exp.keywords {
                        if query_lower.contains(&kw.to_lowercase()) {
                            score += 0.3;
                        }
                    }
                    for tag in &exp.tags {
                        if query_lower.contains(&tag.to_lowercase()) {
                            score += 0.15;
                        }
                    }
                    if score > 0.0 {
                        scored.push((score, exp));
                    }
                }
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(limit).map(|(_, e)| e).collect()
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut indices = self.indices.lock().await;
        for region in REGIONS {
            if let Some(index) = indices.get_mut(&region) {
                if let Some(pos) = index.memories.iter().position(|m| m == id) {
                    index.memories.remove(pos);
                    Self::write_region_index(&self.base_path, region, index)?;
                    let path = Self::entry_path(&self.base_path, region, id);
                    if path.exists() {
                        std::fs::remove_file(path)?;
                    }
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub async fn region_ids(&self, region: MemoryType) -> HashSet<String> {
        self.indices
            .lock()
            .await
            .get(&region)
            .map(|idx| idx.memories.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn all_entries(&self) -> Vec<MemoryExperience> {
        let indices = self.indices.lock().await;
        let mut out = Vec::new();
        for region in REGIONS {
            let Some(index) = indices.get(&region) else { continue };
            for id in &index.memories {
                if let Ok(exp) = Self::read_entry(&self.base_path, region, id) {
                    out.push(exp);
                }
            }
        }
        out
    }

    /// Move `exp` into the region matching its (already-updated)
    /// `memory_type`, removing it from its previous region.
    pub async fn reseat(&self, exp: MemoryExperience, previous_region: MemoryType) -> Result<()> {
        if previous_region != exp.memory_type {
            self.delete_from_region(previous_region, &exp.id).await?;
        }
        self.store(exp).await
    }

    async fn delete_from_region(&self, region: MemoryType, id: &str) -> Result<()> {
        let mut indices = self.indices.lock().await;
        if let Some(index) = indices.get_mut(&region) {
            if let Some(pos) = index.memories.iter().position(|m| m == id) {
                index.memories.remove(pos);
                Self::write_region_index(&self.base_path, region, index)?;
                let path = Self::entry_path(&self.base_path, region, id);
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::MemoryType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let dir = TempDir::new().unwrap();
        let fractal = Fractal::open(dir.path()).await.unwrap();
        let exp = MemoryExperience::new("remember this", MemoryType::Leaf);
        let id = exp.id.clone();
        fractal.store(exp.clone()).await.unwrap();
        let found = fractal.retrieve(&id).await.unwrap();
        assert_eq!(found.content, exp.content);
        assert_eq!(found.layer, Layer::Fractal);
    }

    #[tokio::test]
    async fn index_json_is_written_per_region() {
        let dir = TempDir::new().unwrap();
        let fractal = Fractal::open(dir.path()).await.unwrap();
        let exp = MemoryExperience::new("x", MemoryType::Seed);
        fractal.store(exp).await.unwrap();
        let idx_path = dir.path().join("seeds").join("index.json");
        assert!(idx_path.exists());
        let raw = std::fs::read_to_string(idx_path).unwrap();
        assert!(raw.contains("\"count\""));
    }

    #[tokio::test]
    async fn startup_repairs_index_with_missing_file() {
        let dir = TempDir::new().unwrap();
        {
            let fractal = Fractal::open(dir.path()).await.unwrap();
            let exp = MemoryExperience::new("ephemeral", MemoryType::Seed);
            fractal.store(exp.clone()).await.unwrap();
            let path = Fractal::entry_path(dir.path(), MemoryType::Seed, &exp.id);
            std::fs::remove_file(path).unwrap();
        }
        let fractal = Fractal::open(dir.path()).await.unwrap();
        assert!(fractal.region_ids(MemoryType::Seed).await.is_empty());
    }

    #[tokio::test]
    async fn parent_child_links_are_symmetric() {
        let dir = TempDir::new().unwrap();
        let fractal = Fractal::open(dir.path()).await.unwrap();
        let parent = MemoryExperience::new("parent", MemoryType::Branch);
        let parent_id = parent.id.clone();
        fractal.store(parent).await.unwrap();

        let mut child = MemoryExperience::new("child", MemoryType::Leaf);
        child.parent_id = Some(parent_id.clone());
        fractal.store(child.clone()).await.unwrap();

        let reloaded_parent = fractal.retrieve(&parent_id).await.unwrap();
        assert!(reloaded_parent.children_ids.contains(&child.id));
    }

    #[tokio::test]
    async fn search_filters_by_type() {
        let dir = TempDir::new().unwrap();
        let fractal = Fractal::open(dir.path()).await.unwrap();
        fractal.store(MemoryExperience::new("fibonacci tilings", MemoryType::Leaf)).await.unwrap();
        fractal.store(MemoryExperience::new("fibonacci spirals", MemoryType::Root)).await.unwrap();
        let results = fractal.search("fibonacci", Some(&[MemoryType::Leaf]), 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory_type, MemoryType::Leaf);
    }

    #[tokio::test]
    async fn delete_removes_file_and_index_entry() {
        let dir = TempDir::new().unwrap();
        let fractal = Fractal::open(dir.path()).await.unwrap();
        let exp = MemoryExperience::new("temp", MemoryType::Seed);
        let id = exp.id.clone();
        fractal.store(exp).await.unwrap();
        assert!(fractal.delete(&id).await.unwrap());
        assert!(fractal.retrieve(&id).await.is_none());
    }
}
