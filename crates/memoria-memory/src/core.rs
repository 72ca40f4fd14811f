//! `PureMemoryCore`: a unifying facade over Buffer, Fractal, and Archive.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{Layer, MemoryExperience, Result, PHI_INVERSE};
use tracing::info;

use crate::archive::Archive;
use crate::buffer::{Buffer, EvictionSink};
use crate::consolidation::ConsolidationEngine;
use crate::fractal::Fractal;
use crate::promoter::{promotion_score, ResonanceCache};

/// A dream-processor pass's output: narrative pattern records with no
/// side effects on the experiences it reads.
#[derive(Debug, Clone)]
pub struct DreamPattern {
    pub narrative: String,
    pub source_ids: Vec<String>,
}

/// Wires Buffer eviction into Fractal storage.
struct BufferToFractal {
    fractal: Arc<Fractal>,
}

#[async_trait]
impl EvictionSink for BufferToFractal {
    async fn on_eviction(&self, exp: MemoryExperience) {
        if let Err(e) = self.fractal.store(exp).await {
            tracing::warn!(error = %e, "buffer eviction failed to persist to fractal");
        }
    }
}

pub struct PureMemoryCore {
    buffer: Arc<Buffer>,
    fractal: Arc<Fractal>,
    archive: Arc<Archive>,
    resonance: Arc<ResonanceCache>,
    consolidation: ConsolidationEngine,
}

impl PureMemoryCore {
    pub async fn open(
        base_path: impl Into<std::path::PathBuf>,
        buffer_capacity: usize,
        buffer_ttl_seconds: u64,
        archive_master_key_hex: Option<&str>,
        archive_compression_default: bool,
    ) -> Result<Arc<Self>> {
        let base_path = base_path.into();
        // Fractal regions live directly under base_path per the on-disk
        // layout contract (roots/branchs/leaves/seeds at the top level).
        let fractal = Arc::new(Fractal::open(&base_path).await?);

        let archive = Arc::new(Archive::open(base_path.join("archive"), archive_master_key_hex, archive_compression_default).await?);

        let sink = Arc::new(BufferToFractal { fractal: fractal.clone() });
        let buffer = Arc::new(Buffer::new(buffer_capacity, buffer_ttl_seconds, Some(sink)));

        let resonance = Arc::new(ResonanceCache::new());

        let archive_for_cleanup = archive.clone();
        let archive_sink: Arc<dyn Fn(MemoryExperience) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync> =
            Arc::new(move |exp: MemoryExperience| {
                let archive = archive_for_cleanup.clone();
                Box::pin(async move {
                    archive.archive(exp, None).await?;
                    Ok(())
                })
            });

        let consolidation = ConsolidationEngine::new(buffer.clone(), fractal.clone(), resonance.clone(), archive_sink);

        Ok(Arc::new(PureMemoryCore { buffer, fractal, archive, resonance, consolidation }))
    }

    /// `store(exp, layer)`: writes to the given layer, or auto-selects one
    /// from the experience's importance when `layer` is `None`.
    pub async fn store(&self, exp: MemoryExperience, layer: Option<Layer>) -> Result<()> {
        let target = layer.unwrap_or_else(|| {
            let importance = promotion_score(&exp);
            if importance >= 1.0 {
                Layer::Archive
            } else if importance >= PHI_INVERSE {
                Layer::Fractal
            } else {
                Layer::Buffer
            }
        });

        match target {
            Layer::Buffer => self.buffer.store(exp).await,
            Layer::Fractal => self.fractal.store(exp).await,
            Layer::Archive => self.archive.archive(exp, None).await.map(|_| ()),
        }
    }

    /// Probe BUFFER, then FRACTAL, then ARCHIVE; a deeper-tier hit is
    /// cached back into BUFFER without changing canonical `layer`.
    pub async fn retrieve(&self, id: &str) -> Option<MemoryExperience> {
        if let Some(exp) = self.buffer.retrieve(id).await {
            return Some(exp);
        }
        if let Some(exp) = self.fractal.retrieve(id).await {
            self.cache_copy(&exp).await;
            return Some(exp);
        }
        if let Ok(Some(exp)) = self.archive.retrieve(id).await {
            self.cache_copy(&exp).await;
            return Some(exp);
        }
        None
    }

    async fn cache_copy(&self, exp: &MemoryExperience) {
        let _ = self.buffer.store_preserving_layer(exp.clone()).await;
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryExperience> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for exp in self.buffer.search(query, limit).await {
            if seen.insert(exp.id.clone()) {
                merged.push(exp);
            }
        }
        for exp in self.fractal.search(query, None, limit).await {
            if seen.insert(exp.id.clone()) {
                merged.push(exp);
            }
        }
        for exp in self.archive.search(query, limit).await {
            if seen.insert(exp.id.clone()) {
                merged.push(exp);
            }
        }

        merged.sort_by(|a, b| {
            promotion_score(b)
                .partial_cmp(&promotion_score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(limit);
        merged
    }

    pub async fn consolidate(&self, force: bool) -> Result<memoria_core::ConsolidationReport> {
        self.consolidation.consolidate(force).await
    }

    /// A dream-processor pass: derives narrative pattern records from
    /// resonant clusters, with no side effects on the underlying
    /// experiences.
    pub async fn dream(&self, memories: Option<Vec<MemoryExperience>>) -> Vec<DreamPattern> {
        let pool = match memories {
            Some(m) => m,
            None => self.fractal.all_entries().await,
        };

        let mut patterns = Vec::new();
        for window in pool.windows(2) {
            let r = self.resonance.resonance(&window[0], &window[1]);
            if r > PHI_INVERSE {
                patterns.push(DreamPattern {
                    narrative: format!(
                        "\"{}\" echoes \"{}\"",
                        truncate(&window[0].content, 40),
                        truncate(&window[1].content, 40)
                    ),
                    source_ids: vec![window[0].id.clone(), window[1].id.clone()],
                });
            }
        }
        info!(patterns = patterns.len(), "dream pass complete");
        patterns
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn fractal(&self) -> &Arc<Fractal> {
        &self.fractal
    }

    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }
}

fn truncate(s: &str, n: usize) -> String {
    if s.len() <= n {
        s.to_string()
    } else {
        format!("{}…", &s[..n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::MemoryType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn store_default_layer_is_buffer_for_low_importance() {
        let dir = TempDir::new().unwrap();
        let core = PureMemoryCore::open(dir.path(), 1000, 86_400, None, false).await.unwrap();
        let exp = MemoryExperience::new("a fleeting thought", MemoryType::Seed);
        let id = exp.id.clone();
        core.store(exp, None).await.unwrap();
        let found = core.retrieve(&id).await.unwrap();
        assert_eq!(found.layer, Layer::Buffer);
    }

    #[tokio::test]
    async fn explicit_layer_is_honored() {
        let dir = TempDir::new().unwrap();
        let core = PureMemoryCore::open(dir.path(), 1000, 86_400, None, false).await.unwrap();
        let exp = MemoryExperience::new("store me directly", MemoryType::Leaf);
        let id = exp.id.clone();
        core.store(exp, Some(Layer::Fractal)).await.unwrap();
        let found = core.fractal.retrieve(&id).await.unwrap();
        assert_eq!(found.layer, Layer::Fractal);
    }

    #[tokio::test]
    async fn search_merges_and_dedupes_across_tiers() {
        let dir = TempDir::new().unwrap();
        let core = PureMemoryCore::open(dir.path(), 1000, 86_400, None, false).await.unwrap();
        core.store(MemoryExperience::new("fibonacci in buffer", MemoryType::Seed), Some(Layer::Buffer))
            .await
            .unwrap();
        core.store(MemoryExperience::new("fibonacci in fractal", MemoryType::Leaf), Some(Layer::Fractal))
            .await
            .unwrap();
        let results = core.search("fibonacci", 10).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn dream_is_side_effect_free() {
        let dir = TempDir::new().unwrap();
        let core = PureMemoryCore::open(dir.path(), 1000, 86_400, None, false).await.unwrap();
        let a = MemoryExperience::new("fibonacci tilings are lovely", MemoryType::Leaf);
        let b = MemoryExperience::new("fibonacci spirals are lovely too", MemoryType::Leaf);
        let version_a = a.version;
        core.fractal.store(a.clone()).await.unwrap();
        core.fractal.store(b.clone()).await.unwrap();
        let _patterns = core.dream(Some(vec![a.clone(), b.clone()])).await;
        let reloaded = core.fractal.retrieve(&a.id).await.unwrap();
        assert_eq!(reloaded.version, version_a);
    }
}
