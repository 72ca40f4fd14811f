//! Periodic sweep: ANALYSIS → EXTRACTION → CONSOLIDATION → PROMOTION → CLEANUP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use memoria_core::{
    fibonacci_weight, ids::generate_correlation_id, ConsolidationPhase, ConsolidationReport, Layer, MemoryExperience,
    MemoryType, Result, PHI_INVERSE,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::buffer::Buffer;
use crate::fractal::Fractal;
use crate::promoter::{promotion_score, should_promote, ResonanceCache};

/// Per-type retention window, in days. `None` means retained forever.
fn retention_days(memory_type: MemoryType) -> Option<i64> {
    match memory_type {
        MemoryType::Root => None,
        MemoryType::Branch => Some(90),
        MemoryType::Leaf => Some(30),
        MemoryType::Seed => Some(7),
    }
}

/// A keyword or emotional cluster surfaced by the EXTRACTION phase.
#[derive(Debug, Clone)]
pub struct PatternRecord {
    pub label: String,
    pub member_ids: Vec<String>,
    pub strength: f64,
}

pub struct ConsolidationEngine {
    buffer: Arc<Buffer>,
    fractal: Arc<Fractal>,
    resonance: Arc<ResonanceCache>,
    archive_on_cleanup: Arc<dyn Fn(MemoryExperience) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync>,
    in_progress: Mutex<()>,
    running: AtomicBool,
    last_report: Mutex<Option<ConsolidationReport>>,
}

impl ConsolidationEngine {
    pub fn new(
        buffer: Arc<Buffer>,
        fractal: Arc<Fractal>,
        resonance: Arc<ResonanceCache>,
        archive_on_cleanup: Arc<dyn Fn(MemoryExperience) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync>,
    ) -> Self {
        ConsolidationEngine {
            buffer,
            fractal,
            resonance,
            archive_on_cleanup,
            in_progress: Mutex::new(()),
            running: AtomicBool::new(false),
            last_report: Mutex::new(None),
        }
    }

    /// Run one cycle. Concurrent non-forced calls join the cycle already in
    /// flight rather than starting a second one: they wait for it to
    /// release the cycle lock and then return its report (single-flight).
    pub async fn consolidate(&self, force: bool) -> Result<ConsolidationReport> {
        if !force && self.running.load(Ordering::SeqCst) {
            drop(self.in_progress.lock().await);
            if let Some(report) = self.last_report.lock().await.clone() {
                return Ok(report);
            }
        }

        let _guard = self.in_progress.lock().await;
        self.running.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let cycle_id = generate_correlation_id();

        let result = self.run_cycle(&cycle_id).await;
        self.running.store(false, Ordering::SeqCst);

        let report = match result {
            Ok(mut report) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                report
            }
            Err(e) => {
                warn!(error = %e, cycle_id, "consolidation cycle aborted");
                ConsolidationReport {
                    cycle_id,
                    phase: ConsolidationPhase::Analysis,
                    memories_analyzed: 0,
                    memories_promoted: 0,
                    patterns_extracted: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        *self.last_report.lock().await = Some(report.clone());
        Ok(report)
    }

    async fn run_cycle(&self, cycle_id: &str) -> Result<ConsolidationReport> {
        // ANALYSIS
        let candidates = self.analysis_phase().await;
        info!(cycle_id, candidates = candidates.len(), phase = "analysis", "consolidation phase complete");

        // EXTRACTION
        let patterns = self.extraction_phase(&candidates);
        info!(cycle_id, patterns = patterns.len(), phase = "extraction", "consolidation phase complete");

        // CONSOLIDATION
        self.consolidation_phase(&candidates).await?;
        info!(cycle_id, phase = "consolidation", "consolidation phase complete");

        // PROMOTION
        let promoted = self.promotion_phase().await?;
        info!(cycle_id, promoted, phase = "promotion", "consolidation phase complete");

        // CLEANUP
        self.cleanup_phase().await?;
        info!(cycle_id, phase = "cleanup", "consolidation phase complete");

        Ok(ConsolidationReport {
            cycle_id: cycle_id.to_string(),
            phase: ConsolidationPhase::Cleanup,
            memories_analyzed: candidates.len(),
            memories_promoted: promoted,
            patterns_extracted: patterns.len(),
            duration_ms: 0,
        })
    }

    /// Load Buffer candidates with importance (promotion score) at or above
    /// the SEED→LEAF threshold.
    async fn analysis_phase(&self) -> Vec<MemoryExperience> {
        let mut all = Vec::new();
        // Buffer has no direct iteration API beyond search; we sweep with an
        // empty-ish broad query substitute by reading working memory and
        // falling back to a full scan via search("", cap).
        for exp in self.buffer.search("", usize::MAX).await {
            if promotion_score(&exp) >= PHI_INVERSE * PHI_INVERSE {
                all.push(exp);
            }
        }
        all
    }

    fn extraction_phase(&self, candidates: &[MemoryExperience]) -> Vec<PatternRecord> {
        let mut keyword_clusters: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for exp in candidates {
            for kw in &exp.keywords {
                keyword_clusters.entry(kw.clone()).or_default().push(exp.id.clone());
            }
        }

        let mut patterns = Vec::new();
        for (keyword, members) in keyword_clusters {
            if members.len() < 2 {
                continue;
            }
            let strength = fibonacci_weight(members.len() as u64);
            patterns.push(PatternRecord { label: keyword, member_ids: members, strength });
        }

        // Pairwise resonance as a secondary signal, not persisted beyond the
        // pattern strength it feeds.
        for pair in candidates.windows(2) {
            let _ = self.resonance.resonance(&pair[0], &pair[1]);
        }

        patterns
    }

    async fn consolidation_phase(&self, candidates: &[MemoryExperience]) -> Result<()> {
        for exp in candidates {
            if self.fractal.retrieve(&exp.id).await.is_none() {
                self.fractal.store(exp.clone()).await?;
            }
        }
        Ok(())
    }

    async fn promotion_phase(&self) -> Result<usize> {
        let mut promoted = 0;
        for exp in self.fractal.all_entries().await {
            if should_promote(&exp) {
                let previous_region = exp.memory_type;
                let mut exp = exp;
                exp.promote();
                self.fractal.reseat(exp, previous_region).await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn cleanup_phase(&self) -> Result<()> {
        self.buffer.prune_expired().await;

        for exp in self.fractal.all_entries().await {
            let Some(days) = retention_days(exp.memory_type) else { continue };
            if exp.age_days() > days as f64 {
                (self.archive_on_cleanup)(exp.clone()).await?;
                self.fractal.delete(&exp.id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{Layer, MemoryExperience, MemoryType};
    use tempfile::TempDir;

    async fn make_engine(dir: &TempDir) -> (ConsolidationEngine, Arc<Buffer>, Arc<Fractal>) {
        let buffer = Arc::new(Buffer::new(1000, 86_400, None));
        let fractal = Arc::new(Fractal::open(dir.path()).await.unwrap());
        let resonance = Arc::new(ResonanceCache::new());
        let sink: Arc<dyn Fn(MemoryExperience) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync> =
            Arc::new(|_exp| Box::pin(async { Ok(()) }));
        let engine = ConsolidationEngine::new(buffer.clone(), fractal.clone(), resonance, sink);
        (engine, buffer, fractal)
    }

    #[tokio::test]
    async fn cycle_promotes_high_scoring_seeds() {
        let dir = TempDir::new().unwrap();
        let (engine, buffer, fractal) = make_engine(&dir).await;

        for i in 0..10 {
            let mut exp = MemoryExperience::new(format!("experience {i}"), MemoryType::Seed);
            let resonance = 0.9 - (i as f64 * 0.1);
            exp.phi_metrics.phi_distance = memoria_core::PHI * (1.0 - resonance);
            exp.emotional_context.intensity = resonance;
            exp.emotional_context.valence = resonance;
            exp.phi_metrics.access_count = (resonance * 20.0) as u64;
            buffer.store(exp).await.unwrap();
        }

        let report = engine.consolidate(true).await.unwrap();
        assert!(report.memories_analyzed > 0);
        let leaves = fractal.region_ids(MemoryType::Leaf).await;
        assert!(!leaves.is_empty());
    }

    #[tokio::test]
    async fn forced_calls_each_run_a_fresh_cycle() {
        let dir = TempDir::new().unwrap();
        let (engine, _buffer, _fractal) = make_engine(&dir).await;
        let a = engine.consolidate(true).await.unwrap();
        let b = engine.consolidate(true).await.unwrap();
        assert_ne!(a.cycle_id, b.cycle_id);
    }

    #[tokio::test]
    async fn non_busy_non_forced_call_still_completes() {
        let dir = TempDir::new().unwrap();
        let (engine, _buffer, _fractal) = make_engine(&dir).await;
        // With no cycle in flight, a non-forced call runs its own cycle.
        let report = engine.consolidate(false).await.unwrap();
        assert_eq!(report.phase, ConsolidationPhase::Cleanup);
    }

    #[tokio::test]
    async fn cleanup_ages_out_retention_expired_entries() {
        let dir = TempDir::new().unwrap();
        let (engine, _buffer, fractal) = make_engine(&dir).await;

        let mut exp = MemoryExperience::new("ancient seed", MemoryType::Seed);
        exp.created_at = chrono::Utc::now() - chrono::Duration::days(30);
        exp.layer = Layer::Fractal;
        fractal.store(exp.clone()).await.unwrap();

        engine.cleanup_phase().await.unwrap();
        assert!(fractal.retrieve(&exp.id).await.is_none());
    }
}
