//! Promotion scoring and inter-experience resonance.

use std::collections::HashMap;
use std::sync::Mutex;

use memoria_core::{clip, MemoryExperience, MemoryType, PHI, PHI_INVERSE};

const W_PHI: f64 = 0.382;
const W_EMO: f64 = 0.236;
const W_TMP: f64 = 0.236;
const W_ACC: f64 = 0.146;

/// Thresholds an experience's promotion score must cross to advance,
/// indexed by its *current* type.
pub fn promotion_threshold(current: MemoryType) -> Option<f64> {
    match current {
        MemoryType::Seed => Some(PHI_INVERSE * PHI_INVERSE), // ~0.382
        MemoryType::Leaf => Some(PHI_INVERSE),                // ~0.618
        MemoryType::Branch => Some(0.764),
        MemoryType::Root => None,
    }
}

/// Weighted promotion score in `[0, 1]` (approximately; individual
/// components are each bounded to `[0,1]`).
pub fn promotion_score(exp: &MemoryExperience) -> f64 {
    let phi_component = clip(1.0 - exp.phi_metrics.phi_distance / PHI, 0.0, 1.0);
    let emotional_component =
        exp.emotional_context.intensity * (1.0 + exp.emotional_context.valence.max(0.0)) / 2.0;
    let temporal_component = (-exp.age_days() / 30.0).exp();
    let access_component = 1.0 - 1.0 / (1.0 + (1.0 + exp.phi_metrics.access_count as f64).ln());

    W_PHI * phi_component + W_EMO * emotional_component + W_TMP * temporal_component + W_ACC * access_component
}

/// Whether `exp` currently qualifies to advance to the next `MemoryType`.
pub fn should_promote(exp: &MemoryExperience) -> bool {
    match promotion_threshold(exp.memory_type) {
        Some(threshold) => promotion_score(exp) >= threshold,
        None => false,
    }
}

fn type_distance(a: MemoryType, b: MemoryType) -> u8 {
    (a as u8).abs_diff(b as u8)
}

/// Resonance between two experiences: a weighted blend of semantic overlap,
/// emotional similarity, and type adjacency.
fn compute_resonance(a: &MemoryExperience, b: &MemoryExperience) -> f64 {
    if a.id == b.id {
        return 1.0;
    }

    let semantic = jaccard(&a.keywords, &b.keywords) * 0.6 + content_word_overlap(&a.content, &b.content) * 0.4;

    let emotional = if a.emotional_context.primary_emotion == b.emotional_context.primary_emotion {
        1.0
    } else {
        let valence_distance = (a.emotional_context.valence - b.emotional_context.valence).abs();
        (1.0 - valence_distance / 2.0).clamp(0.0, 1.0)
    };

    let type_adjacency = match type_distance(a.memory_type, b.memory_type) {
        0 => 1.0,
        1 => PHI_INVERSE,
        _ => PHI_INVERSE * PHI_INVERSE,
    };

    (semantic + emotional + type_adjacency) / 3.0
}

fn jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn content_word_overlap(a: &str, b: &str) -> f64 {
    let wa: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let wb: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if wa.is_empty() && wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count() as f64;
    let union = wa.union(&wb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Resonance cache keyed by the sorted `(id_a, id_b)` pair, invalidated
/// whenever either experience's `version` changes.
pub struct ResonanceCache {
    entries: Mutex<HashMap<(String, String), (u64, u64, f64)>>,
}

impl Default for ResonanceCache {
    fn default() -> Self {
        ResonanceCache { entries: Mutex::new(HashMap::new()) }
    }
}

impl ResonanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &MemoryExperience, b: &MemoryExperience) -> (String, String) {
        if a.id <= b.id {
            (a.id.clone(), b.id.clone())
        } else {
            (b.id.clone(), a.id.clone())
        }
    }

    pub fn resonance(&self, a: &MemoryExperience, b: &MemoryExperience) -> f64 {
        let key = Self::key(a, b);
        let mut entries = self.entries.lock().unwrap();
        if let Some(&(va, vb, score)) = entries.get(&key) {
            if va == a.version && vb == b.version {
                return score;
            }
        }
        let score = compute_resonance(a, b);
        entries.insert(key, (a.version, b.version, score));
        score
    }

    pub fn invalidate(&self, id: &str) {
        self.entries.lock().unwrap().retain(|(a, b), _| a != id && b != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::MemoryExperience;

    #[test]
    fn resonance_with_self_is_one() {
        let exp = MemoryExperience::new("hello", MemoryType::Seed);
        assert_eq!(compute_resonance(&exp, &exp), 1.0);
    }

    #[test]
    fn resonance_is_symmetric() {
        let a = MemoryExperience::new("fibonacci tilings are beautiful", MemoryType::Seed);
        let b = MemoryExperience::new("beautiful fibonacci spirals", MemoryType::Leaf);
        assert_eq!(compute_resonance(&a, &b), compute_resonance(&b, &a));
    }

    #[test]
    fn resonance_is_bounded() {
        let a = MemoryExperience::new("alpha", MemoryType::Seed);
        let b = MemoryExperience::new("omega entirely unrelated content indeed", MemoryType::Root);
        let r = compute_resonance(&a, &b);
        assert!((0.0..=1.0).contains(&r));
    }

    #[test]
    fn promotion_score_is_bounded() {
        let exp = MemoryExperience::new("x", MemoryType::Seed);
        let score = promotion_score(&exp);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn should_promote_respects_threshold() {
        let mut exp = MemoryExperience::new("x", MemoryType::Seed);
        exp.phi_metrics.phi_distance = 0.0;
        exp.emotional_context.intensity = 1.0;
        exp.emotional_context.valence = 1.0;
        exp.phi_metrics.access_count = 50;
        assert!(should_promote(&exp));
    }

    #[test]
    fn root_never_eligible_for_promotion() {
        let exp = MemoryExperience::new("x", MemoryType::Root);
        assert!(!should_promote(&exp));
    }

    #[test]
    fn resonance_cache_invalidates_on_version_change() {
        let cache = ResonanceCache::new();
        let a = MemoryExperience::new("alpha beta", MemoryType::Seed);
        let mut b = MemoryExperience::new("beta gamma", MemoryType::Leaf);
        let first = cache.resonance(&a, &b);
        b.touch();
        let second = cache.resonance(&a, &b);
        assert_eq!(first, second); // same content, recomputed score happens to match
        cache.invalidate(&b.id);
        // After invalidation the entry is gone; a subsequent call recomputes cleanly.
        let third = cache.resonance(&a, &b);
        assert_eq!(third, second);
    }
}
