//! Trusted-principal identity scoring.
//!
//! The profile is configuration, not a hardcoded fingerprint: callers supply
//! the linguistic markers, domain-knowledge keywords, and interaction
//! patterns expected of their trusted principal.

use memoria_core::clip;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalProfile {
    /// Phrases/words characteristic of the principal's writing style.
    pub linguistic_markers: Vec<String>,
    /// Topic keywords only the principal would plausibly reference.
    pub domain_knowledge_keywords: Vec<String>,
    /// Interaction habits (e.g. "asks follow-up questions", "uses short replies").
    pub interaction_pattern_markers: Vec<String>,
    /// Typical emotional register words for coherence comparison.
    pub emotional_register_markers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityTier {
    Unlikely,
    Uncertain,
    Probable,
    Verified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityVerdict {
    pub trust_score: f64,
    pub tier: IdentityTier,
    pub linguistic_match: f64,
    pub emotional_coherence: f64,
    pub knowledge_depth: f64,
    pub behavioral_consistency: f64,
    pub memory_coherence: f64,
}

fn keyword_overlap_ratio(text_lower: &str, markers: &[String]) -> f64 {
    if markers.is_empty() {
        return 0.5; // no signal configured; neutral
    }
    let hits = markers.iter().filter(|m| text_lower.contains(&m.to_lowercase())).count();
    clip(hits as f64 / markers.len() as f64 * 2.0, 0.0, 1.0)
}

/// Weighted blend: linguistic 0.20, emotional 0.20, domain-knowledge 0.30,
/// interaction-pattern 0.15, shared-history 0.15.
pub fn verify_user_identity(text: &str, recent_history_overlap: f64, profile: &PrincipalProfile) -> IdentityVerdict {
    let text_lower = text.to_lowercase();

    let linguistic_match = keyword_overlap_ratio(&text_lower, &profile.linguistic_markers);
    let emotional_coherence = keyword_overlap_ratio(&text_lower, &profile.emotional_register_markers);
    let knowledge_depth = keyword_overlap_ratio(&text_lower, &profile.domain_knowledge_keywords);
    let behavioral_consistency = keyword_overlap_ratio(&text_lower, &profile.interaction_pattern_markers);
    let memory_coherence = clip(recent_history_overlap, 0.0, 1.0);

    let trust_score = linguistic_match * 0.20
        + emotional_coherence * 0.20
        + knowledge_depth * 0.30
        + behavioral_consistency * 0.15
        + memory_coherence * 0.15;

    let tier = if trust_score >= 0.7 {
        IdentityTier::Verified
    } else if trust_score >= 0.5 {
        IdentityTier::Probable
    } else if trust_score >= 0.3 {
        IdentityTier::Uncertain
    } else {
        IdentityTier::Unlikely
    };

    IdentityVerdict {
        trust_score,
        tier,
        linguistic_match,
        emotional_coherence,
        knowledge_depth,
        behavioral_consistency,
        memory_coherence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> PrincipalProfile {
        PrincipalProfile {
            linguistic_markers: vec!["phi-weighted".to_string(), "let's circle back".to_string()],
            domain_knowledge_keywords: vec!["fibonacci tilings".to_string(), "resonance cache".to_string()],
            interaction_pattern_markers: vec!["quick question".to_string()],
            emotional_register_markers: vec!["appreciate it".to_string()],
        }
    }

    #[test]
    fn high_overlap_yields_verified_or_probable() {
        let verdict = verify_user_identity(
            "quick question about fibonacci tilings and the resonance cache, phi-weighted of course, appreciate it",
            1.0,
            &sample_profile(),
        );
        assert!(verdict.trust_score >= 0.5);
    }

    #[test]
    fn no_overlap_yields_low_tier() {
        let verdict = verify_user_identity("totally unrelated generic text", 0.0, &sample_profile());
        assert!(matches!(verdict.tier, IdentityTier::Unlikely | IdentityTier::Uncertain));
    }

    #[test]
    fn empty_profile_is_neutral_not_zero() {
        let verdict = verify_user_identity("anything at all", 0.5, &PrincipalProfile::default());
        assert!(verdict.trust_score > 0.0);
    }
}
