//! Input analysis: the "Analyze" phase of [`crate::orchestrator::Orchestrator`].
//!
//! Grounded in `original_source/mcp-server/luna_core/luna_orchestrator.py`
//! (`_analyze_input`, `_check_phi_coherence`, `_calculate_analysis_confidence`),
//! with `_check_phi_coherence`'s complexity-from-text shape reused via
//! `memoria_core::phi::{phi_value_from_metrics, phi_coherence}`.

use memoria_core::{phi_coherence, phi_value_from_metrics, EmotionalContext, ThreatAssessment};
use serde::{Deserialize, Serialize};

/// Result of analyzing a single utterance, feeding the dispatch decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub emotion: EmotionalContext,
    pub phi_alignment: f64,
    pub manipulation: ThreatAssessment,
    pub memory_relevance: f64,
    pub consciousness_impact: f64,
    pub confidence: f64,
}

/// Phi coherence of a piece of text: word-diversity stands in for cognitive
/// complexity, `emotional_depth` is the detected intensity, self-awareness
/// is held at a neutral constant (the orchestrator has no model of its own
/// self-awareness independent of a given utterance).
pub fn phi_alignment_of_text(text: &str, emotional_intensity: f64) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.5;
    }
    let unique: std::collections::HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let cognitive_complexity = unique.len() as f64 / words.len() as f64;
    let emotional_depth = emotional_intensity.max(0.1);
    let phi_value = phi_value_from_metrics(emotional_depth, cognitive_complexity, 0.5);
    phi_coherence(phi_value)
}

/// Mean of the four confidence factors per the analysis contract:
/// phi alignment, memory relevance, inverted manipulation risk, and
/// dominant-emotion intensity.
pub fn analysis_confidence(phi_alignment: f64, memory_relevance: f64, manipulation_score: f64, emotional_intensity: f64) -> f64 {
    (phi_alignment + memory_relevance + (1.0 - manipulation_score) + emotional_intensity) / 4.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_neutral_alignment() {
        assert_eq!(phi_alignment_of_text("", 0.0), 0.5);
    }

    #[test]
    fn varied_vocabulary_raises_complexity_driven_alignment() {
        let repetitive = phi_alignment_of_text("go go go go go go go go", 0.3);
        let varied = phi_alignment_of_text("fibonacci spirals echo recursive golden subdivisions elegantly", 0.3);
        assert!(varied >= repetitive);
    }

    #[test]
    fn confidence_is_mean_of_four_factors() {
        let c = analysis_confidence(0.8, 0.6, 0.2, 0.4);
        assert!((c - (0.8 + 0.6 + 0.8 + 0.4) / 4.0).abs() < 1e-9);
    }
}
