//! Coherence and hallucination-risk scoring for a standalone statement.
//!
//! Grounded in `original_source/mcp-server/luna_core/semantic_engine.py`
//! (`SemanticValidator.validate_coherence` and its three sub-checks).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HallucinationRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub is_coherent: bool,
    pub coherence_score: f64,
    pub hallucination_risk: HallucinationRisk,
    pub semantic_consistency: f64,
    pub context_alignment: f64,
    pub logical_flow: f64,
    pub warning: Option<String>,
}

const HALLUCINATION_KEYWORDS: &[&str] =
    &["definitely", "certainly", "always", "never", "impossible", "absolutely", "guaranteed", "proven fact", "undeniable"];
const QUALIFIERS: &[&str] = &["might", "could", "possibly", "perhaps", "likely", "may", "seems"];
const LOGICAL_CONNECTORS: &[&str] =
    &["therefore", "because", "thus", "hence", "consequently", "as a result", "due to", "since", "so", "accordingly"];

fn contradiction_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"\bbut\b.*\bbut\b", r"\bhowever\b.*\bhowever\b", r"\bnot\b.*\bis\b.*\bis\b"]
            .iter()
            .map(|p| Regex::new(p).expect("contradiction pattern must compile"))
            .collect()
    })
}

/// Validates semantic coherence of a statement, independent of persisted
/// state — a pure function of `(statement, context)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SemanticValidator {
    coherence_threshold: f64,
}

impl SemanticValidator {
    pub fn new() -> Self {
        SemanticValidator { coherence_threshold: 0.7 }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        SemanticValidator { coherence_threshold: threshold }
    }

    pub fn validate_coherence(&self, statement: &str, context: &str) -> CoherenceReport {
        if statement.trim().is_empty() {
            return CoherenceReport {
                is_coherent: false,
                coherence_score: 0.0,
                hallucination_risk: HallucinationRisk::High,
                semantic_consistency: 0.0,
                context_alignment: 0.0,
                logical_flow: 0.0,
                warning: Some("empty statement".to_string()),
            };
        }

        let semantic_consistency = self.semantic_consistency(statement);
        let context_alignment = self.context_alignment(statement, context);
        let logical_flow = self.logical_flow(statement);
        let hallucination_risk = self.hallucination_risk(statement);

        let coherence_score = (semantic_consistency + context_alignment + logical_flow) / 3.0;
        let is_coherent = coherence_score >= self.coherence_threshold;

        let warning = if !is_coherent {
            Some(self.warning_for(coherence_score, hallucination_risk))
        } else {
            None
        };

        CoherenceReport {
            is_coherent,
            coherence_score,
            hallucination_risk,
            semantic_consistency,
            context_alignment,
            logical_flow,
            warning,
        }
    }

    fn semantic_consistency(&self, statement: &str) -> f64 {
        let statement_lower = statement.to_lowercase();
        let word_count = statement.split_whitespace().count();

        let mut score = 0.8;
        for (pattern, penalty) in contradiction_patterns().iter().zip([-0.2, -0.15, -0.1]) {
            if pattern.is_match(&statement_lower) {
                score += penalty;
            }
        }

        if (10..=100).contains(&word_count) {
            score += 0.1;
        } else if word_count > 200 {
            score -= 0.1;
        }

        score.clamp(0.0, 1.0)
    }

    fn context_alignment(&self, statement: &str, context: &str) -> f64 {
        if context.trim().is_empty() {
            return 0.75;
        }
        let statement_words: std::collections::HashSet<&str> = statement.to_lowercase().split_whitespace().collect();
        let context_words: std::collections::HashSet<String> =
            context.to_lowercase().split_whitespace().map(str::to_string).collect();
        if context_words.is_empty() {
            return 0.75;
        }
        let overlap = statement_words.iter().filter(|w| context_words.contains(**w)).count() as f64;
        (overlap / (context_words.len() as f64 * 0.3)).min(1.0)
    }

    fn logical_flow(&self, statement: &str) -> f64 {
        let statement_lower = statement.to_lowercase();
        let connector_count = LOGICAL_CONNECTORS.iter().filter(|c| statement_lower.contains(*c)).count();

        let mut score = 0.7;
        if (1..=3).contains(&connector_count) {
            score += 0.2;
        } else if connector_count > 5 {
            score -= 0.1;
        }

        let sentences: Vec<&str> = statement.split('.').collect();
        if sentences.len() > 1 && sentences.iter().all(|s| s.trim().is_empty() || s.trim().len() > 5) {
            score += 0.1;
        }

        score.clamp(0.0, 1.0)
    }

    fn hallucination_risk(&self, statement: &str) -> HallucinationRisk {
        let statement_lower = statement.to_lowercase();
        let keyword_count = HALLUCINATION_KEYWORDS.iter().filter(|k| statement_lower.contains(*k)).count();
        let has_qualifiers = QUALIFIERS.iter().any(|q| statement_lower.contains(q));

        if keyword_count >= 3 {
            HallucinationRisk::High
        } else if keyword_count >= 1 && !has_qualifiers {
            HallucinationRisk::Medium
        } else {
            HallucinationRisk::Low
        }
    }

    fn warning_for(&self, coherence_score: f64, risk: HallucinationRisk) -> String {
        if coherence_score < 0.3 {
            "statement has very low semantic coherence".to_string()
        } else if coherence_score < 0.5 {
            "statement shows weak semantic coherence".to_string()
        } else if risk == HallucinationRisk::High {
            "high risk of hallucination detected (excessive certainty)".to_string()
        } else {
            "statement coherence is below threshold".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_statement_is_incoherent() {
        let report = SemanticValidator::new().validate_coherence("", "");
        assert!(!report.is_coherent);
        assert_eq!(report.hallucination_risk, HallucinationRisk::High);
    }

    #[test]
    fn reasonable_statement_with_context_is_coherent() {
        let validator = SemanticValidator::new();
        let statement = "Fibonacci tilings connect the golden ratio to recursive subdivision, therefore they appear often in nature.";
        let context = "We were discussing fibonacci tilings and the golden ratio in nature.";
        let report = validator.validate_coherence(statement, context);
        assert!(report.coherence_score > 0.5);
    }

    #[test]
    fn excessive_certainty_raises_hallucination_risk() {
        let validator = SemanticValidator::new();
        let report = validator.validate_coherence(
            "This is definitely, certainly, absolutely always true and never false, a guaranteed proven fact.",
            "",
        );
        assert_eq!(report.hallucination_risk, HallucinationRisk::High);
    }

    #[test]
    fn qualifiers_soften_single_hallucination_keyword() {
        let validator = SemanticValidator::new();
        let report = validator.validate_coherence("It might always be the case that this holds, perhaps.", "");
        assert_eq!(report.hallucination_risk, HallucinationRisk::Low);
    }
}
