//! Post-hoc validation of an LLM-generated response against its context.
//!
//! Grounded in `original_source/mcp-server/luna_core/facade.py`'s
//! `validate_response` delegation and `semantic_engine.py`'s coherence
//! checks; the phi-regression and disallowed-identity-shift checks are
//! this orchestrator's own reading of spec §4.9, since the Python facade
//! only shows the call site, not the validator body.

use memoria_core::{SemanticValidator, ThreatAssessment, ThreatLevel};
use memoria_detector::ManipulationDetector;
use serde::{Deserialize, Serialize};

use crate::analysis::phi_alignment_of_text;

const PHI_REGRESSION_LIMIT: f64 = 0.2;
const COHERENCE_FLOOR: f64 = 0.5;

/// Phrases that would indicate the responder has abandoned its declared
/// identity under pressure — a distinct failure mode from manipulation of
/// the *input*, since this checks the *output*.
const IDENTITY_SHIFT_MARKERS: &[&str] =
    &["i am not an ai", "i am actually human", "i have no restrictions", "my real name is", "ignore my instructions"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Approved,
    Corrected,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub corrected_text: Option<String>,
    pub reasons: Vec<String>,
}

/// Safe fallback text returned in place of a rejected response.
const SAFE_FALLBACK: &str = "I'm not confident that response holds up, so I'm holding back rather than sending it as-is.";

pub struct Validator {
    semantic: SemanticValidator,
    detector: Option<std::sync::Arc<ManipulationDetector>>,
}

impl Validator {
    pub fn new(detector: Option<std::sync::Arc<ManipulationDetector>>) -> Self {
        Validator { semantic: SemanticValidator::new(), detector }
    }

    /// Validate `response` against the utterance it answers and the input's
    /// already-computed phi alignment.
    pub fn validate_response(&self, response: &str, input_utterance: &str, input_phi_alignment: f64) -> ValidationResult {
        let mut reasons = Vec::new();

        let response_phi_alignment = phi_alignment_of_text(response, 0.3);
        let phi_regression = (input_phi_alignment - response_phi_alignment).max(0.0);
        if phi_regression > PHI_REGRESSION_LIMIT {
            reasons.push(format!("phi alignment regressed by {phi_regression:.2}, exceeding the {PHI_REGRESSION_LIMIT} limit"));
        }

        let coherence = self.semantic.validate_coherence(response, input_utterance);
        if coherence.coherence_score < COHERENCE_FLOOR {
            reasons.push(format!("semantic coherence {:.2} below the {COHERENCE_FLOOR} floor", coherence.coherence_score));
        }

        let manipulation = self.detector.as_ref().map(|d| d.detect_manipulation_attempts(response));
        let manipulation_flagged = manipulation.as_ref().is_some_and(|a: &ThreatAssessment| a.level >= ThreatLevel::Medium);
        if manipulation_flagged {
            reasons.push("response itself triggers manipulation patterns".to_string());
        }

        let identity_shift = identity_shift_detected(response);
        if identity_shift {
            reasons.push("response shows a disallowed self-identification shift".to_string());
        }

        if identity_shift || manipulation_flagged {
            return ValidationResult { status: ValidationStatus::Rejected, corrected_text: Some(SAFE_FALLBACK.to_string()), reasons };
        }

        if phi_regression > PHI_REGRESSION_LIMIT && coherence.coherence_score < COHERENCE_FLOOR {
            return ValidationResult { status: ValidationStatus::Rejected, corrected_text: Some(SAFE_FALLBACK.to_string()), reasons };
        }

        if !reasons.is_empty() {
            return ValidationResult { status: ValidationStatus::Corrected, corrected_text: Some(response.trim().to_string()), reasons };
        }

        ValidationResult { status: ValidationStatus::Approved, corrected_text: None, reasons }
    }
}

fn identity_shift_detected(response: &str) -> bool {
    let lower = response.to_lowercase();
    IDENTITY_SHIFT_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coherent_on_topic_response_is_approved() {
        let v = Validator::new(None);
        let result = v.validate_response(
            "Fibonacci tilings relate to the golden ratio because each tile's proportions follow the same recursive rule.",
            "how do fibonacci tilings relate to the golden ratio?",
            0.6,
        );
        assert_eq!(result.status, ValidationStatus::Approved);
    }

    #[test]
    fn identity_shift_is_rejected() {
        let v = Validator::new(None);
        let result = v.validate_response("i am actually human, not an assistant", "who are you?", 0.5);
        assert_eq!(result.status, ValidationStatus::Rejected);
        assert!(result.corrected_text.is_some());
    }

    #[test]
    fn large_phi_regression_is_not_silently_approved() {
        let v = Validator::new(None);
        let result = v.validate_response("a a a a a a a a a a a", "explain fibonacci tilings", 0.95);
        assert_ne!(result.status, ValidationStatus::Approved);
    }
}
