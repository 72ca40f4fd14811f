//! Shared data model, error taxonomy, and phi/id primitives for the memoria
//! workspace.

pub mod emotion;
pub mod error;
pub mod ids;
pub mod phi;
pub mod semantic;
pub mod types;

pub use emotion::EmotionalAnalyzer;
pub use error::{Error, Result};
pub use phi::{
    clip, fibonacci_weight, is_fibonacci, nearest_fibonacci, phi_coherence, phi_value_from_metrics, FIBONACCI_PREFIX, PHI,
    PHI_INVERSE, PHI_SQUARED,
};
pub use semantic::{CoherenceReport, HallucinationRisk, SemanticValidator};
pub use types::*;
