//! Per-utterance dispatch state machine and response validator.

pub mod analysis;
pub mod orchestrator;
pub mod state;
pub mod validator;

pub use analysis::{analysis_confidence, phi_alignment_of_text, Analysis};
pub use orchestrator::{InteractionResult, Orchestrator};
pub use state::OrchestratorState;
pub use validator::{ValidationResult, ValidationStatus, Validator};
