use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPrediction {
    pub question: String,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalNeedPrediction {
    pub need: String,
    pub confidence: f64,
    pub preparation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalTrajectory {
    pub trajectory: String,
    pub fatigue_probability: f64,
    pub intervention_recommended: bool,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionType {
    StuckDetection,
    ErrorPattern,
    BetterApproach,
    FatigueDetection,
    ContradictionAlert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveIntervention {
    pub kind: InterventionType,
    pub confidence: f64,
    pub message: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTiming {
    Immediate,
    Prompt,
    Considered,
    Patient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTimingAdvice {
    pub timing: ResponseTiming,
    pub delay_seconds: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub recorded_at: DateTime<Utc>,
    pub content: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub prediction_correct: Option<bool>,
    pub prediction_type: Option<String>,
}
