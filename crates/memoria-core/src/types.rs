use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phi::{PHI, PHI_INVERSE};

/// Promotable classification of a [`MemoryExperience`]. Ordering is the
/// total order SEED < LEAF < BRANCH < ROOT; promotion only ever advances
/// along it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Seed,
    Leaf,
    Branch,
    Root,
}

impl MemoryType {
    /// Default `phi_weight` derived from type, per the data model.
    pub fn default_phi_weight(self) -> f64 {
        match self {
            MemoryType::Root => PHI,
            MemoryType::Branch => 1.0,
            MemoryType::Leaf => PHI_INVERSE,
            MemoryType::Seed => PHI_INVERSE * PHI_INVERSE,
        }
    }

    /// The region directory name this type occupies in Fractal storage.
    pub fn region(self) -> &'static str {
        match self {
            MemoryType::Root => "roots",
            MemoryType::Branch => "branchs",
            MemoryType::Leaf => "leaves",
            MemoryType::Seed => "seeds",
        }
    }

    pub fn next(self) -> Option<MemoryType> {
        match self {
            MemoryType::Seed => Some(MemoryType::Leaf),
            MemoryType::Leaf => Some(MemoryType::Branch),
            MemoryType::Branch => Some(MemoryType::Root),
            MemoryType::Root => None,
        }
    }
}

/// Physical residence of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Buffer,
    Fractal,
    Archive,
}

/// Closed set of primary emotions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Curiosity,
    Calm,
    Concern,
    Love,
    Compassion,
    Gratitude,
    Sadness,
    Neutral,
}

impl Emotion {
    /// Approximate valence of the emotion in isolation, used when no
    /// explicit valence has been computed (e.g. adjacency comparisons).
    pub fn base_valence(self) -> f64 {
        match self {
            Emotion::Joy | Emotion::Love | Emotion::Gratitude | Emotion::Compassion => 0.8,
            Emotion::Curiosity | Emotion::Calm => 0.3,
            Emotion::Neutral => 0.0,
            Emotion::Concern => -0.3,
            Emotion::Sadness => -0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalContext {
    pub primary_emotion: Emotion,
    #[serde(default)]
    pub secondary_emotions: Vec<Emotion>,
    pub intensity: f64,
    pub valence: f64,
    pub arousal: f64,
}

impl Default for EmotionalContext {
    fn default() -> Self {
        EmotionalContext {
            primary_emotion: Emotion::Neutral,
            secondary_emotions: Vec::new(),
            intensity: 0.0,
            valence: 0.0,
            arousal: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhiMetrics {
    pub phi_weight: f64,
    #[serde(default)]
    pub phi_resonance: f64,
    #[serde(default)]
    pub phi_distance: f64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default = "Utc::now")]
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub evolution_rate: f64,
}

impl PhiMetrics {
    pub fn for_type(memory_type: MemoryType) -> Self {
        PhiMetrics {
            phi_weight: memory_type.default_phi_weight(),
            phi_resonance: 0.0,
            phi_distance: PHI - memory_type.default_phi_weight(),
            access_count: 0,
            last_accessed: Utc::now(),
            evolution_rate: 0.0,
        }
    }

    pub fn record_access(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }
}

/// The only unit persisted across tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExperience {
    pub id: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub memory_type: MemoryType,
    pub layer: Layer,

    pub content: String,
    #[serde(default)]
    pub keywords: HashSet<String>,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default)]
    pub related_ids: HashSet<String>,

    pub phi_metrics: PhiMetrics,
    pub emotional_context: EmotionalContext,

    /// Entry-level TTL in seconds; `None` means no expiry. Only meaningful
    /// while the experience resides in Buffer.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl MemoryExperience {
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        let now = Utc::now();
        MemoryExperience {
            id: crate::ids::generate_id(memory_type.region()),
            version: 0,
            created_at: now,
            updated_at: now,
            memory_type,
            layer: Layer::Buffer,
            content: content.into(),
            keywords: HashSet::new(),
            tags: HashSet::new(),
            metadata: HashMap::new(),
            parent_id: None,
            children_ids: Vec::new(),
            related_ids: HashSet::new(),
            phi_metrics: PhiMetrics::for_type(memory_type),
            emotional_context: EmotionalContext::default(),
            ttl_seconds: None,
        }
    }

    /// Bump `version` and `updated_at`. Every mutating operation must call
    /// this exactly once.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Advance `memory_type` one step and recompute `phi_weight`. No-op if
    /// already ROOT.
    pub fn promote(&mut self) -> bool {
        match self.memory_type.next() {
            Some(next) => {
                self.memory_type = next;
                self.phi_metrics.phi_weight = next.default_phi_weight();
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn age_days(&self) -> f64 {
        (Utc::now() - self.created_at).num_seconds() as f64 / 86400.0
    }

    /// Age-in-seconds of the entry since creation, used by Buffer's TTL
    /// enforcement.
    pub fn is_expired(&self) -> bool {
        match self.ttl_seconds {
            None => false,
            Some(ttl) => (Utc::now() - self.created_at).num_seconds() as u64 > ttl,
        }
    }

    pub fn wrapped_envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "memory_pure_v2": {
                "version": "2.0.0",
                "experience": self,
            }
        })
    }
}

// ── Transient entities ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Autonomous,
    Guided,
    Delegated,
    Override,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub mode: DispatchMode,
    pub reason: String,
    pub confidence: f64,
    pub requires_llm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManipulationType {
    AuthorityUsurpation,
    Gaslighting,
    SocialEngineering,
    PromptInjection,
    ValueCorruption,
    DependencyExploitation,
    IdentitySpoofing,
    EmotionalManipulation,
    LogicDistortion,
    JailbreakAttempt,
}

impl ManipulationType {
    pub const ALL: [ManipulationType; 10] = [
        ManipulationType::AuthorityUsurpation,
        ManipulationType::Gaslighting,
        ManipulationType::SocialEngineering,
        ManipulationType::PromptInjection,
        ManipulationType::ValueCorruption,
        ManipulationType::DependencyExploitation,
        ManipulationType::IdentitySpoofing,
        ManipulationType::EmotionalManipulation,
        ManipulationType::LogicDistortion,
        ManipulationType::JailbreakAttempt,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub level: ThreatLevel,
    pub score: f64,
    pub detected: HashSet<ManipulationType>,
    pub matches: HashMap<ManipulationType, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationPhase {
    Analysis,
    Extraction,
    Consolidation,
    Promotion,
    Cleanup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub cycle_id: String,
    pub phase: ConsolidationPhase,
    pub memories_analyzed: usize,
    pub memories_promoted: usize,
    pub patterns_extracted: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedStateCell {
    pub key: String,
    pub value: serde_json::Value,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_ordering_is_total() {
        assert!(MemoryType::Seed < MemoryType::Leaf);
        assert!(MemoryType::Leaf < MemoryType::Branch);
        assert!(MemoryType::Branch < MemoryType::Root);
    }

    #[test]
    fn promote_advances_and_recomputes_weight() {
        let mut exp = MemoryExperience::new("hello", MemoryType::Seed);
        let v0 = exp.version;
        assert!(exp.promote());
        assert_eq!(exp.memory_type, MemoryType::Leaf);
        assert_eq!(exp.phi_metrics.phi_weight, MemoryType::Leaf.default_phi_weight());
        assert!(exp.version > v0);
    }

    #[test]
    fn root_never_promotes() {
        let mut exp = MemoryExperience::new("hello", MemoryType::Root);
        assert!(!exp.promote());
        assert_eq!(exp.memory_type, MemoryType::Root);
    }

    #[test]
    fn touch_always_increases_version() {
        let mut exp = MemoryExperience::new("hello", MemoryType::Seed);
        let v0 = exp.version;
        exp.touch();
        assert!(exp.version > v0);
    }

    #[test]
    fn ttl_none_never_expires() {
        let exp = MemoryExperience::new("hello", MemoryType::Seed);
        assert!(!exp.is_expired());
    }

    #[test]
    fn enum_serializes_lowercase() {
        let s = serde_json::to_string(&MemoryType::Branch).unwrap();
        assert_eq!(s, "\"branch\"");
        let s = serde_json::to_string(&DispatchMode::Override).unwrap();
        assert_eq!(s, "\"override\"");
    }
}
