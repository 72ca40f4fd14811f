//! Predictive core: anticipates likely follow-up questions, technical
//! needs, and emotional trajectory from interaction history, and flags
//! proactive-intervention moments.

pub mod config;
pub mod types;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

pub use config::WorkProfile;
pub use types::*;

const HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct PatternEntry {
    pattern: String,
    outcome: InteractionOutcome,
}

pub struct PredictiveCore {
    profile: WorkProfile,
    session_start: DateTime<Utc>,
    last_interaction: Mutex<DateTime<Utc>>,
    history: Mutex<VecDeque<InteractionRecord>>,
    pattern_database: Mutex<HashMap<String, Vec<PatternEntry>>>,
    prediction_accuracy: Mutex<HashMap<String, f64>>,
}

impl PredictiveCore {
    pub fn new(profile: WorkProfile) -> Self {
        let now = Utc::now();
        PredictiveCore {
            profile,
            session_start: now,
            last_interaction: Mutex::new(now),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            pattern_database: Mutex::new(HashMap::new()),
            prediction_accuracy: Mutex::new(HashMap::new()),
        }
    }

    pub async fn predict_next_questions(&self, user_input: &str) -> Vec<QuestionPrediction> {
        let lower = user_input.to_lowercase();
        let mut predictions = Vec::new();

        if lower.contains("error") {
            predictions.push(QuestionPrediction {
                question: "How to fix this error?".to_string(),
                confidence: 0.8,
                reasoning: "error mentioned, fix likely needed".to_string(),
            });
            predictions.push(QuestionPrediction {
                question: "What causes this error?".to_string(),
                confidence: 0.6,
                reasoning: "understanding root cause is a common pattern".to_string(),
            });
        } else if lower.contains("implement") {
            predictions.push(QuestionPrediction {
                question: "Can you show me an example?".to_string(),
                confidence: 0.7,
                reasoning: "implementation requests often need examples".to_string(),
            });
            predictions.push(QuestionPrediction {
                question: "What are the dependencies?".to_string(),
                confidence: 0.5,
                reasoning: "implementation requires a dependency check".to_string(),
            });
        } else if lower.contains('?') {
            predictions.push(QuestionPrediction {
                question: "Can you elaborate on that?".to_string(),
                confidence: 0.6,
                reasoning: "questions often need clarification".to_string(),
            });
        }

        let hour = Utc::now().format("%H").to_string().parse::<u32>().unwrap_or(0);
        if self.profile.is_peak_hour(hour) {
            predictions.push(QuestionPrediction {
                question: "What's the next step?".to_string(),
                confidence: 0.7,
                reasoning: "peak working hours, productivity focus".to_string(),
            });
        }

        predictions.extend(self.analyze_recent_patterns().await);

        predictions.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        predictions.truncate(5);
        predictions
    }

    pub fn predict_technical_needs(&self, user_input: &str) -> Vec<TechnicalNeedPrediction> {
        let lower = user_input.to_lowercase();
        let mut needs = Vec::new();

        if lower.contains("docker") || lower.contains("container") {
            needs.push(TechnicalNeedPrediction {
                need: "container commands reference".to_string(),
                confidence: 0.7,
                preparation: "docker-compose logs, docker ps, docker exec".to_string(),
            });
        }
        if lower.contains(".py") || lower.contains("python") || lower.contains(".rs") || lower.contains("rust") {
            needs.push(TechnicalNeedPrediction {
                need: "import/dependency verification".to_string(),
                confidence: 0.6,
                preparation: "check imports and declared dependencies".to_string(),
            });
        }
        if lower.contains("config") || lower.contains(".json") || lower.contains(".toml") {
            needs.push(TechnicalNeedPrediction {
                need: "configuration validation".to_string(),
                confidence: 0.8,
                preparation: "syntax check, required fields present".to_string(),
            });
        }
        if lower.contains("error") || lower.contains("bug") {
            needs.push(TechnicalNeedPrediction {
                need: "debugging tools".to_string(),
                confidence: 0.9,
                preparation: "log analysis, stack trace examination".to_string(),
            });
        }

        needs
    }

    pub fn predict_emotional_evolution(&self, frustration_level: f64) -> EmotionalTrajectory {
        let hours_working = (Utc::now() - self.session_start).num_seconds() as f64 / 3600.0;
        let fatigue_probability = (hours_working / 3.0).min(1.0).max(0.0);

        let (trajectory, intervention_recommended) = if frustration_level > 0.5 {
            ("escalating_frustration", true)
        } else if fatigue_probability > 0.7 {
            ("increasing_fatigue", true)
        } else {
            ("stable_productive", false)
        };

        let recommended_action = if trajectory == "escalating_frustration" {
            "suggest breaking the problem into smaller steps".to_string()
        } else if trajectory == "increasing_fatigue" {
            "recommend a short break, productivity is declining".to_string()
        } else if fatigue_probability > 0.8 {
            "strong recommendation for a break after 2+ hours continuous work".to_string()
        } else {
            "continue current approach, state is stable".to_string()
        };

        EmotionalTrajectory {
            trajectory: trajectory.to_string(),
            fatigue_probability,
            intervention_recommended,
            recommended_action,
        }
    }

    pub async fn response_timing(&self) -> ResponseTimingAdvice {
        let last = *self.last_interaction.lock().await;
        let elapsed = (Utc::now() - last).num_seconds();

        if elapsed < 5 {
            ResponseTimingAdvice { timing: ResponseTiming::Immediate, delay_seconds: 0, reason: "quick succession, maintain flow".to_string() }
        } else if elapsed < 30 {
            ResponseTimingAdvice { timing: ResponseTiming::Prompt, delay_seconds: 1, reason: "active engagement, respond quickly".to_string() }
        } else if elapsed < 120 {
            ResponseTimingAdvice { timing: ResponseTiming::Considered, delay_seconds: 2, reason: "thinking time, provide a thoughtful response".to_string() }
        } else {
            ResponseTimingAdvice { timing: ResponseTiming::Patient, delay_seconds: 0, reason: "extended pause, wait for an explicit request".to_string() }
        }
    }

    /// Returns `None` unless the best candidate intervention clears a
    /// confidence bar of 0.75.
    pub async fn should_intervene_proactively(&self, current_approach: Option<&str>) -> Option<ProactiveIntervention> {
        let mut candidates = Vec::new();
        let now = Utc::now();

        let last = *self.last_interaction.lock().await;
        let minutes_stuck = (now - last).num_seconds() as f64 / 60.0;
        if minutes_stuck > self.profile.stuck_threshold_minutes {
            candidates.push(ProactiveIntervention {
                kind: InterventionType::StuckDetection,
                confidence: 0.9,
                message: "progress seems stalled, want help analyzing the issue?".to_string(),
                reason: format!("no progress for {} minutes", minutes_stuck as i64),
            });
        }

        if self.detect_recurring_error().await {
            candidates.push(ProactiveIntervention {
                kind: InterventionType::ErrorPattern,
                confidence: 0.85,
                message: "this error has occurred before, a known fix is ready".to_string(),
                reason: "recurring error pattern detected".to_string(),
            });
        }

        if let Some(approach) = current_approach {
            if let Some(better) = check_better_approach(approach) {
                candidates.push(ProactiveIntervention {
                    kind: InterventionType::BetterApproach,
                    confidence: 0.7,
                    message: format!("a more efficient approach exists: {better}"),
                    reason: "optimization opportunity detected".to_string(),
                });
            }
        }

        let hours_working = (now - self.session_start).num_seconds() as f64 / 3600.0;
        if hours_working > self.profile.fatigue_threshold_hours {
            candidates.push(ProactiveIntervention {
                kind: InterventionType::FatigueDetection,
                confidence: 0.8,
                message: "extended continuous work session, a short break would help".to_string(),
                reason: format!("working for {hours_working:.1} hours"),
            });
        }

        if self.detect_contradiction(current_approach.unwrap_or("")).await {
            candidates.push(ProactiveIntervention {
                kind: InterventionType::ContradictionAlert,
                confidence: 0.9,
                message: "this seems to contradict an earlier decision, reconcile?".to_string(),
                reason: "contradiction with previous decisions".to_string(),
            });
        }

        candidates
            .into_iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|i| i.confidence > 0.75)
    }

    async fn detect_recurring_error(&self) -> bool {
        let history = self.history.lock().await;
        if history.len() < 3 {
            return false;
        }
        let recent: Vec<_> = history.iter().rev().take(3).collect();
        let error_count = recent.iter().filter(|h| h.content.to_lowercase().contains("error")).count();
        error_count >= 2
    }

    async fn detect_contradiction(&self, current_input: &str) -> bool {
        let current_lower = current_input.to_lowercase();
        if current_lower.is_empty() {
            return false;
        }
        let history = self.history.lock().await;
        for record in history.iter().rev().take(10) {
            let past_lower = record.content.to_lowercase();
            for marker in &self.profile.contradiction_markers {
                if past_lower.contains(marker.as_str()) {
                    if let Some(after) = past_lower.split(marker.as_str()).nth(1) {
                        if after.split_whitespace().take(3).any(|w| current_lower.contains(w)) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    async fn analyze_recent_patterns(&self) -> Vec<QuestionPrediction> {
        let history = self.history.lock().await;
        if history.len() < 5 {
            return Vec::new();
        }
        let recent: Vec<_> = history.iter().rev().take(10).cloned().collect();
        let mut out = Vec::new();
        for window in recent.windows(3) {
            let types: Vec<&str> = window.iter().map(|r| r.kind.as_str()).collect();
            let is_sequence = types.iter().all(|t| *t == types[0]) || (types[0] == types[2]);
            if !is_sequence {
                continue;
            }
            let predicted = match window[2].kind.as_str() {
                "question" => Some("follow-up clarification likely"),
                "error" => Some("how to fix this?"),
                "success" => Some("what's next?"),
                _ => None,
            };
            if let Some(q) = predicted {
                out.push(QuestionPrediction {
                    question: q.to_string(),
                    confidence: 0.65,
                    reasoning: "pattern detected in recent history".to_string(),
                });
            }
        }
        out
    }

    /// Records the interaction and, when the outcome reports a prediction
    /// verdict, nudges that prediction type's accuracy with a moving
    /// average (weight 0.1 for the new sample).
    pub async fn learn_from_interaction(&self, user_input: &str, kind: &str, outcome: InteractionOutcome) {
        {
            let mut history = self.history.lock().await;
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(InteractionRecord { recorded_at: Utc::now(), content: user_input.to_string(), kind: kind.to_string() });
        }
        *self.last_interaction.lock().await = Utc::now();

        let pattern_key = extract_pattern_key(user_input);
        {
            let mut db = self.pattern_database.lock().await;
            db.entry(pattern_key).or_default().push(PatternEntry { pattern: user_input.to_string(), outcome: outcome.clone() });
        }

        if let Some(correct) = outcome.prediction_correct {
            let prediction_type = outcome.prediction_type.unwrap_or_else(|| "general".to_string());
            let mut accuracy = self.prediction_accuracy.lock().await;
            let current = *accuracy.get(&prediction_type).unwrap_or(&0.5);
            let sample = if correct { 1.0 } else { 0.0 };
            accuracy.insert(prediction_type, current * 0.9 + sample * 0.1);
        }
    }

    pub async fn prediction_confidence(&self, prediction_type: &str) -> f64 {
        let base = *self.prediction_accuracy.lock().await.get(prediction_type).unwrap_or(&0.5);
        let count = self.pattern_database.lock().await.get(prediction_type).map(|v| v.len()).unwrap_or(0);
        if count < 10 {
            base * 0.7
        } else if count < 50 {
            base * 0.9
        } else {
            base
        }
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}

fn check_better_approach(current_approach: &str) -> Option<&'static str> {
    let lower = current_approach.to_lowercase();
    let table: &[(&str, &str)] = &[
        ("manual loop", "an iterator combinator or slice method"),
        ("multiple if statements", "a match expression or dispatch table"),
        ("string concatenation in loop", "a single buffered join"),
        ("nested loops", "a flattened iterator pipeline"),
    ];
    table.iter().find(|(pattern, _)| lower.contains(pattern)).map(|(_, better)| *better)
}

fn extract_pattern_key(user_input: &str) -> String {
    let lower = user_input.to_lowercase();
    if lower.contains("error") {
        "errors"
    } else if lower.contains("how") {
        "how_to"
    } else if lower.contains("what") {
        "what_is"
    } else if lower.contains("implement") {
        "implementation"
    } else if lower.contains("fix") {
        "debugging"
    } else if lower.contains("optimize") {
        "optimization"
    } else {
        "general"
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_mentions_predict_fix_questions() {
        let core = PredictiveCore::new(WorkProfile::default());
        let predictions = core.predict_next_questions("I'm getting a weird error here").await;
        assert!(predictions.iter().any(|p| p.question.contains("fix")));
    }

    #[test]
    fn docker_mention_predicts_container_need() {
        let core = PredictiveCore::new(WorkProfile::default());
        let needs = core.predict_technical_needs("the docker container won't start");
        assert!(needs.iter().any(|n| n.need.contains("container")));
    }

    #[test]
    fn high_frustration_escalates_trajectory() {
        let core = PredictiveCore::new(WorkProfile::default());
        let trajectory = core.predict_emotional_evolution(0.9);
        assert_eq!(trajectory.trajectory, "escalating_frustration");
        assert!(trajectory.intervention_recommended);
    }

    #[tokio::test]
    async fn recurring_errors_trigger_intervention() {
        let core = PredictiveCore::new(WorkProfile::default());
        for _ in 0..3 {
            core.learn_from_interaction("another error occurred", "error", InteractionOutcome::default()).await;
        }
        let intervention = core.should_intervene_proactively(None).await;
        assert!(intervention.is_some());
        assert_eq!(intervention.unwrap().kind, InterventionType::ErrorPattern);
    }

    #[tokio::test]
    async fn learning_nudges_accuracy_toward_outcome() {
        let core = PredictiveCore::new(WorkProfile::default());
        let outcome = InteractionOutcome { prediction_correct: Some(true), prediction_type: Some("next_question".to_string()) };
        core.learn_from_interaction("what's next?", "question", outcome).await;
        let confidence = core.prediction_confidence("next_question").await;
        assert!(confidence > 0.0);
    }

    #[tokio::test]
    async fn history_respects_capacity() {
        let core = PredictiveCore::new(WorkProfile::default());
        for i in 0..5 {
            core.learn_from_interaction(&format!("message {i}"), "general", InteractionOutcome::default()).await;
        }
        assert_eq!(core.history_len().await, 5);
    }
}
