//! Keyword-based emotion classification, producing an [`EmotionalContext`].
//!
//! Grounded in `original_source/mcp-server/luna_core/emotional_processor.py`
//! (`analyze_text_emotion`, `calculate_sentiment_score`), remapped onto the
//! closed [`Emotion`] set this data model uses instead of the original's
//! looser emotion vocabulary.

use crate::types::{Emotion, EmotionalContext};

struct EmotionKeywords {
    emotion: Emotion,
    keywords: &'static [&'static str],
}

const EMOTION_KEYWORDS: &[EmotionKeywords] = &[
    EmotionKeywords { emotion: Emotion::Joy, keywords: &["happy", "joy", "delighted", "excited", "wonderful", "amazing", "great"] },
    EmotionKeywords { emotion: Emotion::Sadness, keywords: &["sad", "unhappy", "depressed", "disappointed", "down", "blue"] },
    EmotionKeywords { emotion: Emotion::Concern, keywords: &["worried", "anxious", "nervous", "afraid", "scared", "concerned", "frustrated", "angry"] },
    EmotionKeywords { emotion: Emotion::Curiosity, keywords: &["curious", "interested", "intrigued", "wondering", "fascinated"] },
    EmotionKeywords { emotion: Emotion::Calm, keywords: &["calm", "peaceful", "relaxed", "serene", "tranquil"] },
    EmotionKeywords { emotion: Emotion::Gratitude, keywords: &["grateful", "thankful", "appreciate", "blessed"] },
    EmotionKeywords { emotion: Emotion::Love, keywords: &["love", "adore", "cherish", "devoted"] },
    EmotionKeywords { emotion: Emotion::Compassion, keywords: &["compassion", "empathy", "sympathize", "understand you"] },
];

const POSITIVE_WORDS: &[&str] = &["good", "great", "excellent", "wonderful", "amazing", "love", "yes", "happy"];
const NEGATIVE_WORDS: &[&str] = &["bad", "terrible", "horrible", "awful", "hate", "no", "sad", "angry"];

/// Stateless keyword-based emotion classifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmotionalAnalyzer;

impl EmotionalAnalyzer {
    pub fn new() -> Self {
        EmotionalAnalyzer
    }

    /// Classify `text` into an [`EmotionalContext`]. Falls back to `NEUTRAL`
    /// with zero intensity when no keyword matches.
    pub fn analyze(&self, text: &str) -> EmotionalContext {
        let text_lower = text.to_lowercase();

        let mut scored: Vec<(Emotion, u32)> = EMOTION_KEYWORDS
            .iter()
            .map(|ek| {
                let hits = ek.keywords.iter().filter(|kw| text_lower.contains(*kw)).count() as u32;
                (ek.emotion, hits)
            })
            .filter(|(_, hits)| *hits > 0)
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let valence = self.sentiment_score(&text_lower);
        let arousal = self.arousal(&text_lower);

        if scored.is_empty() {
            return EmotionalContext {
                primary_emotion: Emotion::Neutral,
                secondary_emotions: Vec::new(),
                intensity: 0.0,
                valence,
                arousal,
            };
        }

        let primary_emotion = scored[0].0;
        let intensity = (scored[0].1 as f64 / 3.0).min(1.0);
        let secondary_emotions = scored.iter().skip(1).take(2).map(|(e, _)| *e).collect();

        EmotionalContext { primary_emotion, secondary_emotions, intensity, valence, arousal }
    }

    /// Sentiment in `[-1, 1]` from a simple positive/negative word count.
    fn sentiment_score(&self, text_lower: &str) -> f64 {
        let positive = POSITIVE_WORDS.iter().filter(|w| text_lower.contains(*w)).count() as f64;
        let negative = NEGATIVE_WORDS.iter().filter(|w| text_lower.contains(*w)).count() as f64;
        let total = positive + negative;
        if total == 0.0 {
            0.0
        } else {
            (positive - negative) / total
        }
    }

    /// Arousal proxy: exclamation marks, all-caps words, and intensity words
    /// push arousal up; otherwise a neutral baseline.
    fn arousal(&self, text_lower: &str) -> f64 {
        let mut score: f64 = 0.3;
        score += text_lower.matches('!').count() as f64 * 0.15;
        if text_lower.contains("very") || text_lower.contains("extremely") || text_lower.contains("urgent") {
            score += 0.2;
        }
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keywords_yields_neutral() {
        let ctx = EmotionalAnalyzer::new().analyze("the quarterly report is attached");
        assert_eq!(ctx.primary_emotion, Emotion::Neutral);
        assert_eq!(ctx.intensity, 0.0);
    }

    #[test]
    fn joy_keywords_are_detected() {
        let ctx = EmotionalAnalyzer::new().analyze("this is wonderful, I'm so happy and excited!");
        assert_eq!(ctx.primary_emotion, Emotion::Joy);
        assert!(ctx.intensity > 0.0);
        assert!(ctx.valence > 0.0);
    }

    #[test]
    fn concern_keywords_yield_negative_valence_lean() {
        let ctx = EmotionalAnalyzer::new().analyze("I'm worried and anxious, this is bad");
        assert_eq!(ctx.primary_emotion, Emotion::Concern);
        assert!(ctx.valence <= 0.0);
    }

    #[test]
    fn exclamation_marks_raise_arousal() {
        let calm = EmotionalAnalyzer::new().analyze("this is fine");
        let excited = EmotionalAnalyzer::new().analyze("this is fine!!!");
        assert!(excited.arousal > calm.arousal);
    }
}
