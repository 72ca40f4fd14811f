//! `get_predictions()`'s aggregate shape, gathering every predictive
//! signal the runtime interface promises into one bundle.

use memoria_predictive::{EmotionalTrajectory, QuestionPrediction, ResponseTimingAdvice, TechnicalNeedPrediction};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionsBundle {
    pub likely_next_questions: Vec<QuestionPrediction>,
    pub probable_technical_needs: Vec<TechnicalNeedPrediction>,
    pub emotional_state_trajectory: EmotionalTrajectory,
    pub optimal_response_timing: ResponseTimingAdvice,
    pub potential_errors: Vec<String>,
    pub suggested_optimizations: Vec<String>,
}
