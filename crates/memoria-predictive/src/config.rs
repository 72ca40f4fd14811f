//! Behavioral model the predictive core reasons against. Configuration, not
//! a hardcoded profile of any one user.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkProfile {
    /// Hour-of-day ranges (UTC, start inclusive/end inclusive, may wrap past
    /// midnight) during which a "next step" question is predicted more
    /// strongly.
    pub peak_hours: Vec<(u32, u32)>,
    pub break_frequency_hours: f64,
    pub stuck_threshold_minutes: f64,
    pub fatigue_threshold_hours: f64,
    pub contradiction_markers: Vec<String>,
}

impl Default for WorkProfile {
    fn default() -> Self {
        WorkProfile {
            peak_hours: vec![(21, 23), (23, 2)],
            break_frequency_hours: 2.0,
            stuck_threshold_minutes: 30.0,
            fatigue_threshold_hours: 2.5,
            contradiction_markers: vec!["avoid".to_string(), "not use".to_string()],
        }
    }
}

impl WorkProfile {
    pub fn is_peak_hour(&self, hour: u32) -> bool {
        self.peak_hours.iter().any(|(start, end)| {
            if start <= end {
                hour >= *start && hour <= *end
            } else {
                hour >= *start || hour <= *end
            }
        })
    }
}
