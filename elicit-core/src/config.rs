//! Interview budgets and thresholds.

use serde::{Deserialize, Serialize};

/// Finalization is forbidden before this many questions.
pub const MIN_QUESTIONS: u32 = 10;

/// Hard cap: more questions than this forces finalization.
pub const MAX_TURNS: u32 = 25;

pub const DEFAULT_MAX_FOLLOW_UPS: u32 = 5;

/// Overall completion needed to stop (with both priority tiers complete).
pub const STOP_THRESHOLD: f64 = 0.8;

/// Overall completion at which exploring turns into deepening.
pub const DEEPENING_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewSettings {
    pub min_questions: u32,
    pub max_turns: u32,
    pub max_follow_ups: u32,
    pub stop_threshold: f64,
    pub deepening_threshold: f64,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            min_questions: MIN_QUESTIONS,
            max_turns: MAX_TURNS,
            max_follow_ups: DEFAULT_MAX_FOLLOW_UPS,
            stop_threshold: STOP_THRESHOLD,
            deepening_threshold: DEEPENING_THRESHOLD,
        }
    }
}

impl InterviewSettings {
    /// Clamp thresholds into [0, 1] and keep the floor under the cap.
    pub fn normalized(mut self) -> Self {
        self.stop_threshold = self.stop_threshold.clamp(0.0, 1.0);
        self.deepening_threshold = self.deepening_threshold.clamp(0.0, 1.0);
        if self.min_questions > self.max_turns {
            self.min_questions = self.max_turns;
        }
        self
    }
}
