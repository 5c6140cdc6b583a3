//! Conversation context owned by the controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Controller phases. `Finalizing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Init,
    Exploring,
    Deepening,
    Validating,
    Finalizing,
}

/// How the conversation moved to the question being asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionTag {
    Linear,
    DeepDive,
    LoopBack,
}

impl TransitionTag {
    /// Short lead-in shown before the question. Cosmetic only.
    pub fn message(self) -> &'static str {
        match self {
            TransitionTag::Linear => "",
            TransitionTag::DeepDive => "Interesting, tell me more:",
            TransitionTag::LoopBack => "Let's come back to something from earlier:",
        }
    }

    /// Re-asks and deepenings draw from the follow-up budget.
    pub fn is_follow_up(self) -> bool {
        match self {
            TransitionTag::Linear => false,
            TransitionTag::DeepDive | TransitionTag::LoopBack => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub question: String,
    pub answer: String,
    pub goal_id: String,
    /// Controller state when the question was asked.
    pub state: ConversationState,
    pub transition: TransitionTag,
    /// Filler question drawn from the fallback supply.
    #[serde(default)]
    pub synthetic: bool,
    pub answered_at: DateTime<Utc>,
}

/// The question currently awaiting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub goal_id: String,
    pub question: String,
    pub transition: TransitionTag,
    pub state: ConversationState,
    #[serde(default)]
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub current_state: ConversationState,
    pub questions_asked: u32,
    pub follow_ups_asked: u32,
    pub max_follow_ups: u32,
    /// Append-only.
    pub dialogue_history: Vec<DialogueTurn>,
    /// Flat merge of answers keyed by goal id.
    pub collected_data: BTreeMap<String, String>,
    pub covered_topics: BTreeSet<String>,
    /// Advisory, in [0, 1]. Not used for any decision.
    pub engagement_score: f64,
    /// Advisory, in [0, 1]. Not used for any decision.
    pub quality_score: f64,
    #[serde(default)]
    pub pending: Option<PendingQuestion>,
    #[serde(default)]
    pub finalized: bool,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ConversationContext {
    pub fn new(max_follow_ups: u32) -> Self {
        Self {
            current_state: ConversationState::Init,
            questions_asked: 0,
            follow_ups_asked: 0,
            max_follow_ups,
            dialogue_history: Vec::new(),
            collected_data: BTreeMap::new(),
            covered_topics: BTreeSet::new(),
            engagement_score: 0.5,
            quality_score: 0.5,
            pending: None,
            finalized: false,
        }
    }

    pub fn follow_ups_remaining(&self) -> bool {
        self.follow_ups_asked < self.max_follow_ups
    }

    /// Every question text already put to the user, including the pending one.
    pub fn asked_questions(&self) -> BTreeSet<String> {
        self.dialogue_history
            .iter()
            .map(|t| t.question.clone())
            .chain(self.pending.iter().map(|p| p.question.clone()))
            .collect()
    }

    /// Answered turns for one goal; survives persistence.
    pub fn turns_for(&self, goal_id: &str) -> usize {
        self.dialogue_history.iter().filter(|t| t.goal_id == goal_id).count()
    }

    /// Nudge the advisory scores by answer length.
    ///
    /// Terse answers decay both scores; long answers boost them.
    pub fn adjust_heuristics(&mut self, answer: &str) {
        let len = answer.trim().chars().count();
        let (engagement, quality) = match len {
            0 => (0.8, 0.8),
            1..=19 => (0.9, 0.95),
            20..=99 => (1.0, 1.05),
            _ => (1.1, 1.1),
        };
        self.engagement_score = (self.engagement_score * engagement).clamp(0.0, 1.0);
        self.quality_score = (self.quality_score * quality).clamp(0.0, 1.0);
    }
}
