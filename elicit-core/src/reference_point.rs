//! Reference point model: one information goal the interview tries to fill.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::criteria::{CompletionCriteria, ValidatorTable};

/// Open key/value bag of answers collected for a goal.
pub type CollectedData = BTreeMap<String, String>;

/// Key under which the free-text answer is stored.
pub const TEXT_KEY: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "P0_CRITICAL")]
    P0Critical = 0,
    #[serde(rename = "P1_IMPORTANT")]
    P1Important = 1,
    #[serde(rename = "P2_DESIRABLE")]
    P2Desirable = 2,
    #[serde(rename = "P3_OPTIONAL")]
    P3Optional = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::P0Critical,
        Priority::P1Important,
        Priority::P2Desirable,
        Priority::P3Optional,
    ];

    /// Sort rank, lower is more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Priority::P0Critical => 0,
            Priority::P1Important => 1,
            Priority::P2Desirable => 2,
            Priority::P3Optional => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::P0Critical => "critical",
            Priority::P1Important => "important",
            Priority::P2Desirable => "desirable",
            Priority::P3Optional => "optional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalState {
    NotStarted,
    InProgress,
    Completed,
    /// Refinement set by the controller, never by the goal itself.
    Validated,
    /// Refinement set by the controller, never by the goal itself.
    Enriched,
}

impl GoalState {
    pub fn is_complete(self) -> bool {
        match self {
            GoalState::Completed | GoalState::Validated | GoalState::Enriched => true,
            GoalState::NotStarted | GoalState::InProgress => false,
        }
    }

    /// Scheduler tie-break: goals already underway come first.
    pub fn scheduling_rank(self) -> u8 {
        match self {
            GoalState::InProgress => 0,
            GoalState::NotStarted => 1,
            GoalState::Completed | GoalState::Validated | GoalState::Enriched => 2,
        }
    }
}

/// A discrete information goal to elicit from the user.
///
/// Kept small and serializable; the validator functions referenced by
/// `criteria` live in the registry's [`ValidatorTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,

    pub priority: Priority,

    /// Informational; does not gate scheduling on its own.
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub criteria: CompletionCriteria,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub enables: BTreeSet<String>,

    /// Topic tags; merged into the conversation's covered topics when answered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Phrasings a question source may use for this goal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_questions: Vec<String>,

    #[serde(default = "not_started")]
    pub state: GoalState,
    #[serde(default)]
    pub collected_data: CollectedData,
    #[serde(default)]
    pub confidence: f64,
}

fn not_started() -> GoalState {
    GoalState::NotStarted
}

impl ReferencePoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            priority,
            required: false,
            criteria: CompletionCriteria::default(),
            depends_on: BTreeSet::new(),
            enables: BTreeSet::new(),
            tags: Vec::new(),
            sample_questions: Vec::new(),
            state: GoalState::NotStarted,
            collected_data: CollectedData::new(),
            confidence: 0.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_criteria(mut self, criteria: CompletionCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    pub fn enables(mut self, id: impl Into<String>) -> Self {
        self.enables.insert(id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sample_question(mut self, question: impl Into<String>) -> Self {
        self.sample_questions.push(question.into());
        self
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    pub fn text(&self) -> Option<&str> {
        self.collected_data.get(TEXT_KEY).map(String::as_str)
    }

    pub fn has_data(&self) -> bool {
        self.collected_data.values().any(|v| !v.trim().is_empty())
    }

    pub fn criteria_met(&self, validators: &ValidatorTable) -> bool {
        self.criteria.is_satisfied(&self.collected_data, validators)
    }

    /// Write one value and advance the state machine.
    ///
    /// NOT_STARTED moves to IN_PROGRESS on the first write and to COMPLETED
    /// once criteria pass. States never move backwards. Returns `true` when
    /// this write completed the goal.
    pub fn record(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        validators: &ValidatorTable,
    ) -> bool {
        self.collected_data.insert(key.into(), value.into());
        self.refresh(validators)
    }

    /// Re-evaluate criteria against the current data. Returns `true` on completion.
    pub fn refresh(&mut self, validators: &ValidatorTable) -> bool {
        let met = self.criteria_met(validators);
        self.confidence = self.derive_confidence(met);

        match self.state {
            GoalState::NotStarted | GoalState::InProgress if met => {
                self.state = GoalState::Completed;
                true
            }
            GoalState::NotStarted => {
                self.state = GoalState::InProgress;
                false
            }
            _ => false,
        }
    }

    /// Force completion regardless of criteria.
    pub fn mark_completed(&mut self, confidence: f64) {
        if !self.state.is_complete() {
            self.state = GoalState::Completed;
        }
        self.confidence = confidence.clamp(0.0, 1.0);
    }

    /// Controller-only refinement of a completed goal.
    pub(crate) fn refine(&mut self, state: GoalState) {
        debug_assert!(matches!(state, GoalState::Validated | GoalState::Enriched));
        if self.state.is_complete() {
            self.state = state;
        }
    }

    fn derive_confidence(&self, criteria_met: bool) -> f64 {
        let mut score = 0.0;
        if criteria_met {
            score += 0.7;
        }
        if self.collected_data.len() > 1 {
            score += 0.2;
        }
        if self.text().is_some_and(|t| t.chars().count() > 200) {
            score += 0.1;
        }
        f64::min(score, 1.0)
    }
}
