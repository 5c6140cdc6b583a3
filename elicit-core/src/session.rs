//! Persisted interview sessions and the final answers record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::AnswerMapping;
use crate::config::InterviewSettings;
use crate::context::ConversationContext;
use crate::controller::{ConversationController, SYNTHETIC_PREFIX};
use crate::criteria::ValidatorTable;
use crate::error::SessionError;
use crate::ports::{FallbackSupply, QuestionSource};
use crate::reference_point::Priority;
use crate::registry::{Progress, ReferencePointRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    /// Catalog the goals came from; used to re-bind validators on resume.
    pub catalog: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionMeta {
    pub fn new(catalog: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: now.format("%Y%m%dT%H%M%SZ").to_string(),
            catalog: catalog.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Everything needed to continue an interview in another process.
///
/// Validators are not serialized; pass the same table to
/// [`InterviewSession::into_controller`] to re-bind them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub meta: SessionMeta,
    #[serde(default)]
    pub settings: InterviewSettings,
    pub registry: ReferencePointRegistry,
    pub context: ConversationContext,
}

impl InterviewSession {
    /// Copy the controller's state without consuming it.
    pub fn snapshot<Q: QuestionSource, F: FallbackSupply>(
        meta: &SessionMeta,
        controller: &ConversationController<Q, F>,
    ) -> Self {
        let mut meta = meta.clone();
        meta.touch();
        Self {
            meta,
            settings: *controller.settings(),
            registry: controller.registry().clone(),
            context: controller.context().clone(),
        }
    }

    pub fn into_controller<Q: QuestionSource, F: FallbackSupply>(
        self,
        validators: ValidatorTable,
        questions: Q,
        fallback: F,
    ) -> (SessionMeta, ConversationController<Q, F>) {
        let InterviewSession {
            meta,
            settings,
            mut registry,
            context,
        } = self;
        registry.set_validators(validators);
        let controller = ConversationController::resume(registry, context, settings, questions, fallback);
        (meta, controller)
    }

    pub fn progress(&self) -> Progress {
        self.registry.progress()
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl<Q: QuestionSource, F: FallbackSupply> ConversationController<Q, F> {
    pub fn into_session(self, mut meta: SessionMeta) -> InterviewSession {
        meta.touch();
        let settings = *self.settings();
        let (registry, context) = self.into_parts();
        InterviewSession {
            meta,
            settings,
            registry,
            context,
        }
    }
}

/// The record handed downstream once the interview finalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledAnswers {
    /// Output field name -> collected text, for every goal that has text.
    pub fields: BTreeMap<String, String>,
    /// Answers to filler questions, keyed by question text.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub supplementary: BTreeMap<String, String>,
    /// Goals in the P0/P1 tiers that never completed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_priority_goals: Vec<String>,
    pub progress: Progress,
}

impl AssembledAnswers {
    pub fn assemble(registry: &ReferencePointRegistry, mapping: &AnswerMapping) -> Self {
        let mut fields = BTreeMap::new();
        for goal in registry.iter() {
            let Some(text) = goal.text().map(str::trim).filter(|t| !t.is_empty()) else {
                continue;
            };
            let field = mapping.get(&goal.id).cloned().unwrap_or_else(|| goal.id.clone());
            fields.insert(field, text.to_string());
        }

        let missing_priority_goals = [Priority::P0Critical, Priority::P1Important]
            .into_iter()
            .flat_map(|tier| registry.incomplete_by_priority(tier))
            .map(|g| g.id.clone())
            .collect();

        Self {
            fields,
            supplementary: BTreeMap::new(),
            missing_priority_goals,
            progress: registry.progress(),
        }
    }

    /// Attach answers given to fallback questions.
    pub fn with_supplementary(mut self, context: &ConversationContext) -> Self {
        self.supplementary = context
            .dialogue_history
            .iter()
            .filter(|t| t.synthetic || t.goal_id.starts_with(SYNTHETIC_PREFIX))
            .filter(|t| !t.answer.trim().is_empty())
            .map(|t| (t.question.clone(), t.answer.trim().to_string()))
            .collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Action;
    use crate::fallback::FallbackBank;
    use crate::reference_point::{GoalState, ReferencePoint, TEXT_KEY};
    use crate::template::TemplateQuestionSource;

    fn registry() -> ReferencePointRegistry {
        ReferencePointRegistry::from_points([
            ReferencePoint::new("rp_budget", "Budget", Priority::P0Critical),
            ReferencePoint::new("rp_team", "Team", Priority::P1Important),
            ReferencePoint::new("rp_notes", "Notes", Priority::P3Optional).depends_on("rp_team"),
        ])
        .unwrap()
    }

    #[test]
    fn session_round_trips_through_json() {
        let mut controller =
            ConversationController::new(registry(), TemplateQuestionSource::new(), FallbackBank::builtin()).unwrap();
        controller.begin().unwrap();
        controller.submit("About 40k").unwrap();

        let meta = SessionMeta::new("test");
        let session = InterviewSession::snapshot(&meta, &controller);
        let json = session.to_json().unwrap();
        let back = InterviewSession::from_json(&json).unwrap();

        assert_eq!(back.meta.id, meta.id);
        assert_eq!(back.context, session.context);
        assert_eq!(back.registry.get("rp_budget").unwrap().state, GoalState::Completed);
        let order: Vec<_> = back.registry.ids().collect();
        assert_eq!(order, ["rp_budget", "rp_team", "rp_notes"]);
    }

    #[test]
    fn resumed_controller_continues_with_pending_question() {
        let mut controller =
            ConversationController::new(registry(), TemplateQuestionSource::new(), FallbackBank::builtin()).unwrap();
        let Action::AskQuestion(first) = controller.begin().unwrap() else {
            panic!("expected a question");
        };
        let json = controller.into_session(SessionMeta::new("test")).to_json().unwrap();

        let (_, mut resumed) = InterviewSession::from_json(&json).unwrap().into_controller(
            ValidatorTable::new(),
            TemplateQuestionSource::new(),
            FallbackBank::builtin(),
        );
        assert_eq!(resumed.pending().unwrap().goal_id, first.goal_id);
        let Action::AskQuestion(next) = resumed.submit("Roughly 40k USD").unwrap() else {
            panic!("expected a question");
        };
        assert_eq!(next.goal_id, "rp_team");
        assert_eq!(resumed.context().questions_asked, 2);
    }

    #[test]
    fn corrupt_graph_is_rejected_on_load() {
        let json = r#"{
            "meta": {"id": "x", "catalog": "c", "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-01T00:00:00Z"},
            "registry": {"points": [
                {"id": "a", "name": "A", "priority": "P0_CRITICAL", "depends_on": ["b"]},
                {"id": "b", "name": "B", "priority": "P0_CRITICAL", "depends_on": ["a"]}
            ]},
            "context": {"current_state": "INIT", "questions_asked": 0, "follow_ups_asked": 0,
                        "max_follow_ups": 5, "dialogue_history": [], "collected_data": {},
                        "covered_topics": [], "engagement_score": 0.5, "quality_score": 0.5}
        }"#;
        let err = InterviewSession::from_json(json).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn assemble_maps_fields_and_falls_back_to_id() {
        let mut reg = registry();
        reg.record("rp_budget", TEXT_KEY, "40000 EUR").unwrap();
        reg.record("rp_notes", TEXT_KEY, "  ").unwrap();
        let mapping = AnswerMapping::from([("rp_budget".to_string(), "budget_total".to_string())]);

        let answers = AssembledAnswers::assemble(&reg, &mapping);
        assert_eq!(answers.fields["budget_total"], "40000 EUR");
        assert!(!answers.fields.contains_key("rp_notes"));
        assert_eq!(answers.missing_priority_goals, ["rp_team"]);
        assert_eq!(answers.progress.completed_goals, 1);

        reg.record("rp_team", TEXT_KEY, "two staff").unwrap();
        let answers = AssembledAnswers::assemble(&reg, &AnswerMapping::new());
        assert_eq!(answers.fields["rp_team"], "two staff");
        assert!(answers.missing_priority_goals.is_empty());
    }
}
