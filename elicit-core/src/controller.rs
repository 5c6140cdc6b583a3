//! Conversation controller: the per-session turn state machine.
//!
//! Each call to [`ConversationController::decide_next_action`] takes the
//! answer to the previously emitted question (if any) and returns the next
//! [`Action`]. The turn runs in a fixed order:
//! 1) record the answer into the pinned goal
//! 2) complete any goal pre-seeded with a hardcoded answer
//! 3) recompute the conversation state
//! 4) stop if the hard cap is exceeded, or if the question floor is met and
//!    the interview is satisfied
//! 5) pick a goal with the state's policy and ask the question source
//! 6) below the floor with no goal left, draw a filler from the fallback supply
//! 7) otherwise finalize; nothing is left to ask
//!
//! Termination is guaranteed: every ask increments `questions_asked`, and
//! exceeding `max_turns` finalizes unconditionally.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::InterviewSettings;
use crate::context::{ConversationContext, ConversationState, DialogueTurn, PendingQuestion, TransitionTag};
use crate::error::{ControllerError, RegistryError};
use crate::ports::{FallbackSupply, QuestionSource};
use crate::reference_point::{GoalState, Priority, ReferencePoint, TEXT_KEY};
use crate::registry::{Progress, ReferencePointRegistry};

/// Id prefix for filler goals drawn from the fallback supply.
pub const SYNTHETIC_PREFIX: &str = "fallback_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub goal_id: String,
    pub goal_name: String,
    pub text: String,
    pub transition: TransitionTag,
    pub transition_message: String,
    /// Drawn from the fallback supply rather than a registry goal.
    pub synthetic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    /// Floor met and the stop policy holds.
    Satisfied,
    /// More questions asked than the hard cap allows.
    TurnCap,
    /// No goal and no fallback left to ask.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AskQuestion(Question),
    Finalize(FinalizeReason),
}

struct Selection {
    goal_id: String,
    goal_name: String,
    text: String,
    transition: TransitionTag,
}

/// Owns one session's registry and context. Sessions share nothing.
#[derive(Debug)]
pub struct ConversationController<Q: QuestionSource, F: FallbackSupply> {
    registry: ReferencePointRegistry,
    context: ConversationContext,
    settings: InterviewSettings,
    questions: Q,
    fallback: F,
    /// Pinned filler goal; never part of the registry.
    synthetic: Option<ReferencePoint>,
}

impl<Q: QuestionSource, F: FallbackSupply> ConversationController<Q, F> {
    pub fn new(registry: ReferencePointRegistry, questions: Q, fallback: F) -> Result<Self, RegistryError> {
        Self::with_settings(registry, InterviewSettings::default(), questions, fallback)
    }

    /// Fails on a dangling dependency or a dependency cycle, which would
    /// otherwise leave goals blocked for the whole session.
    pub fn with_settings(
        registry: ReferencePointRegistry,
        settings: InterviewSettings,
        questions: Q,
        fallback: F,
    ) -> Result<Self, RegistryError> {
        registry.validate()?;
        let settings = settings.normalized();
        Ok(Self {
            registry,
            context: ConversationContext::new(settings.max_follow_ups),
            settings,
            questions,
            fallback,
            synthetic: None,
        })
    }

    /// Continue a persisted session. The registry is expected to come from
    /// deserialization, which already validated its graph.
    pub fn resume(
        registry: ReferencePointRegistry,
        context: ConversationContext,
        settings: InterviewSettings,
        questions: Q,
        fallback: F,
    ) -> Self {
        let synthetic = context
            .pending
            .as_ref()
            .filter(|p| p.synthetic)
            .map(|p| synthetic_goal(&p.goal_id, &p.question));
        Self {
            registry,
            context,
            settings: settings.normalized(),
            questions,
            fallback,
            synthetic,
        }
    }

    pub fn into_parts(self) -> (ReferencePointRegistry, ConversationContext) {
        (self.registry, self.context)
    }

    pub fn registry(&self) -> &ReferencePointRegistry {
        &self.registry
    }

    /// For pre-seeding hardcoded answers before the first turn.
    pub fn registry_mut(&mut self) -> &mut ReferencePointRegistry {
        &mut self.registry
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn settings(&self) -> &InterviewSettings {
        &self.settings
    }

    pub fn question_source(&self) -> &Q {
        &self.questions
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    pub fn progress(&self) -> Progress {
        self.registry.progress()
    }

    pub fn is_finalized(&self) -> bool {
        self.context.finalized
    }

    pub fn pending(&self) -> Option<&PendingQuestion> {
        self.context.pending.as_ref()
    }

    /// First turn of a fresh session.
    pub fn begin(&mut self) -> Result<Action, ControllerError> {
        self.decide_next_action(None)
    }

    /// Answer the pending question and get the next action.
    pub fn submit(&mut self, answer: &str) -> Result<Action, ControllerError> {
        self.decide_next_action(Some(answer))
    }

    pub fn decide_next_action(&mut self, last_answer: Option<&str>) -> Result<Action, ControllerError> {
        if self.context.finalized {
            return Err(ControllerError::AlreadyFinalized);
        }

        match (self.context.pending.take(), last_answer) {
            (Some(pending), None) => {
                let goal_id = pending.goal_id.clone();
                self.context.pending = Some(pending);
                return Err(ControllerError::AnswerRequired { goal_id });
            }
            (Some(pending), Some(answer)) => self.record_answer(pending, answer),
            (None, Some(_)) => warn!("answer supplied with no pending question; ignored"),
            (None, None) => {}
        }

        self.apply_hardcoded_answers();
        self.update_state();

        let asked = self.context.questions_asked;
        let floor_met = asked >= self.settings.min_questions;

        if asked > self.settings.max_turns {
            return Ok(self.finalize(FinalizeReason::TurnCap));
        }

        if floor_met && (self.context.current_state == ConversationState::Finalizing || self.satisfied()) {
            return Ok(self.finalize(FinalizeReason::Satisfied));
        }

        if let Some(selection) = self.select_goal() {
            return Ok(self.ask(selection, false));
        }

        if !floor_met {
            if let Some(selection) = self.draw_fallback() {
                return Ok(self.ask(selection, true));
            }
        }

        Ok(self.finalize(FinalizeReason::Exhausted))
    }

    fn satisfied(&self) -> bool {
        let p = self.registry.progress();
        p.critical_completed && p.important_completed && p.overall_completion >= self.settings.stop_threshold
    }

    fn record_answer(&mut self, pending: PendingQuestion, answer: &str) {
        self.context.adjust_heuristics(answer);

        if pending.synthetic {
            let mut goal = self
                .synthetic
                .take()
                .unwrap_or_else(|| synthetic_goal(&pending.goal_id, &pending.question));
            goal.record(TEXT_KEY, answer, self.registry.validators());
            goal.mark_completed(goal.confidence);
            self.context
                .collected_data
                .insert(goal.id.clone(), answer.to_string());
        } else {
            self.record_goal_answer(&pending, answer);
        }

        debug!(
            goal_id = %pending.goal_id,
            engagement = self.context.engagement_score,
            quality = self.context.quality_score,
            "answer recorded"
        );

        self.context.dialogue_history.push(DialogueTurn {
            question: pending.question,
            answer: answer.to_string(),
            goal_id: pending.goal_id,
            state: pending.state,
            transition: pending.transition,
            synthetic: pending.synthetic,
            answered_at: Utc::now(),
        });
    }

    fn record_goal_answer(&mut self, pending: &PendingQuestion, answer: &str) {
        let id = pending.goal_id.as_str();
        let Some(goal) = self.registry.get(id) else {
            warn!(goal_id = %id, "answered goal no longer in registry");
            return;
        };

        // Re-asks extend the earlier answer instead of replacing it.
        let text = match goal.text().map(str::trim).filter(|t| !t.is_empty()) {
            Some(previous) if !answer.trim().is_empty() => format!("{previous}\n{}", answer.trim()),
            Some(previous) => previous.to_string(),
            None => answer.trim().to_string(),
        };
        let tags = goal.tags.clone();

        match self.registry.record(id, TEXT_KEY, &text) {
            Ok(completed) => {
                if completed {
                    info!(goal_id = %id, "goal completed");
                }
            }
            Err(e) => {
                warn!(goal_id = %id, error = %e, "failed to record answer");
                return;
            }
        }

        if let Some(goal) = self.registry.get_mut(id) {
            if goal.is_complete() {
                match pending.transition {
                    TransitionTag::DeepDive => goal.refine(GoalState::Enriched),
                    TransitionTag::LoopBack => goal.refine(GoalState::Validated),
                    TransitionTag::Linear => {}
                }
            }
        }

        self.context.covered_topics.extend(tags);
        self.context.collected_data.insert(id.to_string(), text);
    }

    /// Complete goals whose data was seeded before they were ever asked.
    fn apply_hardcoded_answers(&mut self) {
        let seeded: Vec<(String, String)> = self
            .registry
            .iter()
            .filter(|p| p.state == GoalState::NotStarted && p.has_data())
            .map(|p| (p.id.clone(), p.text().unwrap_or_default().to_string()))
            .collect();

        for (id, text) in seeded {
            if let Err(e) = self.registry.mark_completed(&id, 1.0) {
                warn!(goal_id = %id, error = %e, "failed to apply hardcoded answer");
                continue;
            }
            info!(goal_id = %id, "hardcoded answer applied");
            if let Some(goal) = self.registry.get(&id) {
                self.context.covered_topics.extend(goal.tags.iter().cloned());
            }
            self.context.collected_data.insert(id, text);
        }
    }

    fn update_state(&mut self) {
        let before = self.context.current_state;
        let progress = self.registry.progress();
        let critical_open = !self.registry.incomplete_by_priority(Priority::P0Critical).is_empty();
        let mut state = before;

        if state == ConversationState::Init && self.context.questions_asked > 0 {
            state = ConversationState::Exploring;
        }
        if state == ConversationState::Exploring
            && progress.overall_completion >= self.settings.deepening_threshold
            && critical_open
        {
            state = ConversationState::Deepening;
        }
        if state == ConversationState::Exploring && progress.critical_completed {
            state = ConversationState::Validating;
        }
        if state == ConversationState::Deepening && progress.critical_completed {
            state = ConversationState::Validating;
        }
        if state == ConversationState::Validating && self.registry.can_stop(self.settings.stop_threshold) {
            state = ConversationState::Finalizing;
        }

        if state != before {
            info!(
                from = ?before,
                to = ?state,
                overall = progress.overall_completion,
                questions_asked = self.context.questions_asked,
                "conversation state changed"
            );
            self.context.current_state = state;
        }
    }

    /// Next registry goal for the current state, passing over `skip`.
    fn candidate(&self, skip: &HashSet<String>) -> Option<(String, TransitionTag)> {
        let eligible = |p: &&ReferencePoint| !skip.contains(&p.id) && !self.registry.is_blocked(&p.id);
        let first_in = |tier: Priority| {
            self.registry
                .incomplete_by_priority(tier)
                .into_iter()
                .find(|p| eligible(p))
                .map(|p| p.id.clone())
        };
        let linear = || {
            self.registry
                .select_next_skipping(true, skip)
                .map(|p| (p.id.clone(), TransitionTag::Linear))
        };
        let follow_ups = self.context.follow_ups_remaining();

        match self.context.current_state {
            ConversationState::Init | ConversationState::Exploring | ConversationState::Finalizing => linear(),
            ConversationState::Deepening => {
                if follow_ups {
                    if let Some(id) = first_in(Priority::P0Critical) {
                        return Some((id, TransitionTag::DeepDive));
                    }
                }
                first_in(Priority::P1Important)
                    .map(|id| (id, TransitionTag::Linear))
                    .or_else(linear)
            }
            ConversationState::Validating => {
                // Only goals the user already answered count as re-asks.
                if follow_ups {
                    let reask = [Priority::P0Critical, Priority::P1Important].into_iter().find_map(|tier| {
                        self.registry
                            .incomplete_by_priority(tier)
                            .into_iter()
                            .find(|p| eligible(p) && self.context.turns_for(&p.id) > 0)
                            .map(|p| p.id.clone())
                    });
                    if let Some(id) = reask {
                        return Some((id, TransitionTag::LoopBack));
                    }
                }
                linear()
            }
        }
    }

    /// Ask the question source for the next candidate, retrying at most once
    /// per registry goal.
    fn select_goal(&mut self) -> Option<Selection> {
        let mut skip: HashSet<String> = HashSet::new();

        for _ in 0..self.registry.len() {
            let (id, transition) = self.candidate(&skip)?;
            let goal = self.registry.get(&id)?;

            match self.questions.generate(goal, &self.context) {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    return Some(Selection {
                        goal_name: goal.name.clone(),
                        goal_id: id,
                        text,
                        transition,
                    });
                }
                Ok(Some(_)) => {
                    warn!(goal_id = %id, "question source returned blank text; skipping goal");
                }
                Ok(None) => {
                    // The source claims the goal is satisfied; only our own data decides.
                    let confidence = goal.confidence.max(0.7);
                    if goal.criteria_met(self.registry.validators()) {
                        if self.registry.mark_completed(&id, confidence).is_ok() {
                            info!(goal_id = %id, "goal already satisfied by collected data");
                        }
                    } else {
                        debug!(goal_id = %id, "question source skipped goal; criteria unmet");
                    }
                }
                Err(e) => {
                    warn!(goal_id = %id, error = %e, "question source failed; skipping goal");
                }
            }
            skip.insert(id);
        }

        None
    }

    fn draw_fallback(&mut self) -> Option<Selection> {
        let exclude = self.context.asked_questions();
        if self.fallback.remaining(&exclude) == 0 {
            warn!("fallback supply exhausted");
            return None;
        }

        let hint = self.category_hint();
        match self.fallback.next(&exclude, hint.as_deref()) {
            Ok(text) if !text.trim().is_empty() && !exclude.contains(&text) => {
                let n = self
                    .context
                    .dialogue_history
                    .iter()
                    .filter(|t| t.synthetic)
                    .count()
                    + 1;
                let goal = synthetic_goal(&format!("{SYNTHETIC_PREFIX}{n:02}"), &text);
                let selection = Selection {
                    goal_id: goal.id.clone(),
                    goal_name: goal.name.clone(),
                    text,
                    transition: TransitionTag::Linear,
                };
                self.synthetic = Some(goal);
                Some(selection)
            }
            Ok(_) => {
                warn!("fallback supply returned a used or blank question");
                None
            }
            Err(e) => {
                warn!(error = %e, "fallback supply failed");
                None
            }
        }
    }

    /// First tag of the most recently answered registry goal.
    fn category_hint(&self) -> Option<String> {
        self.context
            .dialogue_history
            .iter()
            .rev()
            .filter(|t| !t.synthetic)
            .find_map(|t| self.registry.get(&t.goal_id))
            .and_then(|g| g.tags.first().cloned())
    }

    fn ask(&mut self, selection: Selection, synthetic: bool) -> Action {
        self.context.questions_asked += 1;
        if selection.transition.is_follow_up() {
            self.context.follow_ups_asked += 1;
        }

        debug!(
            goal_id = %selection.goal_id,
            transition = ?selection.transition,
            synthetic,
            questions_asked = self.context.questions_asked,
            "asking"
        );

        self.context.pending = Some(PendingQuestion {
            goal_id: selection.goal_id.clone(),
            question: selection.text.clone(),
            transition: selection.transition,
            state: self.context.current_state,
            synthetic,
        });

        Action::AskQuestion(Question {
            goal_id: selection.goal_id,
            goal_name: selection.goal_name,
            text: selection.text,
            transition: selection.transition,
            transition_message: selection.transition.message().to_string(),
            synthetic,
        })
    }

    fn finalize(&mut self, reason: FinalizeReason) -> Action {
        let progress = self.registry.progress();
        info!(
            ?reason,
            questions_asked = self.context.questions_asked,
            overall = progress.overall_completion,
            completed = progress.completed_goals,
            total = progress.total_goals,
            "interview finalized"
        );
        self.context.current_state = ConversationState::Finalizing;
        self.context.pending = None;
        self.synthetic = None;
        self.context.finalized = true;
        Action::Finalize(reason)
    }
}

fn synthetic_goal(id: &str, question: &str) -> ReferencePoint {
    ReferencePoint::new(id, "Additional context", Priority::P3Optional).with_sample_question(question)
}
