#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};

use elicit_core::{
    Action, ConversationContext, ConversationController, FallbackBank, FallbackSupply, FinalizeReason, Priority,
    QuestionSource, ReferencePoint, ReferencePointRegistry,
};

/// Long enough for every built-in criterion, and mentions an amount.
pub const RICH_ANSWER: &str =
    "We plan to spend $40,000 over eighteen months running weekly workshops for local youth.";

/// Deterministic source that records how often each goal was asked about.
#[derive(Debug, Default)]
pub struct CountingSource {
    pub calls: HashMap<String, usize>,
}

impl CountingSource {
    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.get(id).copied().unwrap_or(0)
    }
}

impl QuestionSource for CountingSource {
    fn generate(
        &mut self,
        goal: &ReferencePoint,
        _context: &ConversationContext,
    ) -> anyhow::Result<Option<String>> {
        let n = self.calls.entry(goal.id.clone()).or_insert(0);
        *n += 1;
        if goal.is_complete() {
            return Ok(None);
        }
        Ok(Some(format!("Question {} about {}?", n, goal.name)))
    }
}

/// Claims every goal is already covered.
#[derive(Debug, Default)]
pub struct DecliningSource {
    pub calls: usize,
}

impl QuestionSource for DecliningSource {
    fn generate(
        &mut self,
        _goal: &ReferencePoint,
        _context: &ConversationContext,
    ) -> anyhow::Result<Option<String>> {
        self.calls += 1;
        Ok(None)
    }
}

/// Fallback supply that always reports stock but never yields a usable question.
#[derive(Debug)]
pub enum FaultyFallback {
    Failing,
    Returns(String),
}

impl FallbackSupply for FaultyFallback {
    fn next(&mut self, _exclude: &BTreeSet<String>, _category_hint: Option<&str>) -> anyhow::Result<String> {
        match self {
            FaultyFallback::Failing => anyhow::bail!("question bank offline"),
            FaultyFallback::Returns(text) => Ok(text.clone()),
        }
    }

    fn remaining(&self, _exclude: &BTreeSet<String>) -> usize {
        1
    }
}

pub fn goal(id: &str, priority: Priority) -> ReferencePoint {
    ReferencePoint::new(id, id, priority)
}

pub fn registry(points: Vec<ReferencePoint>) -> ReferencePointRegistry {
    ReferencePointRegistry::from_points(points).unwrap()
}

pub type Controller = ConversationController<CountingSource, FallbackBank>;

pub fn controller(registry: ReferencePointRegistry) -> Controller {
    ConversationController::new(registry, CountingSource::default(), FallbackBank::builtin()).unwrap()
}

/// Drive an interview to the end, answering every question with `answer`.
/// Returns the goal id of every question asked, in order, and the finalize reason.
pub fn run_to_end(controller: &mut Controller, answer: &str) -> (Vec<String>, FinalizeReason) {
    let mut asked = Vec::new();
    let mut action = controller.begin().unwrap();
    loop {
        match action {
            Action::AskQuestion(q) => {
                assert!(asked.len() <= 26, "interview did not terminate");
                asked.push(q.goal_id);
                action = controller.submit(answer).unwrap();
            }
            Action::Finalize(reason) => return (asked, reason),
        }
    }
}
