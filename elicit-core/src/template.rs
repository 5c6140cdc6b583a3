//! Deterministic question source built from each goal's sample questions.

use crate::context::ConversationContext;
use crate::ports::QuestionSource;
use crate::reference_point::ReferencePoint;

/// Rotates through a goal's `sample_questions`, then falls back to a phrase
/// derived from its name. Once a goal has partial data, later asks quote it
/// back so the user can extend rather than repeat.
///
/// The rotation position is read from the dialogue history, so a resumed
/// session picks up where it left off.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateQuestionSource;

impl TemplateQuestionSource {
    pub fn new() -> Self {
        Self
    }
}

impl QuestionSource for TemplateQuestionSource {
    fn generate(
        &mut self,
        goal: &ReferencePoint,
        context: &ConversationContext,
    ) -> anyhow::Result<Option<String>> {
        if goal.is_complete() {
            return Ok(None);
        }

        let attempt = context.turns_for(&goal.id);

        if let Some(q) = goal.sample_questions.get(attempt) {
            return Ok(Some(q.clone()));
        }

        let subject = goal.name.to_lowercase();
        let question = match goal.text().map(str::trim).filter(|t| !t.is_empty()) {
            Some(previous) => format!(
                "You said \"{}\" about {}. Could you add more detail?",
                excerpt(previous, 80),
                subject
            ),
            None if goal.description.is_empty() => format!("Could you tell me about {subject}?"),
            None => format!("Could you tell me about {subject}? {}", goal.description),
        };
        Ok(Some(question))
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
