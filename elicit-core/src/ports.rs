//! Collaborator ports consulted by the controller.
//!
//! Both are synchronous. Errors are caught by the controller and treated as
//! "nothing produced", so adapters can fail freely.

use std::collections::BTreeSet;

use crate::context::ConversationContext;
use crate::reference_point::ReferencePoint;

/// Turns a goal into question text.
pub trait QuestionSource {
    /// `Ok(None)` means the source considers the goal already satisfied.
    fn generate(
        &mut self,
        goal: &ReferencePoint,
        context: &ConversationContext,
    ) -> anyhow::Result<Option<String>>;
}

/// Pool of generic filler questions used to reach the minimum-question floor.
pub trait FallbackSupply {
    /// Next question not in `exclude`. Once every item is excluded any item
    /// may be returned, so callers check [`remaining`](Self::remaining) first.
    fn next(&mut self, exclude: &BTreeSet<String>, category_hint: Option<&str>) -> anyhow::Result<String>;

    /// Items not in `exclude`.
    fn remaining(&self, exclude: &BTreeSet<String>) -> usize;
}

impl<T: QuestionSource + ?Sized> QuestionSource for Box<T> {
    fn generate(
        &mut self,
        goal: &ReferencePoint,
        context: &ConversationContext,
    ) -> anyhow::Result<Option<String>> {
        (**self).generate(goal, context)
    }
}

impl<T: FallbackSupply + ?Sized> FallbackSupply for Box<T> {
    fn next(&mut self, exclude: &BTreeSet<String>, category_hint: Option<&str>) -> anyhow::Result<String> {
        (**self).next(exclude, category_hint)
    }

    fn remaining(&self, exclude: &BTreeSet<String>) -> usize {
        (**self).remaining(exclude)
    }
}
