//! Static fallback question bank.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ports::FallbackSupply;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackItem {
    pub category: String,
    pub text: String,
}

impl FallbackItem {
    pub fn new(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            text: text.into(),
        }
    }
}

/// Ordered, category-tagged filler questions.
///
/// `next` prefers unused items in the hinted category, then any unused item
/// in bank order. When every item is used it wraps to the first item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackBank {
    items: Vec<FallbackItem>,
}

const DEFAULT_BANK: &[(&str, &str)] = &[
    ("context", "What prompted you to start working on this now?"),
    ("context", "Who else is involved in this effort, and what are their roles?"),
    ("context", "What has already been tried, and what did you learn from it?"),
    ("context", "How does this fit into your organisation's wider plans?"),
    ("context", "What would happen if this work did not go ahead?"),
    ("goals", "What does success look like twelve months from now?"),
    ("goals", "Which outcome matters most to you personally?"),
    ("goals", "How will you know early on that things are on track?"),
    ("goals", "Is there a stretch goal you would pursue with more resources?"),
    ("goals", "What would you consider a disappointing result?"),
    ("people", "Who benefits most directly from this work?"),
    ("people", "Is there anyone who might be negatively affected?"),
    ("people", "How do the people you serve hear about you today?"),
    ("people", "What feedback have you received from the people involved so far?"),
    ("resources", "What resources do you already have in place?"),
    ("resources", "Where do you expect the biggest costs to come from?"),
    ("resources", "Which skills are you missing on the current team?"),
    ("resources", "Are there in-kind contributions or volunteers supporting this?"),
    ("risks", "What is the biggest uncertainty you face right now?"),
    ("risks", "What external factors could slow you down?"),
    ("risks", "If something goes wrong, what is your plan B?"),
    ("risks", "Which assumption would hurt the most if it turned out false?"),
    ("timeline", "What are the key milestones over the coming months?"),
    ("timeline", "Are there fixed dates or deadlines you need to work around?"),
    ("timeline", "What needs to happen first before anything else can start?"),
    ("learning", "How do you collect and use data about your results?"),
    ("learning", "What would you do differently if you started over?"),
    ("learning", "How do you share what you learn with others?"),
    ("general", "Is there anything we have not covered that you think is important?"),
    ("general", "What question were you hoping I would ask?"),
    ("general", "Can you share a concrete example that illustrates your work?"),
    ("general", "What makes your approach different from similar efforts?"),
];

impl FallbackBank {
    pub fn new(items: Vec<FallbackItem>) -> Self {
        Self { items }
    }

    /// The built-in bank of generic interview questions.
    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_BANK
                .iter()
                .map(|(category, text)| FallbackItem::new(*category, *text))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[FallbackItem] {
        &self.items
    }
}

impl FallbackSupply for FallbackBank {
    fn next(&mut self, exclude: &BTreeSet<String>, category_hint: Option<&str>) -> anyhow::Result<String> {
        let unused: Vec<&FallbackItem> = self
            .items
            .iter()
            .filter(|i| !exclude.contains(&i.text))
            .collect();

        let hinted = category_hint
            .and_then(|hint| unused.iter().find(|i| i.category.eq_ignore_ascii_case(hint)));
        if let Some(item) = hinted.or_else(|| unused.first()) {
            return Ok(item.text.clone());
        }

        match self.items.first() {
            Some(item) => Ok(item.text.clone()),
            None => bail!("fallback bank is empty"),
        }
    }

    fn remaining(&self, exclude: &BTreeSet<String>) -> usize {
        self.items.iter().filter(|i| !exclude.contains(&i.text)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_bank_is_large_and_unique() {
        let bank = FallbackBank::builtin();
        assert!(bank.len() >= 30);
        let unique: BTreeSet<_> = bank.items().iter().map(|i| &i.text).collect();
        assert_eq!(unique.len(), bank.len());
    }

    #[test]
    fn never_repeats_until_exhausted() {
        let mut bank = FallbackBank::builtin();
        let mut seen = BTreeSet::new();
        while bank.remaining(&seen) > 0 {
            let q = bank.next(&seen, None).unwrap();
            assert!(seen.insert(q), "repeated before exhaustion");
        }
        assert_eq!(seen.len(), bank.len());
        // exhausted: degrades to any value instead of failing
        assert!(bank.next(&seen, None).is_ok());
    }

    #[test]
    fn category_hint_is_preferred() {
        let mut bank = FallbackBank::new(vec![
            FallbackItem::new("a", "first"),
            FallbackItem::new("b", "second"),
        ]);
        let none = BTreeSet::new();
        assert_eq!(bank.next(&none, Some("B")).unwrap(), "second");
        assert_eq!(bank.next(&none, Some("missing")).unwrap(), "first");
    }

    #[test]
    fn empty_bank_errors() {
        let mut bank = FallbackBank::default();
        assert!(bank.next(&BTreeSet::new(), None).is_err());
        assert_eq!(bank.remaining(&BTreeSet::new()), 0);
    }
}
