//! Completion criteria for reference points.
//!
//! Criteria are conjunctive: every configured check must hold. A criteria
//! value with nothing configured is satisfied by any non-empty `text`.
//!
//! Custom validators are plain functions and cannot be serialized, so a
//! criteria value only stores the validator's *name*. The function itself
//! lives in a [`ValidatorTable`] owned by the registry and is re-bound by
//! name after a session is restored.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::reference_point::{CollectedData, TEXT_KEY};

pub type ValidatorFn = Arc<dyn Fn(&CollectedData) -> bool + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionCriteria {
    /// Minimum length (chars) of the `text` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Every keyword must appear in `text` as a whole word (case-insensitive).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_keywords: Vec<String>,

    /// Every named field must be present and non-blank.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,

    /// Name of a custom validator registered in the [`ValidatorTable`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

impl CompletionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_length(mut self, chars: usize) -> Self {
        self.min_length = Some(chars);
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validator(mut self, name: impl Into<String>) -> Self {
        self.validator = Some(name.into());
        self
    }

    /// Evaluate the criteria against collected data.
    ///
    /// A validator that is named but not registered fails closed.
    pub fn is_satisfied(&self, data: &CollectedData, validators: &ValidatorTable) -> bool {
        let text = data.get(TEXT_KEY).map(|s| s.trim()).unwrap_or("");
        if text.is_empty() && self.required_fields.is_empty() {
            return false;
        }

        if let Some(min) = self.min_length {
            if text.chars().count() < min {
                return false;
            }
        }

        if !self
            .required_keywords
            .iter()
            .all(|kw| contains_word(text, kw))
        {
            return false;
        }

        if !self
            .required_fields
            .iter()
            .all(|f| data.get(f).is_some_and(|v| !v.trim().is_empty()))
        {
            return false;
        }

        match &self.validator {
            None => true,
            Some(name) => match validators.get(name) {
                Some(check) => check(data),
                None => {
                    warn!(validator = %name, "completion validator not registered; criteria fail");
                    false
                }
            },
        }
    }
}

fn contains_word(text: &str, keyword: &str) -> bool {
    let kw = keyword.trim();
    if kw.is_empty() {
        return true;
    }
    match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))) {
        Ok(re) => re.is_match(text),
        Err(_) => text.to_lowercase().contains(&kw.to_lowercase()),
    }
}

/// Named custom validators, looked up by [`CompletionCriteria::validator`].
#[derive(Clone, Default)]
pub struct ValidatorTable {
    validators: BTreeMap<String, ValidatorFn>,
}

impl ValidatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn(&CollectedData) -> bool + Send + Sync + 'static,
    {
        self.validators.insert(name.into(), Arc::new(check));
    }

    pub fn get(&self, name: &str) -> Option<&ValidatorFn> {
        self.validators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }
}

impl fmt::Debug for ValidatorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.validators.keys()).finish()
    }
}
