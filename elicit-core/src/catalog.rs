//! Goal catalogs: file-backed goal sets.
//!
//! A catalog is plain TOML so goal sets can be edited without recompiling:
//! - `[[goals]]` entries, one per reference point
//! - `[answer_fields]` mapping goal id -> output field name
//! - `[hardcoded]` answers that pre-complete goals before the first turn

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::criteria::ValidatorTable;
use crate::error::CatalogError;
use crate::reference_point::{CollectedData, Priority, ReferencePoint, TEXT_KEY};
use crate::registry::ReferencePointRegistry;

const PROJECT_GRANT_TOML: &str = include_str!("../catalogs/project_grant.toml");

static AMOUNT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:[$€£]\s?\d|\d[\d,.]*\s?(?:k|m|usd|eur|gbp|dollars|euros|pounds)\b|\d{3,})").ok()
});

/// Goal id -> output field name used when assembling the final record.
pub type AnswerMapping = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalCatalog {
    #[serde(default)]
    pub goals: Vec<ReferencePoint>,
    #[serde(default)]
    pub answer_fields: AnswerMapping,
    #[serde(default)]
    pub hardcoded: BTreeMap<String, String>,
}

impl GoalCatalog {
    /// Parse and validate a catalog.
    pub fn from_toml(s: &str) -> Result<Self, CatalogError> {
        let catalog: GoalCatalog = toml::from_str(s)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// The built-in 13-goal project grant intake.
    pub fn project_grant() -> Result<Self, CatalogError> {
        Self::from_toml(PROJECT_GRANT_TOML)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        // builds the graph once; cycles and dangling edges surface here
        let registry = ReferencePointRegistry::from_points(self.goals.iter().cloned())?;

        for (section, ids) in [
            ("answer_fields", self.answer_fields.keys().collect::<Vec<_>>()),
            ("hardcoded", self.hardcoded.keys().collect::<Vec<_>>()),
        ] {
            if let Some(goal) = ids.into_iter().find(|id| registry.get(id).is_none()) {
                return Err(CatalogError::UnknownReference {
                    section,
                    goal: goal.clone(),
                });
            }
        }
        Ok(())
    }

    /// Build a fresh registry with hardcoded answers seeded (not yet completed).
    pub fn to_registry(&self, validators: ValidatorTable) -> Result<ReferencePointRegistry, CatalogError> {
        let mut registry =
            ReferencePointRegistry::from_points(self.goals.iter().cloned())?.with_validators(validators);
        for (id, text) in &self.hardcoded {
            registry.seed(id, TEXT_KEY, text)?;
        }
        Ok(registry)
    }

    pub fn tier_breakdown(&self) -> BTreeMap<Priority, Vec<&str>> {
        let mut out: BTreeMap<Priority, Vec<&str>> = BTreeMap::new();
        for g in &self.goals {
            out.entry(g.priority).or_default().push(&g.id);
        }
        out
    }
}

/// Validators referenced by the built-in catalogs.
pub fn builtin_validators() -> ValidatorTable {
    let mut table = ValidatorTable::new();
    table.register("mentions_amount", |d: &CollectedData| {
        d.get(TEXT_KEY).is_some_and(|t| match AMOUNT.as_ref() {
            Some(re) => re.is_match(t),
            None => t.chars().any(|c| c.is_ascii_digit()),
        })
    });
    table.register("non_empty", |d: &CollectedData| {
        d.get(TEXT_KEY).is_some_and(|t| !t.trim().is_empty())
    });
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::reference_point::GoalState;

    #[test]
    fn builtin_catalog_has_expected_tiers() {
        let catalog = GoalCatalog::project_grant().unwrap();
        assert_eq!(catalog.goals.len(), 13);
        let tiers = catalog.tier_breakdown();
        assert_eq!(tiers[&Priority::P0Critical].len(), 3);
        assert_eq!(tiers[&Priority::P1Important].len(), 4);
        assert_eq!(tiers[&Priority::P2Desirable].len(), 4);
        assert_eq!(tiers[&Priority::P3Optional].len(), 2);
        assert_eq!(catalog.answer_fields["rp_005_budget"], "budget_total");
    }

    #[test]
    fn builtin_catalog_validators_are_registered() {
        let catalog = GoalCatalog::project_grant().unwrap();
        let validators = builtin_validators();
        for g in &catalog.goals {
            if let Some(name) = &g.criteria.validator {
                assert!(validators.contains(name), "missing validator {name}");
            }
        }
    }

    #[test]
    fn amount_validator_needs_a_figure() {
        let v = builtin_validators();
        let check = v.get("mentions_amount").unwrap();
        let data = |t: &str| CollectedData::from([(TEXT_KEY.to_string(), t.to_string())]);
        assert!(check(&data("about $40,000 in total")));
        assert!(check(&data("45k for staff")));
        assert!(check(&data("12000")));
        assert!(!check(&data("not sure yet")));
    }

    #[test]
    fn parses_minimal_catalog() {
        let catalog = GoalCatalog::from_toml(
            r#"
[[goals]]
id = "a"
name = "A"
priority = "P0_CRITICAL"

[[goals]]
id = "b"
name = "B"
priority = "P2_DESIRABLE"
depends_on = ["a"]
[goals.criteria]
min_length = 5
required_keywords = ["because"]

[hardcoded]
a = "preset answer"
"#,
        )
        .unwrap();
        assert_eq!(catalog.goals[1].criteria.min_length, Some(5));

        let registry = catalog.to_registry(ValidatorTable::new()).unwrap();
        let a = registry.get("a").unwrap();
        assert_eq!(a.state, GoalState::NotStarted);
        assert_eq!(a.text(), Some("preset answer"));
    }

    #[test]
    fn rejects_cyclic_catalog() {
        let err = GoalCatalog::from_toml(
            r#"
[[goals]]
id = "a"
name = "A"
priority = "P1_IMPORTANT"
depends_on = ["b"]

[[goals]]
id = "b"
name = "B"
priority = "P1_IMPORTANT"
depends_on = ["a"]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Registry(RegistryError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn rejects_unknown_answer_field() {
        let err = GoalCatalog::from_toml(
            r#"
[[goals]]
id = "a"
name = "A"
priority = "P1_IMPORTANT"

[answer_fields]
zz = "nope"
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownReference { section: "answer_fields", .. }
        ));
    }

    #[test]
    fn rejects_bad_priority() {
        let err = GoalCatalog::from_toml(
            r#"
[[goals]]
id = "a"
name = "A"
priority = "URGENT"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }
}
