//! Error types for the interview engine.

use thiserror::Error;

/// Problems with the shape of a goal set, detected when the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// `depends_on` edges form a cycle; every goal on it would stay blocked forever.
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A goal depends on an id that is not part of the registry.
    #[error("goal {goal} depends on unknown goal {missing}")]
    UnknownDependency { goal: String, missing: String },

    #[error("unknown goal: {0}")]
    UnknownGoal(String),
}

/// Out-of-sequence use of the conversation controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// A question is pinned and the next turn was requested without its answer.
    #[error("an answer is required for the pending question on goal {goal_id}")]
    AnswerRequired { goal_id: String },

    #[error("interview already finalized")]
    AlreadyFinalized,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid goal graph: {0}")]
    Registry(#[from] RegistryError),

    /// `answer_fields` or `hardcoded` names a goal that does not exist.
    #[error("catalog section {section} references unknown goal {goal}")]
    UnknownReference { section: &'static str, goal: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed JSON, or a goal graph that fails validation on load.
    #[error("session (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
