//! elicit-core: adaptive interview engine
//!
//! A [`ReferencePointRegistry`] holds the information goals of an interview
//! and decides which one to pursue next. A [`ConversationController`] drives
//! the turn loop on top of it, asking a [`QuestionSource`] for wording and
//! falling back to a [`FallbackSupply`] until the minimum question count is
//! reached.

pub mod catalog;
pub mod config;
pub mod context;
pub mod controller;
pub mod criteria;
pub mod error;
pub mod fallback;
pub mod ports;
pub mod reference_point;
pub mod registry;
pub mod session;
pub mod template;

pub use catalog::{AnswerMapping, GoalCatalog, builtin_validators};
pub use config::InterviewSettings;
pub use context::{ConversationContext, ConversationState, DialogueTurn, PendingQuestion, TransitionTag};
pub use controller::{Action, ConversationController, FinalizeReason, Question};
pub use criteria::{CompletionCriteria, ValidatorFn, ValidatorTable};
pub use error::{CatalogError, ControllerError, RegistryError, SessionError};
pub use fallback::{FallbackBank, FallbackItem};
pub use ports::{FallbackSupply, QuestionSource};
pub use reference_point::{CollectedData, GoalState, Priority, ReferencePoint, TEXT_KEY};
pub use registry::{Progress, ReferencePointRegistry};
pub use session::{AssembledAnswers, InterviewSession, SessionMeta};
pub use template::TemplateQuestionSource;
