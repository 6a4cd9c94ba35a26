//! Questionnaire — the multi-page intake flow.
//!
//! A visitor works through three pages of questions and a contact page.
//! Each page's answers are merged into the session, saved locally, and
//! written to the remote store. Leaving the last page finalizes: identity is
//! reconciled one more time and every page is rewritten as a final record.

pub mod answers;
pub mod finalizer;
pub mod identity;
pub mod manager;
pub mod model;
pub mod notify;
pub mod registry;
pub mod routes;
pub mod session;
pub mod state;
pub mod validation;

pub use answers::{AnswerParseError, Answers};
pub use finalizer::{FailedWrite, FinalizeReport, SubmissionFinalizer};
pub use identity::{IdentityCandidate, IdentityResolver};
pub use manager::{ManagerDeps, NavOutcome, QuestionnaireManager, SessionStatus, StepOutcome, SubmitOutcome};
pub use model::{AnswerValue, CONTACT_STEP, ContactInfo, Question, TOTAL_STEPS};
pub use notify::{Notification, NotificationLevel};
pub use registry::{RegistryLimits, SessionRegistry, spawn_sweep_task};
pub use routes::{QuestionnaireRouteState, questionnaire_routes};
pub use session::{LocalSnapshot, Session};
pub use state::{Progress, Transition};
pub use validation::ValidationWarning;
