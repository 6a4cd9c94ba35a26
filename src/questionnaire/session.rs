//! Session — one visitor's working questionnaire state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answers::Answers;
use super::model::{CONTACT_STEP, ContactInfo, TOTAL_STEPS};
use super::state::{Progress, Transition};
use super::validation::{self, ValidationWarning};

/// A visitor's in-progress questionnaire.
///
/// Created when the flow is entered, mutated by navigation and merges, and
/// discarded only by an explicit reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Stable correlation key generated once per local-state scope.
    pub session_id: String,
    pub answers: Answers,
    pub contact_info: ContactInfo,
    /// Existing identity this visitor was matched to, if any.
    pub resolved_owner: Option<String>,
    progress: Progress,
    total_steps: u8,
}

impl Session {
    /// Start a fresh session with a new random identifier.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            answers: Answers::new(),
            contact_info: ContactInfo::default(),
            resolved_owner: None,
            progress: Progress::start(),
            total_steps: TOTAL_STEPS,
        }
    }

    /// Use a step count other than the standard layout.
    pub fn with_total_steps(mut self, total: u8) -> Self {
        self.total_steps = total.max(1);
        self.progress = Progress::restore(self.progress.step_or(total), self.is_submitted(), total);
        self
    }

    /// Owner key for remote writes: the resolved identity, else the session id.
    pub fn owner_id(&self) -> &str {
        self.resolved_owner.as_deref().unwrap_or(&self.session_id)
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn current_step(&self) -> u8 {
        self.progress.step_or(self.total_steps)
    }

    pub fn total_steps(&self) -> u8 {
        self.total_steps
    }

    pub fn is_submitted(&self) -> bool {
        self.progress.is_terminal()
    }

    /// The page that collects contact details; the last page on layouts
    /// shorter than the standard one.
    pub fn contact_step(&self) -> u8 {
        self.total_steps.min(CONTACT_STEP)
    }

    /// Merge a page's answers. Returns advisory warnings; the merge always
    /// happens.
    pub fn merge_answers(&mut self, step: u8, partial: Answers) -> Vec<ValidationWarning> {
        let mut warnings: Vec<ValidationWarning> = partial
            .keys()
            .filter(|q| q.step() != step)
            .map(|q| ValidationWarning {
                field: q.as_str().to_string(),
                message: format!("Question belongs to step {}, submitted on step {step}", q.step()),
            })
            .collect();

        self.answers.merge(partial);
        warnings.extend(validation::check_step(step, &self.answers, &self.contact_info));
        warnings
    }

    /// Replace contact details wholesale.
    pub fn set_contact_info(&mut self, info: ContactInfo) -> Vec<ValidationWarning> {
        self.contact_info = info;
        validation::check_contact(&self.contact_info)
    }

    /// Move forward one page. Returns [`Transition::Finalize`] at the last
    /// page without changing state; finalizing is the caller's job.
    pub fn advance(&mut self) -> Transition {
        let transition = self.progress.advance(self.total_steps);
        if let Transition::Moved { to, .. } = transition {
            self.progress = Progress::Step(to);
        }
        transition
    }

    /// Move back one page; no-op on the first page or once submitted.
    pub fn retreat(&mut self) -> Transition {
        let transition = self.progress.retreat();
        if let Transition::Moved { to, .. } = transition {
            self.progress = Progress::Step(to);
        }
        transition
    }

    /// Enter the terminal state. Never reverts.
    pub(crate) fn mark_submitted(&mut self) {
        self.progress = Progress::Submitted;
    }

    pub fn to_snapshot(&self) -> LocalSnapshot {
        LocalSnapshot {
            session_id: self.session_id.clone(),
            answers: self.answers.clone(),
            contact_info: self.contact_info.clone(),
            current_step: self.current_step(),
            submitted: self.is_submitted(),
            resolved_owner: self.resolved_owner.clone(),
        }
    }

    pub fn from_snapshot(snapshot: LocalSnapshot) -> Self {
        Self {
            progress: Progress::restore(snapshot.current_step, snapshot.submitted, TOTAL_STEPS),
            session_id: snapshot.session_id,
            answers: snapshot.answers,
            contact_info: snapshot.contact_info,
            resolved_owner: snapshot.resolved_owner,
            total_steps: TOTAL_STEPS,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// The serialized blob kept in local storage so an interrupted visit can
/// resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshot {
    #[serde(alias = "userId", default)]
    pub session_id: String,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default = "first_step")]
    pub current_step: u8,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_owner: Option<String>,
}

fn first_step() -> u8 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaire::model::{AnswerValue, Question};

    #[test]
    fn new_session_starts_on_first_step() {
        let session = Session::new();
        assert_eq!(session.current_step(), 1);
        assert!(!session.is_submitted());
        assert!(!session.session_id.is_empty());
        assert_eq!(session.owner_id(), session.session_id);
    }

    #[test]
    fn owner_follows_resolution() {
        let mut session = Session::with_id("sess-1");
        session.resolved_owner = Some("user-42".into());
        assert_eq!(session.owner_id(), "user-42");
    }

    #[test]
    fn merge_returns_warnings_but_still_merges() {
        let mut session = Session::with_id("s");
        let warnings = session.merge_answers(
            1,
            Answers::new().with(Question::Frameworks, AnswerValue::text("tokio")),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "yearsExperience");
        assert!(session.answers.is_answered(Question::Frameworks));
    }

    #[test]
    fn merge_flags_keys_from_other_steps() {
        let mut session = Session::with_id("s");
        let warnings = session.merge_answers(
            1,
            Answers::new()
                .with(Question::YearsExperience, AnswerValue::text("3-5"))
                .with(Question::Motivations, AnswerValue::text("career")),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "motivations");
        assert_eq!(session.answers.len(), 2);
    }

    #[test]
    fn navigation_stays_in_range() {
        let mut session = Session::with_id("s");
        assert_eq!(session.retreat(), Transition::Stay);
        assert_eq!(session.current_step(), 1);

        for _ in 0..3 {
            session.advance();
        }
        assert_eq!(session.current_step(), 4);
        assert_eq!(session.advance(), Transition::Finalize);
        assert_eq!(session.current_step(), 4);

        session.mark_submitted();
        assert_eq!(session.advance(), Transition::Stay);
        assert_eq!(session.retreat(), Transition::Stay);
        assert!(session.is_submitted());
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut session = Session::with_id("sess-7");
        session.merge_answers(
            1,
            Answers::new()
                .with(Question::YearsExperience, AnswerValue::text("3-5"))
                .with(Question::CloudPlatforms, AnswerValue::choices(["aws"])),
        );
        session.set_contact_info(ContactInfo {
            email: Some("a@b.com".into()),
            agree_to_terms: true,
            ..Default::default()
        });
        session.advance();

        let json = serde_json::to_string(&session.to_snapshot()).unwrap();
        let restored = Session::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored, session);
        assert_eq!(restored.current_step(), 2);
    }

    #[test]
    fn snapshot_accepts_legacy_user_id_key() {
        let snapshot: LocalSnapshot = serde_json::from_value(serde_json::json!({
            "answers": {"motivations": "career"},
            "contactInfo": {},
            "userId": "legacy-1"
        }))
        .unwrap();
        let session = Session::from_snapshot(snapshot);
        assert_eq!(session.session_id, "legacy-1");
        assert_eq!(session.current_step(), 1);
    }

    #[test]
    fn shorter_layouts() {
        let mut session = Session::with_id("s").with_total_steps(2);
        session.advance();
        assert_eq!(session.advance(), Transition::Finalize);
        assert_eq!(session.total_steps(), 2);
    }
}
