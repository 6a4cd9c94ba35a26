//! QuestionnaireManager — owns one visitor's session and sequences merges,
//! local saves, remote writes, identity resolution and finalize.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{LocalStateError, SubmitError};
use crate::local::LocalStateStore;
use crate::store::{PartialStoredRecord, PersistenceGateway};

use super::answers::Answers;
use super::finalizer::{FinalizeReport, SubmissionFinalizer};
use super::identity::{IdentityCandidate, IdentityResolver};
use super::model::{ContactInfo, step_name};
use super::notify::Notification;
use super::session::Session;
use super::state::Transition;
use super::validation::ValidationWarning;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct ManagerDeps {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub local: Arc<dyn LocalStateStore>,
}

impl ManagerDeps {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, local: Arc<dyn LocalStateStore>) -> Self {
        Self { gateway, local }
    }
}

/// Result of submitting a page or contact details.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub warnings: Vec<ValidationWarning>,
    pub notifications: Vec<Notification>,
    /// Whether the remote write for this page went through.
    pub saved_remotely: bool,
}

/// Result of a navigation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavOutcome {
    pub moved: bool,
    /// Present when this request finalized the questionnaire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<FinalizeReport>,
    pub notifications: Vec<Notification>,
    pub status: SessionStatus,
}

/// Result of an explicit submit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub report: FinalizeReport,
    pub notifications: Vec<Notification>,
    pub status: SessionStatus,
}

/// Snapshot of a session for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub scope: String,
    pub session_id: String,
    pub owner_id: String,
    pub current_step: u8,
    pub total_steps: u8,
    pub step_name: &'static str,
    pub progress: String,
    pub view_path: String,
    pub submitted: bool,
    pub answers: Answers,
    pub contact_info: ContactInfo,
}

/// One visitor's questionnaire, with its local-state scope.
///
/// Every operation holds the session lock for its whole duration, so the
/// session has a single writer and local saves follow mutations in order.
pub struct QuestionnaireManager {
    scope: String,
    deps: ManagerDeps,
    resolver: IdentityResolver,
    finalizer: SubmissionFinalizer,
    session: RwLock<Session>,
}

impl QuestionnaireManager {
    fn with_session(scope: String, deps: ManagerDeps, session: Session) -> Self {
        Self {
            scope,
            resolver: IdentityResolver::new(deps.gateway.clone()),
            finalizer: SubmissionFinalizer::new(deps.gateway.clone()),
            deps,
            session: RwLock::new(session),
        }
    }

    /// Start a new session whose scope is its own identifier.
    pub async fn create(deps: ManagerDeps) -> Result<Self, LocalStateError> {
        let session = Session::new();
        let scope = session.session_id.clone();
        deps.local.save(&scope, &session.to_snapshot()).await?;
        info!(session_id = %scope, "Questionnaire session created");
        Ok(Self::with_session(scope, deps, session))
    }

    /// Reopen the session saved under `scope`. `None` when nothing usable
    /// is stored there.
    pub async fn resume(scope: &str, deps: ManagerDeps) -> Result<Option<Self>, LocalStateError> {
        match deps.local.load(scope).await {
            Ok(Some(snapshot)) => {
                let session = Session::from_snapshot(snapshot);
                debug!(scope, step = session.current_step(), "Questionnaire session resumed");
                Ok(Some(Self::with_session(scope.to_string(), deps, session)))
            }
            Ok(None) => Ok(None),
            Err(LocalStateError::Corrupt { scope, reason }) => {
                warn!(scope = %scope, reason = %reason, "Discarding corrupt local state");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Reopen the session saved under `scope`, or start a fresh one there.
    pub async fn open(scope: &str, deps: ManagerDeps) -> Result<Self, LocalStateError> {
        if let Some(manager) = Self::resume(scope, deps.clone()).await? {
            return Ok(manager);
        }
        let session = Session::new();
        deps.local.save(scope, &session.to_snapshot()).await?;
        info!(scope, session_id = %session.session_id, "Questionnaire session started");
        Ok(Self::with_session(scope.to_string(), deps, session))
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Whether the session is submitted, or `None` while a request holds it.
    pub fn try_is_submitted(&self) -> Option<bool> {
        self.session.try_read().ok().map(|s| s.is_submitted())
    }

    /// Merge a page's answers, save locally, then write the page's record.
    pub async fn submit_step(&self, step: u8, partial: Answers) -> StepOutcome {
        let mut session = self.session.write().await;
        let warnings = session.merge_answers(step, partial);

        let mut outcome = StepOutcome {
            warnings,
            ..Default::default()
        };
        outcome.notifications.extend(self.save_local(&session).await);

        let record = PartialStoredRecord::answers(session.owner_id(), step, session.answers.for_step(step));
        outcome.saved_remotely = self.write_remote(&record, &mut outcome.notifications).await;

        debug!(
            session_id = %session.session_id,
            step,
            step_name = step_name(step),
            warnings = outcome.warnings.len(),
            "Step submitted"
        );
        outcome
    }

    /// Replace contact details, reconcile identity, then write the contact
    /// record.
    pub async fn update_contact_info(&self, info: ContactInfo) -> StepOutcome {
        let mut session = self.session.write().await;
        let mut outcome = StepOutcome {
            warnings: session.set_contact_info(info),
            ..Default::default()
        };

        let candidate = IdentityCandidate::from_contact(&session.contact_info);
        if !candidate.is_empty() {
            match self.resolver.resolve(&candidate).await {
                Ok(Some(id)) => {
                    if session.resolved_owner.as_deref() != Some(id.as_str()) {
                        info!(session_id = %session.session_id, identity_id = %id, "Session matched to existing identity");
                    }
                    session.resolved_owner = Some(id);
                }
                Ok(None) => {
                    if let Some(previous) = session.resolved_owner.take() {
                        info!(session_id = %session.session_id, identity_id = %previous, "Contact no longer matches identity");
                    }
                }
                Err(e) => {
                    warn!(session_id = %session.session_id, error = %e, "Identity lookup failed");
                }
            }
        } else {
            session.resolved_owner = None;
        }

        outcome.notifications.extend(self.save_local(&session).await);

        let step = session.contact_step();
        let record = PartialStoredRecord::contact(session.owner_id(), step, session.contact_info.clone());
        outcome.saved_remotely = self.write_remote(&record, &mut outcome.notifications).await;
        outcome
    }

    /// Next page; past the last page this finalizes (exactly once).
    ///
    /// Only `MissingIdentity` is an error, and it leaves the session on the
    /// last page.
    pub async fn advance(&self) -> Result<NavOutcome, SubmitError> {
        let mut session = self.session.write().await;
        let mut notifications = Vec::new();

        let (moved, report) = match session.advance() {
            Transition::Moved { from, to } => {
                debug!(session_id = %session.session_id, from, to, "Advanced");
                (true, None)
            }
            Transition::Finalize => {
                let report = self.finalizer.finalize(&mut session).await?;
                notifications.extend(incomplete_notice(&report));
                (true, Some(report))
            }
            Transition::Stay => (false, None),
        };

        if moved {
            notifications.extend(self.save_local(&session).await);
        }
        Ok(NavOutcome {
            moved,
            report,
            notifications,
            status: self.status_of(&session),
        })
    }

    /// Previous page; no-op on the first page or once submitted.
    pub async fn retreat(&self) -> NavOutcome {
        let mut session = self.session.write().await;
        let moved = matches!(session.retreat(), Transition::Moved { .. });
        let notifications = if moved {
            self.save_local(&session).await.into_iter().collect()
        } else {
            Vec::new()
        };
        NavOutcome {
            moved,
            report: None,
            notifications,
            status: self.status_of(&session),
        }
    }

    /// Run the finalizer regardless of the current page.
    pub async fn finalize(&self) -> Result<SubmitOutcome, SubmitError> {
        let mut session = self.session.write().await;
        let report = self.finalizer.finalize(&mut session).await?;
        let mut notifications: Vec<Notification> = incomplete_notice(&report).into_iter().collect();
        notifications.extend(self.save_local(&session).await);
        Ok(SubmitOutcome {
            report,
            notifications,
            status: self.status_of(&session),
        })
    }

    /// Clear local state and start over with a new session in the same scope.
    pub async fn reset(&self) -> Result<SessionStatus, LocalStateError> {
        let mut session = self.session.write().await;
        self.deps.local.clear(&self.scope).await?;
        *session = Session::new();
        self.deps.local.save(&self.scope, &session.to_snapshot()).await?;
        info!(scope = %self.scope, session_id = %session.session_id, "Questionnaire reset");
        Ok(self.status_of(&session))
    }

    pub async fn status(&self) -> SessionStatus {
        self.status_of(&*self.session.read().await)
    }

    /// A copy of the current session.
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    fn status_of(&self, session: &Session) -> SessionStatus {
        SessionStatus {
            scope: self.scope.clone(),
            session_id: session.session_id.clone(),
            owner_id: session.owner_id().to_string(),
            current_step: session.current_step(),
            total_steps: session.total_steps(),
            step_name: step_name(session.current_step()),
            progress: session.progress().to_string(),
            view_path: session.progress().view_path(),
            submitted: session.is_submitted(),
            answers: session.answers.clone(),
            contact_info: session.contact_info.clone(),
        }
    }

    async fn save_local(&self, session: &Session) -> Option<Notification> {
        match self.deps.local.save(&self.scope, &session.to_snapshot()).await {
            Ok(()) => None,
            Err(e) => {
                warn!(scope = %self.scope, error = %e, "Failed to save local state");
                Some(Notification::warning(
                    "Progress not saved on this device",
                    "You can keep going, but a reload may lose your answers.",
                ))
            }
        }
    }

    async fn write_remote(&self, record: &PartialStoredRecord, notifications: &mut Vec<Notification>) -> bool {
        match self.deps.gateway.write(record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    owner_id = %record.owner_id,
                    step = record.step,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Remote save failed"
                );
                notifications.push(Notification::save_failed(record.step, &e));
                false
            }
        }
    }
}

/// Warning raised when finalize could not write every step.
fn incomplete_notice(report: &FinalizeReport) -> Option<Notification> {
    if report.is_complete() {
        return None;
    }
    let steps: Vec<String> = report.failed_steps.iter().map(|f| f.step.to_string()).collect();
    Some(Notification::warning(
        "Submitted with errors",
        format!("Steps {} could not be saved to the server", steps.join(", ")),
    ))
}
