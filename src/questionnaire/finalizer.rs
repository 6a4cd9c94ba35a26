//! Finalize: the terminal write of a questionnaire.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::SubmitError;
use crate::store::{IdentityRecord, PartialStoredRecord, PersistenceGateway};

use super::identity::{IdentityCandidate, IdentityResolver};
use super::session::Session;

/// A per-step write that failed during finalize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedWrite {
    pub step: u8,
    pub error: String,
    pub retryable: bool,
}

/// What a finalize run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReport {
    /// Owner every final record was written under.
    pub owner_id: String,
    /// Existing identity matched during this run, if any.
    pub resolved_identity: Option<String>,
    pub written_steps: Vec<u8>,
    pub failed_steps: Vec<FailedWrite>,
    /// Whether this session was recorded as a new identity.
    pub registered_identity: bool,
}

impl FinalizeReport {
    pub fn is_complete(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

/// Writes one final record per step and moves the session to Submitted.
///
/// Best effort: a failed step write is logged and recorded in the report,
/// and the remaining steps are still attempted.
#[derive(Clone)]
pub struct SubmissionFinalizer {
    gateway: Arc<dyn PersistenceGateway>,
    resolver: IdentityResolver,
}

impl SubmissionFinalizer {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            resolver: IdentityResolver::new(gateway.clone()),
            gateway,
        }
    }

    pub async fn finalize(&self, session: &mut Session) -> Result<FinalizeReport, SubmitError> {
        if session.session_id.trim().is_empty() {
            warn!("Finalize refused: session has no identifier");
            return Err(SubmitError::MissingIdentity);
        }

        // Last reconciliation against stored identities.
        let candidate = IdentityCandidate::from_contact(&session.contact_info);
        let lookup = if candidate.is_empty() {
            None
        } else {
            match self.resolver.resolve(&candidate).await {
                Ok(found) => Some(found),
                Err(e) => {
                    warn!(session_id = %session.session_id, error = %e, "Identity lookup failed during finalize");
                    None
                }
            }
        };
        let resolved_identity = lookup.clone().flatten();
        match &lookup {
            Some(Some(id)) => session.resolved_owner = Some(id.clone()),
            // The contact no longer points at anyone stored.
            Some(None) => session.resolved_owner = None,
            // Lookup failed: keep whatever the last successful one found.
            None if candidate.is_empty() => session.resolved_owner = None,
            None => {}
        }

        let owner_id = session.owner_id().to_string();
        let contact_step = session.contact_step();
        let mut written_steps = Vec::new();
        let mut failed_steps = Vec::new();

        for step in 1..=session.total_steps() {
            let record = if step == contact_step {
                PartialStoredRecord::contact(&owner_id, step, session.contact_info.clone())
            } else {
                PartialStoredRecord::answers(&owner_id, step, session.answers.for_step(step))
            }
            .finalized();

            match self.gateway.write(&record).await {
                Ok(()) => written_steps.push(step),
                Err(e) => {
                    warn!(owner_id = %owner_id, step, error = %e, "Final write failed, continuing");
                    failed_steps.push(FailedWrite {
                        step,
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }

        // Only register when the lookup ran and found nothing; a failed
        // lookup could otherwise create a duplicate. New identities are keyed
        // by the session id and never by a previously resolved owner.
        let registered_identity = match lookup {
            Some(None) => self.register(session, &candidate).await,
            _ => false,
        };

        session.mark_submitted();
        info!(
            owner_id = %owner_id,
            written = written_steps.len(),
            failed = failed_steps.len(),
            "Questionnaire submitted"
        );

        Ok(FinalizeReport {
            owner_id,
            resolved_identity,
            written_steps,
            failed_steps,
            registered_identity,
        })
    }

    async fn register(&self, session: &Session, candidate: &IdentityCandidate) -> bool {
        let identity = IdentityRecord {
            identity_id: session.session_id.clone(),
            email: candidate.email.clone(),
            phone: candidate.phone.clone(),
            full_name: session.contact_info.full_name().map(str::to_string),
        };
        match self.gateway.register_identity(&identity).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    identity_id = %identity.identity_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Identity registration failed"
                );
                false
            }
        }
    }
}
