//! Match a visitor to a previously stored identity by email or phone.

use std::sync::Arc;

use tracing::debug;

use crate::error::PersistError;
use crate::store::PersistenceGateway;

use super::model::ContactInfo;

/// Normalized lookup keys for identity resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCandidate {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl IdentityCandidate {
    /// Build a candidate, normalizing both keys. Blank values count as absent.
    pub fn new(email: Option<&str>, phone: Option<&str>) -> Self {
        Self {
            email: email.and_then(normalize_email),
            phone: phone.and_then(normalize_phone),
        }
    }

    pub fn from_contact(contact: &ContactInfo) -> Self {
        Self::new(contact.email(), contact.phone())
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}

/// Trim and lowercase.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    (!email.is_empty()).then_some(email)
}

/// Strip whitespace, dashes, dots and parentheses; a leading `+` is kept.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let phone: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')'))
        .collect();
    (!phone.is_empty()).then_some(phone)
}

/// Read-only lookup of existing identities. Never mutates the session; the
/// caller decides what to do with a match.
#[derive(Clone)]
pub struct IdentityResolver {
    gateway: Arc<dyn PersistenceGateway>,
}

impl IdentityResolver {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Email first, then phone. An empty candidate resolves to `None`
    /// without touching the store.
    pub async fn resolve(&self, candidate: &IdentityCandidate) -> Result<Option<String>, PersistError> {
        if let Some(email) = &candidate.email
            && let Some(id) = self.gateway.find_identity_by_email(email).await?
        {
            debug!(identity_id = %id, "Identity matched by email");
            return Ok(Some(id));
        }

        if let Some(phone) = &candidate.phone
            && let Some(id) = self.gateway.find_identity_by_phone(phone).await?
        {
            debug!(identity_id = %id, "Identity matched by phone");
            return Ok(Some(id));
        }

        Ok(None)
    }
}
