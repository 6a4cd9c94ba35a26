//! `PersistenceGateway` trait and the record types it moves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::questionnaire::answers::Answers;
use crate::questionnaire::model::ContactInfo;

/// A record to upsert, keyed by `(owner_id, step)`.
///
/// `None` payload fields leave whatever the store already holds untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialStoredRecord {
    pub owner_id: String,
    pub step: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Answers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<ContactInfo>,
    pub final_flag: bool,
}

impl PartialStoredRecord {
    pub fn answers(owner_id: impl Into<String>, step: u8, answers: Answers) -> Self {
        Self {
            owner_id: owner_id.into(),
            step,
            answers: Some(answers),
            contact_info: None,
            final_flag: false,
        }
    }

    pub fn contact(owner_id: impl Into<String>, step: u8, contact: ContactInfo) -> Self {
        Self {
            owner_id: owner_id.into(),
            step,
            answers: None,
            contact_info: Some(contact),
            final_flag: false,
        }
    }

    pub fn finalized(mut self) -> Self {
        self.final_flag = true;
        self
    }

    /// Reject records the store could never accept.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.owner_id.trim().is_empty() {
            return Err(PersistError::Permanent("owner_id is required".to_string()));
        }
        if self.step == 0 {
            return Err(PersistError::Permanent("step must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// A persisted questionnaire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record_id: String,
    pub owner_id: String,
    pub step: u8,
    pub answers: Option<Answers>,
    pub contact_info: Option<ContactInfo>,
    pub final_flag: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A known person, matched by email or phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Backend-agnostic access to questionnaire records and identities.
///
/// Writes are idempotent per `(owner_id, step)`, so repeating one (for a
/// retry, or a late duplicate) converges on the last value written.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert or update the record for `(owner_id, step)`.
    async fn write(&self, record: &PartialStoredRecord) -> Result<(), PersistError>;

    /// All records for an owner, ordered by step.
    async fn records_for_owner(&self, owner_id: &str) -> Result<Vec<StoredRecord>, PersistError>;

    /// Identity whose email matches (case-insensitive).
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<String>, PersistError>;

    /// Identity whose normalized phone matches.
    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<String>, PersistError>;

    /// Insert or update an identity keyed by `identity_id`.
    async fn register_identity(&self, identity: &IdentityRecord) -> Result<(), PersistError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_owner_is_permanent() {
        let record = PartialStoredRecord::answers("  ", 1, Answers::new());
        assert!(matches!(record.validate(), Err(PersistError::Permanent(_))));
    }

    #[test]
    fn step_zero_is_permanent() {
        let record = PartialStoredRecord::answers("owner", 0, Answers::new());
        assert!(matches!(record.validate(), Err(PersistError::Permanent(_))));
    }

    #[test]
    fn partial_record_omits_absent_payloads() {
        let record = PartialStoredRecord::contact("owner", 4, ContactInfo::default()).finalized();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("answers").is_none());
        assert_eq!(json["final_flag"], true);
        assert_eq!(json["step"], 4);
    }
}
