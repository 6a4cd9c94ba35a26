//! In-process gateway. Used by tests and when no backend is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::PersistError;
use crate::store::traits::{IdentityRecord, PartialStoredRecord, PersistenceGateway, StoredRecord};

/// Gateway that keeps everything in memory and counts the calls it serves.
#[derive(Default)]
pub struct MemoryGateway {
    records: RwLock<HashMap<(String, u8), StoredRecord>>,
    identities: RwLock<Vec<IdentityRecord>>,
    writes: AtomicUsize,
    lookups: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls accepted so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of identity lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub async fn identities(&self) -> Vec<IdentityRecord> {
        self.identities.read().await.clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn write(&self, record: &PartialStoredRecord) -> Result<(), PersistError> {
        record.validate()?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        let key = (record.owner_id.clone(), record.step);
        let mut records = self.records.write().await;
        match records.get_mut(&key) {
            Some(existing) => {
                if let Some(answers) = &record.answers {
                    existing.answers = Some(answers.clone());
                }
                if let Some(contact) = &record.contact_info {
                    existing.contact_info = Some(contact.clone());
                }
                existing.final_flag = record.final_flag;
                existing.updated_at = now;
            }
            None => {
                records.insert(
                    key,
                    StoredRecord {
                        record_id: Uuid::new_v4().to_string(),
                        owner_id: record.owner_id.clone(),
                        step: record.step,
                        answers: record.answers.clone(),
                        contact_info: record.contact_info.clone(),
                        final_flag: record.final_flag,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }

        debug!(owner_id = %record.owner_id, step = record.step, final_flag = record.final_flag, "Record stored in memory");
        Ok(())
    }

    async fn records_for_owner(&self, owner_id: &str) -> Result<Vec<StoredRecord>, PersistError> {
        let records = self.records.read().await;
        let mut out: Vec<StoredRecord> = records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.step);
        Ok(out)
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<String>, PersistError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let identities = self.identities.read().await;
        Ok(identities
            .iter()
            .find(|i| i.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .map(|i| i.identity_id.clone()))
    }

    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<String>, PersistError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let identities = self.identities.read().await;
        Ok(identities
            .iter()
            .find(|i| i.phone.as_deref() == Some(phone))
            .map(|i| i.identity_id.clone()))
    }

    async fn register_identity(&self, identity: &IdentityRecord) -> Result<(), PersistError> {
        if identity.identity_id.trim().is_empty() {
            return Err(PersistError::Permanent("identity_id is required".to_string()));
        }
        let mut identities = self.identities.write().await;
        match identities.iter_mut().find(|i| i.identity_id == identity.identity_id) {
            Some(existing) => {
                existing.email = identity.email.clone().or(existing.email.take());
                existing.phone = identity.phone.clone().or(existing.phone.take());
                existing.full_name = identity.full_name.clone().or(existing.full_name.take());
            }
            None => identities.push(identity.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaire::answers::Answers;
    use crate::questionnaire::model::{AnswerValue, ContactInfo, Question};

    fn step_one(value: &str) -> Answers {
        Answers::new().with(Question::YearsExperience, AnswerValue::text(value))
    }

    #[tokio::test]
    async fn write_is_upsert_per_owner_and_step() {
        let gw = MemoryGateway::new();
        gw.write(&PartialStoredRecord::answers("o1", 1, step_one("1-3"))).await.unwrap();
        gw.write(&PartialStoredRecord::answers("o1", 1, step_one("3-5"))).await.unwrap();
        gw.write(&PartialStoredRecord::answers("o1", 2, Answers::new())).await.unwrap();

        let records = gw.records_for_owner("o1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step, 1);
        assert_eq!(
            records[0].answers.as_ref().unwrap().get(Question::YearsExperience),
            Some(&AnswerValue::text("3-5"))
        );
        assert!(records[0].updated_at >= records[0].created_at);
        assert_eq!(gw.write_count(), 3);
    }

    #[tokio::test]
    async fn partial_write_keeps_other_payload() {
        let gw = MemoryGateway::new();
        gw.write(&PartialStoredRecord::answers("o1", 4, step_one("3-5"))).await.unwrap();
        gw.write(&PartialStoredRecord::contact("o1", 4, ContactInfo::default()).finalized())
            .await
            .unwrap();

        let records = gw.records_for_owner("o1").await.unwrap();
        assert!(records[0].answers.is_some());
        assert!(records[0].contact_info.is_some());
        assert!(records[0].final_flag);
    }

    #[tokio::test]
    async fn rejects_missing_owner() {
        let gw = MemoryGateway::new();
        let err = gw
            .write(&PartialStoredRecord::answers("", 1, Answers::new()))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(gw.write_count(), 0);
    }

    #[tokio::test]
    async fn identity_lookups() {
        let gw = MemoryGateway::new();
        gw.register_identity(&IdentityRecord {
            identity_id: "user-42".into(),
            email: Some("a@b.com".into()),
            phone: Some("0501234567".into()),
            full_name: None,
        })
        .await
        .unwrap();

        assert_eq!(gw.find_identity_by_email("A@B.com").await.unwrap().as_deref(), Some("user-42"));
        assert_eq!(gw.find_identity_by_phone("0501234567").await.unwrap().as_deref(), Some("user-42"));
        assert_eq!(gw.find_identity_by_email("x@y.com").await.unwrap(), None);
        assert_eq!(gw.lookup_count(), 3);
    }

    #[tokio::test]
    async fn register_identity_merges_fields() {
        let gw = MemoryGateway::new();
        let mut identity = IdentityRecord {
            identity_id: "u1".into(),
            email: Some("a@b.com".into()),
            phone: None,
            full_name: None,
        };
        gw.register_identity(&identity).await.unwrap();
        identity.email = None;
        identity.phone = Some("0501234567".into());
        gw.register_identity(&identity).await.unwrap();

        let all = gw.identities().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].email.as_deref(), Some("a@b.com"));
        assert_eq!(all[0].phone.as_deref(), Some("0501234567"));
    }
}
