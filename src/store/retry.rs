//! Retry wrapper for any gateway.
//!
//! Only transient failures are repeated. Writes are keyed upserts, so a
//! repeated write that already landed is harmless.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::PersistError;
use crate::store::traits::{IdentityRecord, PartialStoredRecord, PersistenceGateway, StoredRecord};

/// Gateway decorator that retries transient failures with a fixed delay.
pub struct RetryingGateway {
    inner: Arc<dyn PersistenceGateway>,
    extra_attempts: u32,
    delay: Duration,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn PersistenceGateway>, extra_attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            extra_attempts,
            delay,
        }
    }

    async fn run<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, PersistError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PersistError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(e) if e.is_retryable() && attempt < self.extra_attempts => {
                    attempt += 1;
                    warn!(op, attempt, error = %e, "Transient store failure, retrying");
                    tokio::time::sleep(self.delay).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl PersistenceGateway for RetryingGateway {
    async fn write(&self, record: &PartialStoredRecord) -> Result<(), PersistError> {
        self.run("write", || self.inner.write(record)).await
    }

    async fn records_for_owner(&self, owner_id: &str) -> Result<Vec<StoredRecord>, PersistError> {
        self.run("records_for_owner", || self.inner.records_for_owner(owner_id))
            .await
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<String>, PersistError> {
        self.run("find_identity_by_email", || self.inner.find_identity_by_email(email))
            .await
    }

    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<String>, PersistError> {
        self.run("find_identity_by_phone", || self.inner.find_identity_by_phone(phone))
            .await
    }

    async fn register_identity(&self, identity: &IdentityRecord) -> Result<(), PersistError> {
        self.run("register_identity", || self.inner.register_identity(identity))
            .await
    }
}
