//! Persistence layer — the gateway to the remote questionnaire store.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod rest;
pub mod retry;
pub mod traits;

pub use libsql_backend::LibSqlGateway;
pub use memory::MemoryGateway;
pub use rest::RestGateway;
pub use retry::RetryingGateway;
pub use traits::{IdentityRecord, PartialStoredRecord, PersistenceGateway, StoredRecord};

use std::sync::Arc;

use crate::config::{BackendConfig, FunnelConfig};
use crate::error::DatabaseError;

/// Build the gateway described by the configuration, wrapped for retries
/// when any are configured.
pub async fn connect(config: &FunnelConfig) -> Result<Arc<dyn PersistenceGateway>, DatabaseError> {
    let gateway: Arc<dyn PersistenceGateway> = match &config.backend {
        BackendConfig::Memory => {
            tracing::warn!("No remote store configured; answers are kept in memory only");
            Arc::new(MemoryGateway::new())
        }
        BackendConfig::LibSql { path } => Arc::new(LibSqlGateway::new_local(path).await?),
        BackendConfig::Rest { url, api_key } => {
            tracing::info!(url = %url, "Using hosted REST store");
            Arc::new(RestGateway::new(url.clone(), api_key.clone()))
        }
    };

    if config.write_retries == 0 {
        return Ok(gateway);
    }
    Ok(Arc::new(RetryingGateway::new(
        gateway,
        config.write_retries,
        config.retry_delay,
    )))
}
