//! Local session state, the resumable blob kept per visitor scope.
//!
//! The file-backed store keeps one JSON file per scope under a directory:
//! `<dir>/<scope>.json`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::LocalStateError;
use crate::questionnaire::session::LocalSnapshot;

/// Storage for the serialized session blob, one per scope key.
#[async_trait]
pub trait LocalStateStore: Send + Sync {
    /// Load the blob for `scope`, if one was saved.
    async fn load(&self, scope: &str) -> Result<Option<LocalSnapshot>, LocalStateError>;

    /// Replace the blob for `scope`.
    async fn save(&self, scope: &str, snapshot: &LocalSnapshot) -> Result<(), LocalStateError>;

    /// Remove the blob. Returns whether one existed.
    async fn clear(&self, scope: &str) -> Result<bool, LocalStateError>;
}

/// Scope keys become file names, so only a safe alphabet is accepted.
fn check_scope(scope: &str) -> Result<(), LocalStateError> {
    let valid = !scope.is_empty()
        && scope.len() <= 128
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LocalStateError::InvalidScope(scope.to_string()))
    }
}

fn parse(scope: &str, raw: &str) -> Result<LocalSnapshot, LocalStateError> {
    serde_json::from_str(raw).map_err(|e| LocalStateError::Corrupt {
        scope: scope.to_string(),
        reason: e.to_string(),
    })
}

/// File-backed local state.
pub struct FileStateStore {
    base_path: PathBuf,
}

impl FileStateStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Ensure the state directory exists.
    pub async fn ensure_dirs(&self) -> Result<(), LocalStateError> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    fn path_for(&self, scope: &str) -> Result<PathBuf, LocalStateError> {
        check_scope(scope)?;
        Ok(self.base_path.join(format!("{scope}.json")))
    }
}

#[async_trait]
impl LocalStateStore for FileStateStore {
    async fn load(&self, scope: &str) -> Result<Option<LocalSnapshot>, LocalStateError> {
        let path = self.path_for(scope)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => parse(scope, &raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, scope: &str, snapshot: &LocalSnapshot) -> Result<(), LocalStateError> {
        let path = self.path_for(scope)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(snapshot)?;

        // Write-then-rename so a crash never leaves a half-written blob.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;

        debug!(scope, step = snapshot.current_step, "Local state saved");
        Ok(())
    }

    async fn clear(&self, scope: &str) -> Result<bool, LocalStateError> {
        let path = self.path_for(scope)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory local state. Blobs are kept serialized, as a browser would.
#[derive(Default)]
pub struct MemoryStateStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw blob as-is (used to exercise corrupt-state handling).
    pub async fn put_raw(&self, scope: &str, raw: impl Into<String>) {
        self.blobs.write().await.insert(scope.to_string(), raw.into());
    }
}

#[async_trait]
impl LocalStateStore for MemoryStateStore {
    async fn load(&self, scope: &str) -> Result<Option<LocalSnapshot>, LocalStateError> {
        check_scope(scope)?;
        match self.blobs.read().await.get(scope) {
            Some(raw) => parse(scope, raw).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, scope: &str, snapshot: &LocalSnapshot) -> Result<(), LocalStateError> {
        check_scope(scope)?;
        let json = serde_json::to_string(snapshot)?;
        self.blobs.write().await.insert(scope.to_string(), json);
        Ok(())
    }

    async fn clear(&self, scope: &str) -> Result<bool, LocalStateError> {
        check_scope(scope)?;
        Ok(self.blobs.write().await.remove(scope).is_some())
    }
}
