//! Live questionnaire managers, kept in memory between requests.
//!
//! Every manager can be rebuilt from local state, so dropping one only costs
//! a reload on the visitor's next request. Submitted and idle managers are
//! dropped by [`SessionRegistry::sweep`], and the map never grows past
//! [`RegistryLimits::max_sessions`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::LocalStateError;

use super::manager::{ManagerDeps, QuestionnaireManager};

/// Bounds on the in-memory session map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    /// Managers untouched for this long are dropped on the next sweep.
    pub idle_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(30 * 60),
            max_sessions: 10_000,
        }
    }
}

struct Entry {
    manager: Arc<QuestionnaireManager>,
    /// Milliseconds since the registry was built.
    last_used: AtomicU64,
}

impl Entry {
    fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }
}

/// Live sessions by scope. Sessions not in memory are reopened from local
/// state on first access.
pub struct SessionRegistry {
    deps: ManagerDeps,
    limits: RegistryLimits,
    epoch: Instant,
    sessions: RwLock<HashMap<String, Entry>>,
}

impl SessionRegistry {
    pub fn new(deps: ManagerDeps) -> Self {
        Self::with_limits(deps, RegistryLimits::default())
    }

    pub fn with_limits(deps: ManagerDeps, limits: RegistryLimits) -> Self {
        Self {
            deps,
            limits,
            epoch: Instant::now(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub async fn create(&self) -> Result<Arc<QuestionnaireManager>, LocalStateError> {
        let manager = Arc::new(QuestionnaireManager::create(self.deps.clone()).await?);
        let mut sessions = self.sessions.write().await;
        self.insert(&mut sessions, manager.clone());
        Ok(manager)
    }

    pub async fn get(&self, scope: &str) -> Result<Option<Arc<QuestionnaireManager>>, LocalStateError> {
        if let Some(entry) = self.sessions.read().await.get(scope) {
            entry.last_used.store(self.now_ms(), Ordering::Relaxed);
            return Ok(Some(entry.manager.clone()));
        }

        let mut sessions = self.sessions.write().await;
        // Another request may have reopened it while we waited for the lock.
        if let Some(entry) = sessions.get(scope) {
            entry.last_used.store(self.now_ms(), Ordering::Relaxed);
            return Ok(Some(entry.manager.clone()));
        }
        match QuestionnaireManager::resume(scope, self.deps.clone()).await? {
            Some(manager) => {
                let manager = Arc::new(manager);
                self.insert(&mut sessions, manager.clone());
                Ok(Some(manager))
            }
            None => Ok(None),
        }
    }

    /// Drop submitted and idle managers. Returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.evict(&mut sessions)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn insert(&self, sessions: &mut HashMap<String, Entry>, manager: Arc<QuestionnaireManager>) {
        let scope = manager.scope().to_string();
        if !sessions.contains_key(&scope) && sessions.len() >= self.limits.max_sessions {
            self.evict(sessions);
            if sessions.len() >= self.limits.max_sessions
                && let Some(oldest) = sessions
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used())
                    .map(|(scope, _)| scope.clone())
            {
                sessions.remove(&oldest);
                debug!(scope = %oldest, "Registry full, dropped least recently used session");
            }
        }
        sessions.insert(
            scope,
            Entry {
                manager,
                last_used: AtomicU64::new(self.now_ms()),
            },
        );
    }

    fn evict(&self, sessions: &mut HashMap<String, Entry>) -> usize {
        let now = self.now_ms();
        let idle_ms = self.limits.idle_ttl.as_millis() as u64;
        let before = sessions.len();

        // A manager that is locked right now is in use; leave it be.
        sessions.retain(|_, entry| match entry.manager.try_is_submitted() {
            None => true,
            Some(submitted) => !submitted && now.saturating_sub(entry.last_used()) < idle_ms,
        });

        let dropped = before - sessions.len();
        if dropped > 0 {
            debug!(dropped, remaining = sessions.len(), "Session sweep");
        }
        dropped
    }
}

/// Sweep the registry once a minute.
pub fn spawn_sweep_task(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            registry.sweep().await;
        }
    })
}
