// Server-side conversations, keyed by id. In-memory only; sessions do not
// survive a restart, and idle ones are evicted after the configured TTL.

pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::curation::conversation::ConversationState;
use crate::curation::engine::{ConversationEngine, Session};
use crate::errors::AppError;

struct Entry {
    session: Session,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    pub async fn create(&self, engine: &ConversationEngine) -> ConversationState {
        self.prune().await;

        let session = engine.new_session();
        let snapshot = session.lock().await.clone();
        self.sessions.write().await.insert(
            snapshot.id(),
            Entry {
                session,
                last_seen: Instant::now(),
            },
        );
        snapshot
    }

    /// Looks a session up and marks it as active.
    pub async fn get(&self, id: Uuid) -> Result<Session, AppError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .filter(|entry| entry.last_seen.elapsed() < self.ttl)
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
        entry.last_seen = Instant::now();
        Ok(entry.session.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), AppError> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Session {id} not found"))),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops sessions idle for longer than the TTL. Returns how many went.
    pub async fn prune(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < self.ttl);
        before - sessions.len()
    }

    /// Prunes on a fixed interval for the life of the process.
    pub fn spawn_cleanup_task(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let evicted = store.prune().await;
                if evicted > 0 {
                    info!("Evicted {evicted} idle session(s), {} remain", store.len().await);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::conversation::{Limits, Phase};
    use crate::curation::curator::Curator;
    use crate::llm_client::testing::ScriptedBackend;

    const TTL: Duration = Duration::from_secs(60);

    fn engine() -> ConversationEngine {
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", |_| Ok(String::new()));
        ConversationEngine::new(Curator::new(
            ScriptedBackend::client(&backend),
            Limits::default(),
        ))
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = SessionStore::new(TTL);
        let created = store.create(&engine()).await;
        assert_eq!(created.phase(), Phase::Upload);
        assert_eq!(store.len().await, 1);

        let session = store.get(created.id()).await.unwrap();
        assert_eq!(session.lock().await.id(), created.id());

        store.remove(created.id()).await.unwrap();
        assert!(matches!(
            store.get(created.id()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(store.remove(created.id()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::new(TTL);
        let engine = engine();
        let idle = store.create(&engine).await;
        let active = store.create(&engine).await;

        tokio::time::advance(Duration::from_secs(45)).await;
        store.get(active.id()).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(matches!(store.get(idle.id()).await, Err(AppError::NotFound(_))));
        assert_eq!(store.prune().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(active.id()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_prunes_expired_sessions() {
        let store = SessionStore::new(TTL);
        let engine = engine();
        store.create(&engine).await;
        store.create(&engine).await;

        tokio::time::advance(TTL).await;
        store.create(&engine).await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps_on_interval() {
        let store = SessionStore::new(TTL);
        store.create(&engine()).await;
        let sweeper = store.spawn_cleanup_task(Duration::from_secs(10));

        tokio::time::sleep(TTL + Duration::from_secs(15)).await;
        assert_eq!(store.len().await, 0);
        sweeper.abort();
    }
}
