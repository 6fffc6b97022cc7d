// SPDX-License-Identifier: Apache-2.0
use actix_session::storage::{LoadError, SaveError, SessionKey, SessionStore, UpdateError};
use actix_web::cookie::time::Duration;
use rand::distr::{Alphanumeric, SampleString};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, error};

/// Length of a generated session token.
pub const SESSION_TOKEN_LENGTH: usize = 64;

type SessionState = HashMap<String, String>;

#[derive(Debug, Clone)]
struct SessionRecord {
    state: SessionState,
    expires_at: Instant,
}

impl SessionRecord {
    fn new(state: SessionState, ttl: &Duration) -> Self {
        Self {
            state,
            expires_at: expiry_from_now(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-process session store.
///
/// Records live for the lifetime of the process and are lost on restart. Every write
/// replaces a whole record, so a request that is abandoned half way through never
/// leaves partially written session state behind.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of records currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn generate_key() -> Result<SessionKey, anyhow::Error> {
        let token = Alphanumeric.sample_string(&mut rand::rng(), SESSION_TOKEN_LENGTH);
        SessionKey::try_from(token).map_err(|e| anyhow::anyhow!("Failed to create SessionKey: {}", e))
    }

    fn write(&self, key: &str, record: SessionRecord) -> Result<(), anyhow::Error> {
        match self.sessions.write() {
            Ok(mut sessions) => {
                let now = Instant::now();
                sessions.retain(|_, r| !r.is_expired(now));
                sessions.insert(key.to_owned(), record);
                Ok(())
            }
            Err(e) => {
                error!("Failed to acquire write lock: {}", e);
                Err(anyhow::anyhow!("Failed to acquire write lock: {}", e))
            }
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn expiry_from_now(ttl: &Duration) -> Instant {
    let ttl = std::time::Duration::try_from(*ttl).unwrap_or_default();
    Instant::now() + ttl
}

impl SessionStore for MemorySessionStore {
    async fn load(&self, session_key: &SessionKey) -> Result<Option<SessionState>, LoadError> {
        let key = session_key.as_ref();

        match self.sessions.read() {
            Ok(sessions) => {
                let state = sessions
                    .get(key)
                    .filter(|record| !record.is_expired(Instant::now()))
                    .map(|record| record.state.clone());
                debug!(found = state.is_some(), "Loaded session record");
                Ok(state)
            }
            Err(e) => {
                error!("Failed to acquire read lock: {}", e);
                Err(LoadError::Other(anyhow::anyhow!("Failed to acquire read lock: {}", e)))
            }
        }
    }

    async fn save(&self, session_state: SessionState, ttl: &Duration) -> Result<SessionKey, SaveError> {
        let session_key = Self::generate_key().map_err(SaveError::Other)?;
        debug!(entries = session_state.len(), "Saving new session record");

        self.write(session_key.as_ref(), SessionRecord::new(session_state, ttl))
            .map_err(SaveError::Other)?;
        Ok(session_key)
    }

    async fn update(
        &self,
        session_key: SessionKey,
        session_state: SessionState,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        let key = session_key.as_ref();

        let exists = self
            .sessions
            .read()
            .map(|sessions| sessions.get(key).is_some_and(|r| !r.is_expired(Instant::now())))
            .map_err(|e| UpdateError::Other(anyhow::anyhow!("Failed to acquire read lock: {}", e)))?;

        if !exists {
            // The record expired or was deleted while the request was in flight.
            debug!("Session record vanished, issuing a new key");
            return self
                .save(session_state, ttl)
                .await
                .map_err(|e| UpdateError::Other(anyhow::anyhow!("{}", e)));
        }

        debug!(entries = session_state.len(), "Updating session record");
        self.write(key, SessionRecord::new(session_state, ttl))
            .map_err(UpdateError::Other)?;
        Ok(session_key)
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> Result<(), anyhow::Error> {
        match self.sessions.write() {
            Ok(mut sessions) => {
                if let Some(record) = sessions.get_mut(session_key.as_ref()) {
                    record.expires_at = expiry_from_now(ttl);
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to acquire write lock: {}", e);
                Err(anyhow::anyhow!("Failed to acquire write lock: {}", e))
            }
        }
    }

    async fn delete(&self, session_key: &SessionKey) -> Result<(), anyhow::Error> {
        match self.sessions.write() {
            Ok(mut sessions) => {
                let removed = sessions.remove(session_key.as_ref());
                debug!(removed = removed.is_some(), "Deleted session record");
                Ok(())
            }
            Err(e) => {
                error!("Failed to acquire write lock for deletion: {}", e);
                Err(anyhow::anyhow!("Failed to acquire write lock: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, &str)]) -> SessionState {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[actix_web::test]
    async fn save_then_load_returns_state() {
        let store = MemorySessionStore::new();
        let key = store
            .save(state(&[("flash", "\"hello\"")]), &Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(key.as_ref().len(), SESSION_TOKEN_LENGTH);
        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.get("flash").map(String::as_str), Some("\"hello\""));
    }

    #[actix_web::test]
    async fn generated_keys_differ() {
        let store = MemorySessionStore::new();
        let a = store.save(state(&[]), &Duration::hours(1)).await.unwrap();
        let b = store.save(state(&[]), &Duration::hours(1)).await.unwrap();
        assert_ne!(a.as_ref(), b.as_ref());
    }

    #[actix_web::test]
    async fn expired_records_load_as_absent() {
        let store = MemorySessionStore::new();
        let key = store.save(state(&[("a", "1")]), &Duration::ZERO).await.unwrap();

        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn update_replaces_the_whole_record() {
        let store = MemorySessionStore::new();
        let key = store
            .save(state(&[("a", "1"), ("b", "2")]), &Duration::hours(1))
            .await
            .unwrap();
        let original = key.as_ref().to_owned();

        let key = store
            .update(key, state(&[("a", "3")]), &Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(key.as_ref(), original);
        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded, state(&[("a", "3")]));
    }

    #[actix_web::test]
    async fn delete_removes_record() {
        let store = MemorySessionStore::new();
        let key = store.save(state(&[("a", "1")]), &Duration::hours(1)).await.unwrap();

        store.delete(&key).await.unwrap();

        assert!(store.load(&key).await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
