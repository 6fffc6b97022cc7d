// SPDX-License-Identifier: Apache-2.0
use actix_session::config::{CookieContentSecurity, PersistentSession};
use actix_session::SessionMiddleware;
use actix_web::cookie::time::Duration;
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::{ok, LocalBoxFuture, Ready};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use crate::memory_session_store::MemorySessionStore;

pub const SESSION_COOKIE_NAME: &str = "session";
pub const SESSION_LIFETIME_HOURS: i64 = 12;

// Session keys
pub const AUTHENTICATED_USER_ID: &str = "authenticated_user_id";
pub const CSRF_TOKEN: &str = "csrf_token";
pub const FLASH: &str = "flash";
pub const REDIRECT_PATH_AFTER_LOGIN: &str = "redirect_path_after_login";

/// Builds the middleware that loads session state before the handler runs and
/// persists it afterwards when the handler changed it.
pub fn session_middleware(
    store: MemorySessionStore,
    key: Key,
    secure: bool,
) -> SessionMiddleware<MemorySessionStore> {
    SessionMiddleware::builder(store, key)
        .cookie_name(SESSION_COOKIE_NAME.to_owned())
        .cookie_secure(secure)
        .cookie_http_only(true)
        .cookie_same_site(SameSite::Lax)
        // Signed content keeps the cookie value identical for the lifetime of a token,
        // which is what `SessionLock` keys on.
        .cookie_content_security(CookieContentSecurity::Signed)
        .session_lifecycle(
            PersistentSession::default().session_ttl(Duration::hours(SESSION_LIFETIME_HOURS)),
        )
        .build()
}

/// Registry of per-token async locks.
///
/// Entries are weak so a token's lock disappears once no request holds it.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other request holds the lock for `token`.
    pub async fn acquire(&self, token: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            match locks.get(token).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, weak| weak.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(token.to_owned(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of tokens that currently have a live lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Serializes the read-modify-write of one session across concurrent requests.
///
/// Must wrap the session middleware so the lock is held from load until save.
#[derive(Clone)]
pub struct SessionLock {
    locks: SessionLocks,
}

impl SessionLock {
    pub fn new(locks: SessionLocks) -> Self {
        SessionLock { locks }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionLock
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SessionLockService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SessionLockService {
            service: Rc::new(service),
            locks: self.locks.clone(),
        })
    }
}

pub struct SessionLockService<S> {
    service: Rc<S>,
    locks: SessionLocks,
}

impl<S, B> Service<ServiceRequest> for SessionLockService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let token = req
            .cookie(SESSION_COOKIE_NAME)
            .map(|cookie| cookie.value().to_owned());

        // A request without a cookie gets a brand new session nobody else can see.
        let Some(token) = token else {
            return Box::pin(async move { service.call(req).await });
        };

        let locks = self.locks.clone();
        Box::pin(async move {
            let _guard = locks.acquire(&token).await;
            trace!("Acquired session lock");
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn same_token_is_exclusive() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("token-a").await;

        let second = tokio::time::timeout(StdDuration::from_millis(50), locks.acquire("token-a")).await;
        assert!(second.is_err(), "second holder must wait for the first");

        drop(guard);
        let second = tokio::time::timeout(StdDuration::from_millis(50), locks.acquire("token-a")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn different_tokens_do_not_contend() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("token-a").await;

        let b = tokio::time::timeout(StdDuration::from_millis(50), locks.acquire("token-b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_locks_are_forgotten() {
        let locks = SessionLocks::new();
        drop(locks.acquire("token-a").await);

        assert_eq!(locks.active(), 0);
    }
}
