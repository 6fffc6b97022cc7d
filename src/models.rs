// SPDX-License-Identifier: Apache-2.0
//! Snippet and user collaborators.
//!
//! The request pipeline only depends on the [`SnippetModel`] and [`UserModel`] traits.
//! The in-memory implementations here back the binary and the tests.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tokio::task;

/// How many snippets [`SnippetModel::latest`] returns.
pub const LATEST_LIMIT: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("no matching record found")]
    NoRecord,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
}

#[async_trait]
pub trait SnippetModel: Send + Sync {
    /// Stores a snippet that expires `expires` days from now and returns its id.
    async fn insert(&self, title: &str, content: &str, expires: i64) -> Result<i64, ModelError>;
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;
    /// The most recently created unexpired snippets, newest first.
    async fn latest(&self) -> Result<Vec<Snippet>, ModelError>;
}

#[async_trait]
pub trait UserModel: Send + Sync {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError>;
    /// Returns the user id when the email and password match.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;
    async fn exists(&self, id: i64) -> Result<bool, ModelError>;
    async fn get(&self, id: i64) -> Result<User, ModelError>;
    async fn password_update(&self, id: i64, current: &str, new: &str) -> Result<(), ModelError>;
}

#[derive(Debug, Default)]
pub struct MemorySnippetModel {
    snippets: RwLock<Vec<Snippet>>,
}

impl MemorySnippetModel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnippetModel for MemorySnippetModel {
    async fn insert(&self, title: &str, content: &str, expires: i64) -> Result<i64, ModelError> {
        let mut snippets = self.snippets.write().unwrap_or_else(PoisonError::into_inner);
        let created = Utc::now();
        let id = snippets.len() as i64 + 1;
        snippets.push(Snippet {
            id,
            title: title.to_owned(),
            content: content.to_owned(),
            created,
            expires: created + Duration::days(expires),
        });
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        let now = Utc::now();
        self.snippets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.id == id && s.expires > now)
            .cloned()
            .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let now = Utc::now();
        Ok(self
            .snippets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .filter(|s| s.expires > now)
            .take(LATEST_LIMIT)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    hashed_password: String,
}

/// Users keyed by id, with emails unique and passwords stored as Argon2id hashes.
pub struct MemoryUserModel {
    users: RwLock<HashMap<i64, UserRecord>>,
    hasher: Argon2<'static>,
}

impl MemoryUserModel {
    pub fn new() -> Self {
        Self::with_hasher(Argon2::default())
    }

    /// Uses the given hashing parameters, e.g. cheaper ones in tests.
    pub fn with_hasher(hasher: Argon2<'static>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            hasher,
        }
    }

    /// Argon2 is CPU bound; it runs on the blocking pool so the worker keeps serving.
    async fn hash(&self, password: &str) -> Result<String, ModelError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| ModelError::Hash(e.to_string()))
        })
        .await
        .map_err(|e| ModelError::Hash(e.to_string()))?
    }

    async fn verify(&self, password: &str, hash: String) -> Result<bool, ModelError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&hash) else {
                return false;
            };
            hasher.verify_password(password.as_bytes(), &parsed).is_ok()
        })
        .await
        .map_err(|e| ModelError::Hash(e.to_string()))
    }
}

impl Default for MemoryUserModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserModel for MemoryUserModel {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError> {
        let hashed_password = self.hash(password).await?;

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.values().any(|r| r.user.email.eq_ignore_ascii_case(email)) {
            return Err(ModelError::DuplicateEmail);
        }

        let id = users.keys().max().copied().unwrap_or(0) + 1;
        users.insert(
            id,
            UserRecord {
                user: User {
                    id,
                    name: name.to_owned(),
                    email: email.to_owned(),
                    created: Utc::now(),
                },
                hashed_password,
            },
        );
        Ok(id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let record = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|r| r.user.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(ModelError::InvalidCredentials)?;

        if self.verify(password, record.hashed_password).await? {
            Ok(record.user.id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id))
    }

    async fn get(&self, id: i64) -> Result<User, ModelError> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|r| r.user.clone())
            .ok_or(ModelError::NoRecord)
    }

    async fn password_update(&self, id: i64, current: &str, new: &str) -> Result<(), ModelError> {
        let stored = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|r| r.hashed_password.clone())
            .ok_or(ModelError::NoRecord)?;

        if !self.verify(current, stored).await? {
            return Err(ModelError::InvalidCredentials);
        }

        let hashed_password = self.hash(new).await?;
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let record = users.get_mut(&id).ok_or(ModelError::NoRecord)?;
        record.hashed_password = hashed_password;
        Ok(())
    }
}
