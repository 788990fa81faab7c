//! In-memory implementations of the service ports, for tests and local runs
//! without PostgreSQL or a search subscription.

use crate::auth::{SessionRepository, SessionToken, User, UserId, UserRepository};
use crate::quota::RequestLogRepository;
use crate::tools::{WebSearchError, WebSearchParams, WebSearchProviderTrait, WebSearchResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        lock(&self.users).insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(lock(&self.users).get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, UserId>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, user_id: UserId) {
        lock(&self.sessions).insert(token.into(), user_id);
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get_user_id_by_token(&self, token: &SessionToken) -> anyhow::Result<Option<UserId>> {
        Ok(lock(&self.sessions).get(&token.0).copied())
    }
}

#[derive(Default)]
pub struct InMemoryRequestLogRepository {
    entries: Mutex<Vec<(UserId, DateTime<Utc>)>>,
}

impl InMemoryRequestLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded request for the user, oldest first
    pub fn entries_for(&self, user_id: UserId) -> Vec<DateTime<Utc>> {
        lock(&self.entries)
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl RequestLogRepository for InMemoryRequestLogRepository {
    async fn count_since(&self, user_id: UserId, since: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(lock(&self.entries)
            .iter()
            .filter(|(id, at)| *id == user_id && *at >= since)
            .count() as u64)
    }

    async fn record(&self, user_id: UserId, at: DateTime<Utc>) -> anyhow::Result<()> {
        lock(&self.entries).push((user_id, at));
        Ok(())
    }
}

/// `n` distinct search hits
pub fn search_hits(n: usize) -> Vec<WebSearchResult> {
    (1..=n)
        .map(|i| WebSearchResult {
            title: format!("Result {i}"),
            url: format!("https://example.com/{i}"),
            snippet: format!("Snippet for result {i}"),
        })
        .collect()
}

/// Search provider answering every query with the same results or the same failure
pub struct StaticSearchProvider {
    results: Vec<WebSearchResult>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<WebSearchParams>>,
}

impl StaticSearchProvider {
    pub fn new(results: Vec<WebSearchResult>) -> Self {
        Self {
            results,
            failure: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.failure = Some(message.into());
        provider
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<WebSearchParams> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl WebSearchProviderTrait for StaticSearchProvider {
    async fn search(
        &self,
        params: WebSearchParams,
    ) -> Result<Vec<WebSearchResult>, WebSearchError> {
        lock(&self.calls).push(params);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(WebSearchError::WebSearchRequestFailed(message.clone())),
            None => Ok(self.results.clone()),
        }
    }
}
