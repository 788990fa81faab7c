use crate::auth::{User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

pub const DAILY_LIMIT_REACHED: &str = "Daily request limit reached";

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaDecision {
    /// `remaining` counts requests left today after this one; `None` for unlimited users
    Allowed { remaining: Option<u32> },
    Denied { reason: String },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }
}

/// Today's usage for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub limit: u32,
    pub used: u64,
    pub remaining: u32,
    pub unlimited: bool,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Append-only log of accepted chat requests
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait RequestLogRepository: Send + Sync {
    /// Number of requests logged for the user at or after `since`
    async fn count_since(&self, user_id: UserId, since: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn record(&self, user_id: UserId, at: DateTime<Utc>) -> anyhow::Result<()>;
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait QuotaServiceTrait: Send + Sync {
    /// Decide whether the user may start another request today
    async fn authorize(&self, user: &User) -> Result<QuotaDecision, QuotaError>;

    /// Count one accepted request against the user
    async fn record(&self, user_id: UserId) -> Result<(), QuotaError>;

    async fn status(&self, user: &User) -> Result<QuotaStatus, QuotaError>;
}
