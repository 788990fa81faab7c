pub mod ports;

use crate::auth::{User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
pub use ports::*;
use std::sync::Arc;

/// Start of the UTC day containing `now`
pub fn start_of_day_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::default()).and_utc()
}

/// Daily request counter per user.
///
/// The check is a plain read followed later by an insert, so concurrent
/// bursts may over-admit slightly but a single check never denies early.
pub struct QuotaService {
    request_log: Arc<dyn RequestLogRepository>,
    daily_limit: u32,
}

impl QuotaService {
    pub fn new(request_log: Arc<dyn RequestLogRepository>, daily_limit: u32) -> Self {
        Self {
            request_log,
            daily_limit,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    async fn used_today(&self, user_id: UserId, now: DateTime<Utc>) -> Result<u64, QuotaError> {
        self.request_log
            .count_since(user_id, start_of_day_utc(now))
            .await
            .map_err(|e| QuotaError::InternalError(format!("Failed to count requests: {e}")))
    }

    pub async fn authorize_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaError> {
        if user.is_admin {
            return Ok(QuotaDecision::Allowed { remaining: None });
        }

        let used = self.used_today(user.id, now).await?;
        let limit = u64::from(self.daily_limit);

        if used >= limit {
            tracing::info!(user_id = %user.id, used, limit, "Daily request quota exhausted");
            return Ok(QuotaDecision::Denied {
                reason: DAILY_LIMIT_REACHED.to_string(),
            });
        }

        let remaining = (limit - used - 1) as u32;
        tracing::debug!(user_id = %user.id, used, remaining, "Request allowed by quota");
        Ok(QuotaDecision::Allowed {
            remaining: Some(remaining),
        })
    }

    pub async fn record_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), QuotaError> {
        self.request_log
            .record(user_id, now)
            .await
            .map_err(|e| QuotaError::InternalError(format!("Failed to record request: {e}")))
    }

    pub async fn status_at(&self, user: &User, now: DateTime<Utc>) -> Result<QuotaStatus, QuotaError> {
        let used = self.used_today(user.id, now).await?;
        let remaining = if user.is_admin {
            self.daily_limit
        } else {
            u64::from(self.daily_limit).saturating_sub(used) as u32
        };

        Ok(QuotaStatus {
            limit: self.daily_limit,
            used,
            remaining,
            unlimited: user.is_admin,
            resets_at: start_of_day_utc(now) + Duration::days(1),
        })
    }
}

#[async_trait]
impl QuotaServiceTrait for QuotaService {
    async fn authorize(&self, user: &User) -> Result<QuotaDecision, QuotaError> {
        self.authorize_at(user, Utc::now()).await
    }

    async fn record(&self, user_id: UserId) -> Result<(), QuotaError> {
        self.record_at(user_id, Utc::now()).await
    }

    async fn status(&self, user: &User) -> Result<QuotaStatus, QuotaError> {
        self.status_at(user, Utc::now()).await
    }
}
