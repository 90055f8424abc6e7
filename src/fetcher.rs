//! Resilient usage fetches
//!
//! [`ResilientFetcher`] wraps a [`UsageSource`] with a bounded retry loop and,
//! for hourly data, falls back to one request per day when the full span
//! keeps failing. Authentication failures are never retried here: the caller
//! has to log in again first.

use crate::config::RetryConfig;
use crate::error::{MeterbookError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::record::{Resolution, UsageRecord};
use crate::source::UsageSource;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Attempts per request and the linear backoff unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy without delays between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Retrying front for a [`UsageSource`]
pub struct ResilientFetcher {
    source: Arc<dyn UsageSource>,
    policy: RetryPolicy,
    logger: StructuredLogger,
}

impl ResilientFetcher {
    pub fn new(source: Arc<dyn UsageSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            logger: get_logger("fetcher"),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch `[from, to]` at `resolution`.
    ///
    /// Hourly spans longer than a day that exhaust their retries are fetched
    /// again one day at a time; days that still fail are skipped. If every
    /// day fails the last error is returned.
    pub async fn fetch(
        &self,
        contract_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<UsageRecord>> {
        let err = match self.fetch_with_retry(contract_id, resolution, from, to).await {
            Ok(records) => return Ok(records),
            Err(e) => e,
        };

        if err.is_auth() || !err.is_retryable() || resolution != Resolution::Hourly || from >= to {
            return Err(err);
        }

        self.logger.for_resolution(resolution).warn(&format!(
            "Fetching {} to {} failed after {} attempts ({}), splitting into daily requests",
            from, to, self.policy.max_attempts, err
        ));
        self.fetch_split(contract_id, resolution, from, to).await
    }

    async fn fetch_split(
        &self,
        contract_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<UsageRecord>> {
        let logger = self.logger.for_resolution(resolution);
        let mut records = Vec::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut last_error: Option<MeterbookError> = None;

        let mut day = from;
        while day <= to {
            match self.fetch_with_retry(contract_id, resolution, day, day).await {
                Ok(mut chunk) => {
                    succeeded += 1;
                    records.append(&mut chunk);
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    failed += 1;
                    logger.warn(&format!("Skipping {}: {}", day, e));
                    last_error = Some(e);
                }
            }
            day = match day.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => {
                if failed > 0 {
                    logger.warn(&format!(
                        "Split fetch finished with {} of {} days missing",
                        failed,
                        succeeded + failed
                    ));
                }
                Ok(records)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        contract_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<UsageRecord>> {
        let logger = self.logger.for_resolution(resolution);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.source.get_usage(contract_id, resolution, from, to).await {
                Ok(records) => return Ok(records),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(e);
                    }
                    let delay = self.policy.delay_after(attempt);
                    logger.warn(&format!(
                        "Attempt {}/{} for {} to {} failed: {}; retrying in {:?}",
                        attempt, self.policy.max_attempts, from, to, e, delay
                    ));
                    sleep(delay).await;
                }
            }
        }
    }
}
