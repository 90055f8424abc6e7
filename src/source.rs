//! Upstream usage capability
//!
//! Anything that can answer "usage for this contract between these dates"
//! implements [`UsageSource`]. The HTTP client in [`crate::contact`] is the
//! production implementation; tests script their own.

use crate::error::Result;
use crate::record::{Resolution, UsageRecord};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Query usage history for a contract.
///
/// `from` and `to` are inclusive calendar dates. Failures are classified
/// through [`crate::error::MeterbookError`]: `Auth` when the session is no
/// longer valid, `Api` for semantic rejections, `Network`/`Timeout` for
/// transport problems.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn get_usage(
        &self,
        contract_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<UsageRecord>>;
}

/// Refreshes upstream credentials after an authentication failure
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    async fn reauthenticate(&self) -> Result<()>;
}
