//! # Meterbook - incremental electricity usage cache
//!
//! Polls the Contact Energy customer API for hourly, daily and monthly
//! electricity usage and keeps a bounded local cache per contract, so that a
//! host application can show usage history without downloading it again on
//! every refresh.
//!
//! ## Features
//!
//! - **Three resolutions**: hourly, daily and monthly series, each with its
//!   own retention window, sync cadence and API lookback limit
//! - **Incremental sync**: only the dates missing from the cache are fetched
//! - **Monotonic counters**: pruned daily totals move into a cumulative
//!   baseline instead of disappearing
//! - **Atomic persistence**: one JSON file per contract, replaced by rename
//! - **Resilient fetches**: bounded retries with linear backoff, and hourly
//!   requests split per day when the full span keeps failing
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `clock`: Current time and local calendar date
//! - `record`: Usage records and resolutions
//! - `store`: The per-contract cache and its file format
//! - `source`: The upstream usage capability
//! - `contact`: Contact Energy HTTP client
//! - `fetcher`: Retry and split logic around a source
//! - `sync`: Per-cycle orchestration
//! - `service`: Periodic background task
//! - `report`: Text and Markdown renderings

pub mod clock;
pub mod config;
#[cfg(feature = "contact")]
pub mod contact;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod record;
pub mod report;
pub mod service;
pub mod source;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{MeterbookError, Result};
pub use fetcher::{ResilientFetcher, RetryPolicy};
pub use record::{Resolution, UsageRecord};
pub use service::{SyncHandle, SyncService};
pub use source::UsageSource;
pub use store::{ContractLock, UsageStore};
pub use sync::{ResolutionOutcome, SyncCoordinator, SyncReport};
