//! Sync coordination
//!
//! The [`SyncCoordinator`] owns one contract's [`UsageStore`] and drives a
//! cycle over hourly, daily and monthly data: due-check, missing-range
//! calculation, fetch, merge and prune, one resolution after the other. A
//! failing resolution is recorded and skipped; the cache is saved at the end
//! of every cycle with whatever did succeed.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{MeterbookError, Result};
use crate::fetcher::ResilientFetcher;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::record::Resolution;
use crate::store::{UsageStore, keys};
use chrono::{DateTime, Days, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

mod report;

pub use report::{ResolutionOutcome, SyncRange, SyncReport, UsageUpdated};

/// Orchestrates sync cycles for one contract
pub struct SyncCoordinator {
    contract_id: String,
    store: UsageStore,
    fetcher: ResilientFetcher,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<UsageUpdated>,
    logger: StructuredLogger,
}

impl SyncCoordinator {
    pub fn new(
        contract_id: &str,
        store: UsageStore,
        fetcher: ResilientFetcher,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _rx) = broadcast::channel::<UsageUpdated>(16);
        Self {
            contract_id: contract_id.to_string(),
            store,
            fetcher,
            config,
            clock,
            events,
            logger: get_logger_with_context(LogContext::new("sync").with_contract(contract_id)),
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    pub fn store(&self) -> &UsageStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut UsageStore {
        &mut self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Receive a [`UsageUpdated`] after every cycle that saved the cache
    pub fn subscribe(&self) -> broadcast::Receiver<UsageUpdated> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Sender<UsageUpdated> {
        self.events.clone()
    }

    /// Whether `resolution` is due for a sync
    pub fn should_sync(&self, resolution: Resolution, force: bool) -> bool {
        let logger = self.logger.for_resolution(resolution);
        if force {
            logger.debug("Sync forced");
            return true;
        }

        let Some(last) = self.store.resolution_last_synced(resolution) else {
            logger.debug("Never synced before");
            return true;
        };

        let interval = self.config.policy(resolution).sync_interval();
        let elapsed = self.clock.now() - last;
        if elapsed >= interval {
            logger.debug(&format!(
                "Due: {}h since last sync, interval {}h",
                elapsed.num_hours(),
                interval.num_hours()
            ));
            true
        } else {
            logger.debug(&format!(
                "Not due: {}h since last sync, interval {}h",
                elapsed.num_hours(),
                interval.num_hours()
            ));
            false
        }
    }

    /// Missing range for `resolution` given what the cache already holds.
    ///
    /// A first sync covers the whole retention window ending today; later
    /// syncs start the day after the newest cached date. Monthly ranges are
    /// whole calendar months and stop before the current month. The start
    /// never reaches further back than the API lookback limit.
    pub fn calculate_sync_range(&self, resolution: Resolution) -> SyncRange {
        let logger = self.logger.for_resolution(resolution);
        let policy = self.config.policy(resolution);
        let today = self.clock.today();
        let cached_to = self.store.range(resolution).map(|(_, to)| to);

        let (from, to, earliest) = match resolution {
            Resolution::Hourly | Resolution::Daily => {
                let from = match cached_to {
                    Some(last) => last.checked_add_days(Days::new(1)).unwrap_or(last),
                    None => today
                        .checked_sub_days(Days::new(u64::from(policy.window.saturating_sub(1))))
                        .unwrap_or(today),
                };
                let earliest = today
                    .checked_sub_days(Days::new(u64::from(policy.max_lookback)))
                    .unwrap_or(today);
                // Days left empty by an earlier fetch are asked for again
                let from = match self.store.gaps(resolution).first() {
                    Some(&gap) if gap < from => {
                        logger.debug(&format!("Resuming from missing day {}", gap));
                        gap
                    }
                    _ => from,
                };
                (from, today, earliest)
            }
            Resolution::Monthly => {
                let current_month = keys::month_start(today);
                let to = current_month.pred_opt().unwrap_or(current_month);
                let from = match cached_to {
                    Some(last) => keys::next_month(last),
                    None => keys::months_back(today, policy.window),
                };
                (from, to, keys::months_back(today, policy.max_lookback))
            }
        };

        let from = if from < earliest {
            logger.warn(&format!(
                "Requested start {} is beyond the API lookback limit, using {}",
                from, earliest
            ));
            earliest
        } else {
            from
        };

        let range = SyncRange { from, to };
        if cached_to.is_none() {
            logger.debug(&format!("First sync range {}", range));
        } else {
            logger.debug(&format!("Incremental sync range {}", range));
        }
        range
    }

    /// Run a cycle, syncing only the resolutions that are due
    pub async fn sync(&mut self) -> Result<SyncReport> {
        self.run_cycle(false).await
    }

    /// Run a cycle that ignores the due-check once
    pub async fn force_sync(&mut self) -> Result<SyncReport> {
        self.run_cycle(true).await
    }

    async fn run_cycle(&mut self, force: bool) -> Result<SyncReport> {
        let started = Instant::now();
        let started_at = self.clock.now();
        self.logger
            .info(&format!("Starting usage sync{}", if force { " (forced)" } else { "" }));

        // A cache that exists but cannot be read must not be replaced
        let cache_loaded = match self.store.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.logger
                    .error(&format!("Usage sync aborted, cache unreadable: {}", e));
                return Err(e);
            }
        };

        let mut outcomes = Vec::with_capacity(Resolution::ALL.len());
        let mut auth_error: Option<MeterbookError> = None;

        for resolution in Resolution::ALL {
            let logger = self.logger.for_resolution(resolution);
            match self.sync_resolution(resolution, force, started_at).await {
                Ok(outcome) => outcomes.push((resolution, outcome)),
                Err(e) if e.is_auth() => {
                    logger.error(&format!(
                        "Authentication failed, stopping this cycle: {}",
                        e
                    ));
                    outcomes.push((resolution, ResolutionOutcome::Failed(e.to_string())));
                    auth_error = Some(e);
                    break;
                }
                Err(e) => {
                    logger.error(&format!("Sync failed, skipping until next cycle: {}", e));
                    outcomes.push((resolution, ResolutionOutcome::Failed(e.to_string())));
                }
            }
        }

        let mut report = SyncReport {
            contract_id: self.contract_id.clone(),
            started_at,
            cache_loaded,
            outcomes,
            saved: false,
        };

        if let Err(e) = self.store.save().await {
            self.logger.error(&format!("Saving usage cache failed: {}", e));
            return Err(e);
        }
        report.saved = true;

        // No subscribers is fine
        let _ = self.events.send(UsageUpdated {
            contract_id: self.contract_id.clone(),
            report: report.clone(),
        });

        self.logger.info(&format!(
            "Usage sync finished in {:.2}s: {} records merged, {} resolutions failed",
            started.elapsed().as_secs_f64(),
            report.merged(),
            report.failures().count()
        ));

        match auth_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn sync_resolution(
        &mut self,
        resolution: Resolution,
        force: bool,
        started_at: DateTime<Utc>,
    ) -> Result<ResolutionOutcome> {
        if !self.should_sync(resolution, force) {
            return Ok(ResolutionOutcome::NotDue);
        }

        let range = self.calculate_sync_range(resolution);
        if range.is_empty() {
            self.logger
                .for_resolution(resolution)
                .debug("Cache is up to date, nothing to fetch");
            return Ok(ResolutionOutcome::UpToDate);
        }

        let records = self
            .fetcher
            .fetch(&self.contract_id, resolution, range.from, range.to)
            .await?;
        let merged = self.store.update(resolution, &records);
        let pruned = self
            .store
            .prune(resolution, self.config.policy(resolution).window)
            .removed();
        if resolution != Resolution::Monthly {
            self.record_gaps(resolution, range);
        }
        // Stamped with the cycle start so a fixed cadence does not drift
        self.store.mark_synced(resolution, started_at);

        self.logger.for_resolution(resolution).info(&format!(
            "Synced {}: fetched {}, merged {}, pruned {}",
            range,
            records.len(),
            merged,
            pruned
        ));

        Ok(ResolutionOutcome::Synced {
            fetched: records.len(),
            merged,
            pruned,
        })
    }

    fn record_gaps(&mut self, resolution: Resolution, range: SyncRange) {
        let from = match self.store.range(resolution) {
            Some((oldest, _)) => range.from.max(oldest),
            None => range.from,
        };
        let missing = self.store.missing_days(resolution, from, range.to);
        if !missing.is_empty() {
            self.logger.for_resolution(resolution).warn(&format!(
                "{} days without data in {}, retrying them next cycle",
                missing.len(),
                range
            ));
        }
        self.store.set_gaps(resolution, missing);
    }
}
