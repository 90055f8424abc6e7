//! Persistent three-resolution usage cache
//!
//! A [`UsageStore`] holds hourly, daily and monthly [`UsageRecord`]s for one
//! contract, keyed by the bucket they describe, together with the metadata
//! the sync coordinator needs: cached ranges, per-resolution sync times and
//! the cumulative baseline that keeps long-running energy counters monotonic
//! when old daily records are pruned.
//!
//! The store knows nothing about the network. Persistence is a single JSON
//! file per contract, replaced atomically on every save.

use crate::clock::Clock;
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::record::{Resolution, UsageRecord};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

mod disk;
mod document;
pub(crate) mod keys;

pub use document::{
    CACHE_VERSION, CacheDocument, CacheMetadata, CumulativeBaseline, EnergySensorMeta,
    ResolutionMeta,
};

/// Single-writer guard for one contract's cache file.
///
/// Created once per contract by whoever owns the contract and cloned into
/// every [`UsageStore`] that touches it, so overlapping saves serialize.
#[derive(Debug, Clone, Default)]
pub struct ContractLock {
    inner: Arc<Mutex<()>>,
}

impl ContractLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.inner.clone().lock_owned().await
    }

    /// Whether two handles guard the same contract
    pub fn same_as(&self, other: &ContractLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Record counts around a prune
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneOutcome {
    pub before: usize,
    pub after: usize,
}

impl PruneOutcome {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Values for an ever-increasing energy counter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CumulativeTotals {
    pub paid: f64,
    pub free: f64,
}

/// File name of a contract's cache
pub fn cache_file_name(contract_id: &str) -> String {
    format!("usage_cache_{}.json", contract_id)
}

/// Usage cache for one contract
pub struct UsageStore {
    contract_id: String,
    path: PathBuf,
    lock: ContractLock,
    clock: Arc<dyn Clock>,
    doc: CacheDocument,
    logger: StructuredLogger,
}

impl std::fmt::Debug for UsageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageStore")
            .field("contract_id", &self.contract_id)
            .field("path", &self.path)
            .field("hourly", &self.doc.hourly.len())
            .field("daily", &self.doc.daily.len())
            .field("monthly", &self.doc.monthly.len())
            .finish()
    }
}

impl UsageStore {
    /// Empty store backed by `<cache_dir>/usage_cache_<contract_id>.json`
    pub fn new(
        contract_id: &str,
        cache_dir: impl AsRef<Path>,
        lock: ContractLock,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let logger = get_logger_with_context(LogContext::new("store").with_contract(contract_id));
        Self {
            contract_id: contract_id.to_string(),
            path: cache_dir.as_ref().join(cache_file_name(contract_id)),
            lock,
            clock,
            doc: CacheDocument::empty(contract_id),
            logger,
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock(&self) -> &ContractLock {
        &self.lock
    }

    /// Read-only view of the in-memory state
    pub fn document(&self) -> &CacheDocument {
        &self.doc
    }

    /// Replace the in-memory state with the persisted one.
    ///
    /// Returns `Ok(false)` when there is no usable cache on disk; the store is
    /// then empty. Corrupted or foreign files are logged and discarded. A file
    /// that exists but cannot be read is an error and leaves the in-memory
    /// state untouched, so a following save cannot replace it with less.
    pub async fn load(&mut self) -> Result<bool> {
        let path = self.path.clone();
        let read = match tokio::task::spawn_blocking(move || disk::read_if_exists(&path)).await? {
            Ok(read) => read,
            Err(e) => {
                self.logger.error(&format!("Cache read failed, keeping current state: {}", e));
                return Err(e);
            }
        };

        let loaded = match read {
            Some(bytes) => match CacheDocument::from_slice(&bytes) {
                Ok(doc) if doc.contract_id == self.contract_id => {
                    self.doc = doc;
                    true
                }
                Ok(doc) => {
                    self.logger.warn(&format!(
                        "Cache file {} belongs to contract {}, starting empty",
                        self.path.display(),
                        doc.contract_id
                    ));
                    self.reset();
                    false
                }
                Err(e) => {
                    self.logger
                        .warn(&format!("Discarding cache {}: {}", self.path.display(), e));
                    self.reset();
                    false
                }
            },
            None => {
                self.logger.info(&format!(
                    "No cache at {}, starting empty",
                    self.path.display()
                ));
                self.reset();
                false
            }
        };

        if self.doc.metadata.energy_sensor.start_date.is_none() {
            let today = self.clock.today();
            self.doc.metadata.energy_sensor.start_date = Some(today);
            self.logger
                .info(&format!("Energy sensor start date initialised to {}", today));
        }

        if loaded {
            self.logger.debug(&format!(
                "Loaded cache: {} hourly, {} daily, {} monthly records",
                self.doc.hourly.len(),
                self.doc.daily.len(),
                self.doc.monthly.len()
            ));
        }
        Ok(loaded)
    }

    /// Recompute metadata and persist the full state atomically
    pub async fn save(&mut self) -> Result<()> {
        let _guard = self.lock.acquire().await;

        let now = self.clock.now();
        self.refresh_metadata();
        if self.doc.metadata.created.is_none() {
            self.doc.metadata.created = Some(now);
        }
        self.doc.metadata.last_synced = Some(now);

        let bytes = self.doc.to_vec()?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || disk::write_atomic(&path, &bytes)).await??;

        self.logger.debug(&format!("Saved cache to {}", self.path.display()));
        Ok(())
    }

    fn reset(&mut self) {
        self.doc = CacheDocument::empty(&self.contract_id);
    }

    fn refresh_metadata(&mut self) {
        self.doc.metadata.version = document::CACHE_VERSION;
        for resolution in Resolution::ALL {
            let range = self.range(resolution);
            let count = self.record_count(resolution);
            let meta = self.doc.metadata.resolution_mut(resolution);
            meta.from = range.map(|(from, _)| keys::format_range_date(resolution, from));
            meta.to = range.map(|(_, to)| keys::format_range_date(resolution, to));
            meta.record_count = count;
        }
    }

    /// Merge records by key, last write wins. Returns how many were merged.
    pub fn update(&mut self, resolution: Resolution, records: &[UsageRecord]) -> usize {
        let logger = self.logger.for_resolution(resolution);
        let mut merged = 0;
        let mut skipped = 0;

        for record in records {
            let Some(key) = record.key(resolution) else {
                skipped += 1;
                continue;
            };
            let mut record = record.clone();
            for issue in record.sanitize(resolution) {
                logger.warn(&format!("Data quality at {}: {}", key, issue));
            }
            self.doc.records_mut(resolution).insert(key, record);
            merged += 1;
        }

        if skipped > 0 {
            logger.warn(&format!("Skipped {} records without a timestamp", skipped));
        }
        merged
    }

    pub fn update_hourly(&mut self, records: &[UsageRecord]) -> usize {
        self.update(Resolution::Hourly, records)
    }

    pub fn update_daily(&mut self, records: &[UsageRecord]) -> usize {
        self.update(Resolution::Daily, records)
    }

    pub fn update_monthly(&mut self, records: &[UsageRecord]) -> usize {
        self.update(Resolution::Monthly, records)
    }

    /// Drop records older than `today - window` (days, or months for monthly).
    ///
    /// Removed daily records are folded into the cumulative baseline first.
    pub fn prune(&mut self, resolution: Resolution, window: u32) -> PruneOutcome {
        let cutoff = keys::retention_cutoff(resolution, self.clock.today(), window);
        let map = self.doc.records_mut(resolution);
        let before = map.len();

        let expired: Vec<String> = map
            .keys()
            .filter(|key| keys::key_date(resolution, key).is_none_or(|date| date < cutoff))
            .cloned()
            .collect();

        let mut folded = CumulativeBaseline::default();
        for key in &expired {
            if let Some(record) = map.remove(key) {
                if resolution == Resolution::Daily {
                    folded.paid_kwh += record.paid_kwh;
                    folded.free_kwh += record.free_kwh;
                }
            }
        }
        let after = map.len();

        if resolution == Resolution::Daily {
            let baseline = &mut self.doc.metadata.cumulative;
            baseline.paid_kwh += folded.paid_kwh;
            baseline.free_kwh += folded.free_kwh;
        }

        if !expired.is_empty() {
            self.logger.for_resolution(resolution).debug(&format!(
                "Pruned {} records older than {}",
                expired.len(),
                cutoff
            ));
        }
        PruneOutcome { before, after }
    }

    pub fn prune_hourly(&mut self, window_days: u32) -> PruneOutcome {
        self.prune(Resolution::Hourly, window_days)
    }

    pub fn prune_daily(&mut self, window_days: u32) -> PruneOutcome {
        self.prune(Resolution::Daily, window_days)
    }

    pub fn prune_monthly(&mut self, window_months: u32) -> PruneOutcome {
        self.prune(Resolution::Monthly, window_months)
    }

    /// Baseline plus cached daily totals from `since` onward.
    ///
    /// Without `since` the energy sensor start date is used; without either,
    /// every cached day counts.
    pub fn get_cumulative_totals(&self, since: Option<NaiveDate>) -> CumulativeTotals {
        let since = since.or(self.doc.metadata.energy_sensor.start_date);
        let baseline = self.doc.metadata.cumulative;

        let (paid, free) = self
            .doc
            .daily
            .iter()
            .filter(|(key, _)| {
                match (since, keys::key_date(Resolution::Daily, key)) {
                    (Some(since), Some(date)) => date >= since,
                    (None, _) => true,
                    (Some(_), None) => false,
                }
            })
            .fold((baseline.paid_kwh, baseline.free_kwh), |(paid, free), (_, r)| {
                (paid + r.paid_kwh, free + r.free_kwh)
            });

        CumulativeTotals {
            paid: round3(paid),
            free: round3(free),
        }
    }

    /// Oldest and newest cached date for a resolution
    pub fn range(&self, resolution: Resolution) -> Option<(NaiveDate, NaiveDate)> {
        let map = self.doc.records(resolution);
        let (first, _) = map.first_key_value()?;
        let (last, _) = map.last_key_value()?;
        Some((
            keys::key_date(resolution, first)?,
            keys::key_date(resolution, last)?,
        ))
    }

    pub fn get_hourly_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.range(Resolution::Hourly)
    }

    pub fn get_daily_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.range(Resolution::Daily)
    }

    /// Monthly range; both ends are the 1st of their month
    pub fn get_monthly_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.range(Resolution::Monthly)
    }

    /// Time of the last successful save
    pub fn get_last_synced(&self) -> Option<DateTime<Utc>> {
        self.doc.metadata.last_synced
    }

    pub fn resolution_last_synced(&self, resolution: Resolution) -> Option<DateTime<Utc>> {
        self.doc.metadata.resolution(resolution).last_synced
    }

    pub fn mark_synced(&mut self, resolution: Resolution, at: DateTime<Utc>) {
        self.doc.metadata.resolution_mut(resolution).last_synced = Some(at);
    }

    /// Days of the last fetched range that came back empty
    pub fn gaps(&self, resolution: Resolution) -> &[NaiveDate] {
        &self.doc.metadata.resolution(resolution).gaps
    }

    pub fn set_gaps(&mut self, resolution: Resolution, mut days: Vec<NaiveDate>) {
        days.sort_unstable();
        days.dedup();
        self.doc.metadata.resolution_mut(resolution).gaps = days;
    }

    /// Days in `[from, to]` without a single cached record
    pub fn missing_days(
        &self,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<NaiveDate> {
        let present: BTreeSet<NaiveDate> = self
            .doc
            .records(resolution)
            .keys()
            .filter_map(|key| keys::key_date(resolution, key))
            .collect();
        from.iter_days()
            .take_while(|day| *day <= to)
            .filter(|day| !present.contains(day))
            .collect()
    }

    pub fn energy_sensor_start_date(&self) -> Option<NaiveDate> {
        self.doc.metadata.energy_sensor.start_date
    }

    pub fn set_energy_sensor_start_date(&mut self, date: NaiveDate) {
        self.doc.metadata.energy_sensor.start_date = Some(date);
    }

    pub fn cumulative_baseline(&self) -> CumulativeBaseline {
        self.doc.metadata.cumulative
    }

    /// Records of a resolution in key order
    pub fn records(&self, resolution: Resolution) -> impl Iterator<Item = (&str, &UsageRecord)> {
        self.doc
            .records(resolution)
            .iter()
            .map(|(key, record)| (key.as_str(), record))
    }

    pub fn get(&self, resolution: Resolution, key: &str) -> Option<&UsageRecord> {
        self.doc.records(resolution).get(key)
    }

    pub fn record_count(&self, resolution: Resolution) -> usize {
        self.doc.records(resolution).len()
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
