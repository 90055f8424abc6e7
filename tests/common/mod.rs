#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};
use meterbook::config::SyncConfig;
use meterbook::error::Result;
use meterbook::{
    Clock, ContractLock, FixedClock, Resolution, ResilientFetcher, RetryPolicy, SyncCoordinator,
    UsageRecord, UsageSource, UsageStore,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const CONTRACT: &str = "1234567";

/// One recorded `get_usage` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub resolution: Resolution,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

type Behavior = dyn Fn(&Call) -> Result<Vec<UsageRecord>> + Send + Sync;

/// In-memory upstream that records calls and answers through a closure
pub struct ScriptedSource {
    calls: Mutex<Vec<Call>>,
    behavior: Box<Behavior>,
}

impl ScriptedSource {
    pub fn new(
        behavior: impl Fn(&Call) -> Result<Vec<UsageRecord>> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            behavior: Box::new(behavior),
        })
    }

    /// Answers every request with generated data
    pub fn healthy() -> Arc<Self> {
        Self::new(|call| Ok(generate(call.resolution, call.from, call.to)))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, resolution: Resolution) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.resolution == resolution)
            .collect()
    }
}

#[async_trait]
impl UsageSource for ScriptedSource {
    async fn get_usage(
        &self,
        _contract_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<UsageRecord>> {
        let call = Call {
            resolution,
            from,
            to,
        };
        self.calls.lock().unwrap().push(call);
        (self.behavior)(&call)
    }
}

pub fn offset() -> FixedOffset {
    FixedOffset::east_opt(13 * 3600).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn local_midnight(day: NaiveDate) -> DateTime<FixedOffset> {
    offset()
        .from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
        .unwrap()
}

pub fn daily_record(day: &str, paid: f64, free: f64) -> UsageRecord {
    UsageRecord::from_parts(local_midnight(date(day)), paid, 0.0, free, paid * 0.3)
}

/// Plausible upstream data for every bucket in `[from, to]`
pub fn generate(resolution: Resolution, from: NaiveDate, to: NaiveDate) -> Vec<UsageRecord> {
    let mut out = Vec::new();
    let mut day = from;
    while day <= to {
        match resolution {
            Resolution::Hourly => {
                for hour in 0..24u32 {
                    let ts = local_midnight(day) + chrono::Duration::hours(i64::from(hour));
                    // Free hours between 21:00 and midnight
                    let record = if hour >= 21 {
                        UsageRecord::from_parts(ts, 0.0, 0.0, 0.8, 0.0)
                    } else {
                        UsageRecord::from_parts(ts, 0.4, 0.1, 0.0, 0.15)
                    };
                    out.push(record);
                }
            }
            Resolution::Daily => {
                out.push(UsageRecord::from_parts(local_midnight(day), 8.0, 2.0, 2.4, 3.1));
            }
            Resolution::Monthly => {
                if day.format("%d").to_string() == "01" {
                    out.push(UsageRecord::from_parts(local_midnight(day), 240.0, 60.0, 72.0, 93.0));
                }
            }
        }
        day = day.checked_add_days(Days::new(1)).unwrap();
    }
    out
}

/// Clock at 13:00 on `day` in Auckland
pub fn clock_on(day: &str) -> Arc<FixedClock> {
    let d = date(day);
    let now = Utc
        .from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap());
    Arc::new(FixedClock::new(now, chrono_tz::Pacific::Auckland))
}

pub fn store(dir: &Path, clock: Arc<FixedClock>) -> UsageStore {
    UsageStore::new(CONTRACT, dir, ContractLock::new(), clock)
}

pub fn coordinator(
    source: Arc<ScriptedSource>,
    dir: &Path,
    clock: Arc<FixedClock>,
) -> SyncCoordinator {
    let fetcher = ResilientFetcher::new(source, RetryPolicy::immediate(3));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    SyncCoordinator::new(
        CONTRACT,
        store(dir, clock),
        fetcher,
        SyncConfig::default(),
        dyn_clock,
    )
}
