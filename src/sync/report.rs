use crate::record::Resolution;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Inclusive date range to download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl SyncRange {
    /// Nothing left to download
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// Number of calendar days covered
    pub fn days(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            (self.to - self.from).num_days() + 1
        }
    }
}

impl fmt::Display for SyncRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// What happened to one resolution during a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// Synced recently enough
    NotDue,
    /// Due, but the cache already reaches the newest available date
    UpToDate,
    Synced {
        fetched: usize,
        merged: usize,
        pruned: usize,
    },
    /// Skipped for this cycle
    Failed(String),
}

impl ResolutionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Summary of one sync cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub contract_id: String,
    pub started_at: DateTime<Utc>,
    /// Whether a cache file existed and was readable at the start
    pub cache_loaded: bool,
    pub outcomes: Vec<(Resolution, ResolutionOutcome)>,
    /// Whether the cache was written at the end of the cycle
    pub saved: bool,
}

impl SyncReport {
    pub fn outcome(&self, resolution: Resolution) -> Option<&ResolutionOutcome> {
        self.outcomes
            .iter()
            .find(|(r, _)| *r == resolution)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (Resolution, &str)> {
        self.outcomes.iter().filter_map(|(r, outcome)| match outcome {
            ResolutionOutcome::Failed(reason) => Some((*r, reason.as_str())),
            _ => None,
        })
    }

    /// Records merged across all resolutions
    pub fn merged(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                ResolutionOutcome::Synced { merged, .. } => *merged,
                _ => 0,
            })
            .sum()
    }
}

/// Published after a cycle saved the cache
#[derive(Debug, Clone)]
pub struct UsageUpdated {
    pub contract_id: String,
    pub report: SyncReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_emptiness() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let range = SyncRange {
            from: d("2025-01-11"),
            to: d("2025-01-15"),
        };
        assert!(!range.is_empty());
        assert_eq!(range.days(), 5);

        let current = SyncRange {
            from: d("2025-01-16"),
            to: d("2025-01-15"),
        };
        assert!(current.is_empty());
        assert_eq!(current.days(), 0);
    }
}
