//! On-disk layout of a contract's usage cache
//!
//! ```json
//! {
//!   "contract_id": "1234567",
//!   "metadata": {
//!     "version": 1,
//!     "created": "...", "last_synced": "...",
//!     "cumulative": { "paid_kwh": 0.0, "free_kwh": 0.0 },
//!     "energy_sensor": { "start_date": "2025-01-15" },
//!     "hourly":  { "from": "...", "to": "...", "record_count": 0, "last_synced": "..." },
//!     "daily":   { ... },
//!     "monthly": { ... }
//!   },
//!   "hourly":  { "<rfc3339>": { record } },
//!   "daily":   { "YYYY-MM-DD": { record } },
//!   "monthly": { "YYYY-MM": { record } }
//! }
//! ```

use super::keys::key_date;
use crate::error::{MeterbookError, Result};
use crate::record::{Resolution, UsageRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current cache layout version
pub const CACHE_VERSION: u32 = 1;

fn default_version() -> u32 {
    CACHE_VERSION
}

/// Baseline absorbing daily totals removed by pruning
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CumulativeBaseline {
    pub paid_kwh: f64,
    pub free_kwh: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergySensorMeta {
    /// First date counted toward the external cumulative counter
    pub start_date: Option<NaiveDate>,
}

/// Range and bookkeeping for one resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionMeta {
    pub from: Option<String>,
    pub to: Option<String>,
    pub record_count: usize,
    /// Start of the last cycle that completed a fetch
    pub last_synced: Option<DateTime<Utc>>,
    /// Days of the last fetched range that came back empty, oldest first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cumulative: CumulativeBaseline,
    #[serde(default)]
    pub energy_sensor: EnergySensorMeta,
    #[serde(default)]
    pub hourly: ResolutionMeta,
    #[serde(default)]
    pub daily: ResolutionMeta,
    #[serde(default)]
    pub monthly: ResolutionMeta,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            created: None,
            last_synced: None,
            cumulative: CumulativeBaseline::default(),
            energy_sensor: EnergySensorMeta::default(),
            hourly: ResolutionMeta::default(),
            daily: ResolutionMeta::default(),
            monthly: ResolutionMeta::default(),
        }
    }
}

impl CacheMetadata {
    pub fn resolution(&self, resolution: Resolution) -> &ResolutionMeta {
        match resolution {
            Resolution::Hourly => &self.hourly,
            Resolution::Daily => &self.daily,
            Resolution::Monthly => &self.monthly,
        }
    }

    pub fn resolution_mut(&mut self, resolution: Resolution) -> &mut ResolutionMeta {
        match resolution {
            Resolution::Hourly => &mut self.hourly,
            Resolution::Daily => &mut self.daily,
            Resolution::Monthly => &mut self.monthly,
        }
    }
}

/// Complete persisted state of one contract's cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    pub contract_id: String,
    pub metadata: CacheMetadata,
    #[serde(default)]
    pub hourly: BTreeMap<String, UsageRecord>,
    #[serde(default)]
    pub daily: BTreeMap<String, UsageRecord>,
    #[serde(default)]
    pub monthly: BTreeMap<String, UsageRecord>,
}

impl CacheDocument {
    /// Empty document for a contract
    pub fn empty(contract_id: &str) -> Self {
        Self {
            contract_id: contract_id.to_string(),
            metadata: CacheMetadata::default(),
            hourly: BTreeMap::new(),
            daily: BTreeMap::new(),
            monthly: BTreeMap::new(),
        }
    }

    /// Parse and validate a persisted cache.
    ///
    /// Anything that does not look like a cache written by this crate is
    /// reported as [`MeterbookError::CacheCorruption`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let doc: CacheDocument = serde_json::from_slice(bytes)
            .map_err(|e| MeterbookError::cache_corruption(format!("unparsable cache: {}", e)))?;

        if doc.contract_id.trim().is_empty() {
            return Err(MeterbookError::cache_corruption("missing contract_id"));
        }
        if doc.metadata.version > CACHE_VERSION {
            return Err(MeterbookError::cache_corruption(format!(
                "unsupported cache version {}",
                doc.metadata.version
            )));
        }
        for resolution in Resolution::ALL {
            if let Some(bad) = doc
                .records(resolution)
                .keys()
                .find(|key| key_date(resolution, key).is_none())
            {
                return Err(MeterbookError::cache_corruption(format!(
                    "invalid {} key '{}'",
                    resolution, bad
                )));
            }
        }

        Ok(doc)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn records(&self, resolution: Resolution) -> &BTreeMap<String, UsageRecord> {
        match resolution {
            Resolution::Hourly => &self.hourly,
            Resolution::Daily => &self.daily,
            Resolution::Monthly => &self.monthly,
        }
    }

    pub fn records_mut(&mut self, resolution: Resolution) -> &mut BTreeMap<String, UsageRecord> {
        match resolution {
            Resolution::Hourly => &mut self.hourly,
            Resolution::Daily => &mut self.daily,
            Resolution::Monthly => &mut self.monthly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_parses_with_defaults() {
        let doc = CacheDocument::from_slice(br#"{"contract_id":"42","metadata":{}}"#).unwrap();
        assert_eq!(doc.contract_id, "42");
        assert_eq!(doc.metadata.version, CACHE_VERSION);
        assert!(doc.daily.is_empty());
        assert_eq!(doc.metadata.cumulative, CumulativeBaseline::default());
    }

    #[test]
    fn structural_mismatches_are_corruption() {
        let cases: [&[u8]; 5] = [
            b"",
            b"{\"contract_id\":\"42\"",
            br#"{"contract_id":"","metadata":{}}"#,
            br#"{"contract_id":"42","metadata":"none","daily":{}}"#,
            br#"{"contract_id":"42","metadata":{},"daily":{"yesterday":{}}}"#,
        ];
        for case in cases {
            let err = CacheDocument::from_slice(case).unwrap_err();
            assert!(
                matches!(err, MeterbookError::CacheCorruption { .. }),
                "expected corruption for {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn newer_version_is_rejected() {
        let err = CacheDocument::from_slice(br#"{"contract_id":"42","metadata":{"version":99}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported cache version"));
    }
}
