//! Usage records and resolutions
//!
//! A [`UsageRecord`] is one bucket of consumption at hourly, daily or monthly
//! granularity. Energy fields are kWh, `cost` is in currency units rounded to
//! cents. The billed part is split into peak and off-peak (`paid_kwh` is their
//! sum); `free_kwh` is unbilled or promotional energy.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity of cached usage data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Hourly,
    Daily,
    Monthly,
}

impl Resolution {
    /// Sync order: finest first
    pub const ALL: [Resolution; 3] = [Resolution::Hourly, Resolution::Daily, Resolution::Monthly];

    /// Name used in API queries, config keys and the cache file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "hourly" | "hour" => Some(Self::Hourly),
            "daily" | "day" => Some(Self::Daily),
            "monthly" | "month" => Some(Self::Monthly),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation at a given resolution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageRecord {
    /// Start of the bucket, with the offset the upstream reported
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub total_kwh: f64,
    /// Billed energy: `peak_kwh + offpeak_kwh`
    pub paid_kwh: f64,
    pub peak_kwh: f64,
    pub offpeak_kwh: f64,
    /// Unbilled energy
    pub free_kwh: f64,
    pub cost: f64,
}

/// Data-quality finding produced while sanitizing a record
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityIssue {
    /// A negative or non-finite value was replaced with zero
    NegativeClamped { field: &'static str, value: f64 },
    /// `paid_kwh` disagreed with `peak_kwh + offpeak_kwh` and was re-derived
    PaidMismatch { paid: f64, peak_plus_offpeak: f64 },
    /// Billed total without a peak/off-peak split; counted as peak
    PaidWithoutBreakdown { paid: f64 },
    /// An hourly bucket reported both billed and free energy
    PaidAndFreeInSameHour { paid: f64, free: f64 },
    /// Billed plus free energy exceeded the total; billed was trimmed
    ExceedsTotal { paid: f64, free: f64, total: f64 },
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeClamped { field, value } => {
                write!(f, "{} was {} and has been clamped to 0", field, value)
            }
            Self::PaidMismatch {
                paid,
                peak_plus_offpeak,
            } => write!(
                f,
                "paid_kwh {:.3} != peak+offpeak {:.3}; using peak+offpeak",
                paid, peak_plus_offpeak
            ),
            Self::PaidWithoutBreakdown { paid } => {
                write!(f, "paid_kwh {:.3} has no peak/offpeak split; counted as peak", paid)
            }
            Self::PaidAndFreeInSameHour { paid, free } => write!(
                f,
                "hour reports both paid {:.3} kWh and free {:.3} kWh",
                paid, free
            ),
            Self::ExceedsTotal { paid, free, total } => write!(
                f,
                "paid {:.3} + free {:.3} exceeds total {:.3} kWh; paid trimmed",
                paid, free, total
            ),
        }
    }
}

const EPSILON: f64 = 1e-6;

impl UsageRecord {
    /// Build a record from its billed split and free energy; totals are derived
    pub fn from_parts(
        timestamp: DateTime<FixedOffset>,
        peak_kwh: f64,
        offpeak_kwh: f64,
        free_kwh: f64,
        cost: f64,
    ) -> Self {
        let paid_kwh = peak_kwh + offpeak_kwh;
        Self {
            timestamp: Some(timestamp),
            total_kwh: paid_kwh + free_kwh,
            paid_kwh,
            peak_kwh,
            offpeak_kwh,
            free_kwh,
            cost,
        }
    }

    /// Date of the bucket on the wall clock of its own offset
    pub fn local_date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date_naive())
    }

    /// Cache key for this record at `resolution`, or `None` without a timestamp.
    ///
    /// Hourly keys are the full RFC 3339 timestamp, daily keys `YYYY-MM-DD`,
    /// monthly keys `YYYY-MM`.
    pub fn key(&self, resolution: Resolution) -> Option<String> {
        let ts = self.timestamp?;
        Some(match resolution {
            Resolution::Hourly => ts.to_rfc3339_opts(SecondsFormat::Secs, false),
            Resolution::Daily => ts.format("%Y-%m-%d").to_string(),
            Resolution::Monthly => ts.format("%Y-%m").to_string(),
        })
    }

    /// Enforce the record invariants in place and report what had to change.
    ///
    /// Negative values become zero, cost is rounded to cents and `paid_kwh`
    /// is made equal to `peak_kwh + offpeak_kwh`. Billed energy is trimmed so
    /// that billed plus free never exceeds a known total. For hourly buckets billed
    /// and free energy are expected to be exclusive; a violation is reported
    /// but the values are kept.
    pub fn sanitize(&mut self, resolution: Resolution) -> Vec<DataQualityIssue> {
        let mut issues = Vec::new();

        for (field, value) in [
            ("total_kwh", &mut self.total_kwh),
            ("paid_kwh", &mut self.paid_kwh),
            ("peak_kwh", &mut self.peak_kwh),
            ("offpeak_kwh", &mut self.offpeak_kwh),
            ("free_kwh", &mut self.free_kwh),
            ("cost", &mut self.cost),
        ] {
            if !value.is_finite() || *value < 0.0 {
                issues.push(DataQualityIssue::NegativeClamped {
                    field,
                    value: *value,
                });
                *value = 0.0;
            }
        }

        self.cost = (self.cost * 100.0).round() / 100.0;

        let peak_plus_offpeak = self.peak_kwh + self.offpeak_kwh;
        if (self.paid_kwh - peak_plus_offpeak).abs() > EPSILON {
            if peak_plus_offpeak <= EPSILON {
                issues.push(DataQualityIssue::PaidWithoutBreakdown {
                    paid: self.paid_kwh,
                });
                self.peak_kwh = self.paid_kwh;
            } else {
                issues.push(DataQualityIssue::PaidMismatch {
                    paid: self.paid_kwh,
                    peak_plus_offpeak,
                });
                self.paid_kwh = peak_plus_offpeak;
            }
        }

        // Free energy is taken as reported; billed gives way, off-peak first
        if self.total_kwh > EPSILON && self.paid_kwh + self.free_kwh > self.total_kwh + EPSILON {
            issues.push(DataQualityIssue::ExceedsTotal {
                paid: self.paid_kwh,
                free: self.free_kwh,
                total: self.total_kwh,
            });
            let mut excess = self.paid_kwh + self.free_kwh - self.total_kwh;
            let trimmed = excess.min(self.offpeak_kwh);
            self.offpeak_kwh -= trimmed;
            excess -= trimmed;
            self.peak_kwh = (self.peak_kwh - excess).max(0.0);
            self.paid_kwh = self.peak_kwh + self.offpeak_kwh;
        }

        if resolution == Resolution::Hourly
            && self.paid_kwh > EPSILON
            && self.free_kwh > EPSILON
        {
            issues.push(DataQualityIssue::PaidAndFreeInSameHour {
                paid: self.paid_kwh,
                free: self.free_kwh,
            });
        }

        issues
    }
}
