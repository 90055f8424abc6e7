//! Wire types of the Contact Energy API

use crate::record::UsageRecord;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Numbers arrive either as JSON numbers or as decimal strings ("0.00")
fn flexible_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Identifiers arrive either as strings or as numbers
fn flexible_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub bp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountsResponse {
    #[serde(rename = "accountsSummary", default)]
    pub accounts_summary: Vec<AccountSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountSummary {
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub contracts: Vec<ContractSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractSummary {
    #[serde(rename = "contractId", default, deserialize_with = "flexible_id")]
    pub contract_id: Option<String>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub icp: Option<String>,
}

impl ContractSummary {
    /// `contractId`, falling back to `id`
    pub fn identifier(&self) -> Option<&str> {
        self.contract_id.as_deref().or(self.id.as_deref())
    }
}

/// Account and contract picked from the accounts summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRef {
    pub account_id: String,
    pub contract_id: String,
    pub nickname: Option<String>,
    pub icp: Option<String>,
}

impl AccountsResponse {
    /// First account that lists at least one identifiable contract
    pub fn first_contract(&self) -> Option<ContractRef> {
        self.accounts_summary.iter().find_map(|account| {
            let account_id = account.id.clone()?;
            let contract = account.contracts.iter().find(|c| c.identifier().is_some())?;
            Some(ContractRef {
                account_id,
                contract_id: contract.identifier()?.to_string(),
                nickname: account.nickname.clone(),
                icp: contract.icp.clone(),
            })
        })
    }
}

/// One point of the usage endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiUsagePoint {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub value: f64,
    #[serde(rename = "offpeakValue", default, deserialize_with = "flexible_f64")]
    pub offpeak_value: f64,
    #[serde(rename = "unchargedValue", default, deserialize_with = "flexible_f64")]
    pub uncharged_value: f64,
    #[serde(rename = "dollarValue", default, deserialize_with = "flexible_f64")]
    pub dollar_value: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// The usage endpoint answers with a bare list or `{"usage": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UsageResponse {
    List(Vec<ApiUsagePoint>),
    Wrapped {
        #[serde(default)]
        usage: Vec<ApiUsagePoint>,
    },
}

impl UsageResponse {
    pub fn into_points(self) -> Vec<ApiUsagePoint> {
        match self {
            Self::List(points) | Self::Wrapped { usage: points } => points,
        }
    }
}

/// Parse an upstream timestamp; bare dates are midnight in `tz`
pub(crate) fn parse_point_date(raw: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts);
    }
    let date = NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|ts| ts.fixed_offset())
}

impl ApiUsagePoint {
    /// Map onto a [`UsageRecord`].
    ///
    /// `value` is the total, `offpeakValue` the billed off-peak part and
    /// `unchargedValue` the free part; peak is what remains. The result is
    /// not sanitized here: a negative remainder is left for the store to
    /// clamp and report. An unparseable date yields a record without a
    /// timestamp.
    pub fn to_record(&self, tz: Tz) -> UsageRecord {
        let peak_kwh = self.value - self.offpeak_value - self.uncharged_value;
        UsageRecord {
            timestamp: self.date.as_deref().and_then(|d| parse_point_date(d, tz)),
            total_kwh: self.value,
            paid_kwh: peak_kwh + self.offpeak_value,
            peak_kwh,
            offpeak_kwh: self.offpeak_value,
            free_kwh: self.uncharged_value,
            cost: self.dollar_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_points_accept_strings_and_numbers() {
        let body = r#"[{"date":"2025-01-10T21:00:00.000+13:00","value":"1.50","offpeakValue":"0.00","unchargedValue":0.5,"dollarValue":"0.32"}]"#;
        let points = serde_json::from_str::<UsageResponse>(body).unwrap().into_points();
        assert_eq!(points.len(), 1);

        let record = points[0].to_record(chrono_tz::Pacific::Auckland);
        assert!((record.total_kwh - 1.5).abs() < 1e-9);
        assert!((record.free_kwh - 0.5).abs() < 1e-9);
        assert!((record.peak_kwh - 1.0).abs() < 1e-9);
        assert!((record.paid_kwh - 1.0).abs() < 1e-9);
        assert!((record.cost - 0.32).abs() < 1e-9);
        assert_eq!(
            record.key(crate::record::Resolution::Hourly).as_deref(),
            Some("2025-01-10T21:00:00+13:00")
        );
    }

    #[test]
    fn wrapped_usage_and_bare_dates() {
        let body = r#"{"usage":[{"date":"2025-01-10","value":12.0}],"currency":"NZD"}"#;
        let points = serde_json::from_str::<UsageResponse>(body).unwrap().into_points();
        let record = points[0].to_record(chrono_tz::Pacific::Auckland);
        assert_eq!(
            record.timestamp.map(|ts| ts.to_rfc3339()),
            Some("2025-01-10T00:00:00+13:00".to_string())
        );

        let empty = serde_json::from_str::<UsageResponse>("{}").unwrap().into_points();
        assert!(empty.is_empty());
    }

    #[test]
    fn first_contract_prefers_contract_id() {
        let body = r#"{"accountsSummary":[
            {"id":"A1","nickname":"Empty","contracts":[]},
            {"id":502,"nickname":"Home","contracts":[{"id":"x","contractId":"C9","icp":"0001"}]}
        ]}"#;
        let accounts: AccountsResponse = serde_json::from_str(body).unwrap();
        let picked = accounts.first_contract().unwrap();
        assert_eq!(picked.account_id, "502");
        assert_eq!(picked.contract_id, "C9");
        assert_eq!(picked.icp.as_deref(), Some("0001"));
    }
}
