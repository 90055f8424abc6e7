//! Text renderings of cached usage

use crate::record::{Resolution, UsageRecord};
use crate::store::UsageStore;
use chrono::NaiveDate;
use std::fmt::Write;

/// Markdown table of hourly records between `from` and `to`
pub fn render_hourly_markdown<'a, I>(records: I, from: NaiveDate, to: NaiveDate) -> String
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    let mut rows: Vec<&UsageRecord> = records
        .into_iter()
        .filter(|r| r.local_date().is_some_and(|d| d >= from && d <= to))
        .collect();
    rows.sort_by_key(|r| r.timestamp);

    let mut out = String::new();
    let _ = writeln!(out, "# Hourly Usage\n");
    let _ = writeln!(out, "Range: {} to {}\n", from, to);
    let _ = writeln!(out, "Total records: {}\n", rows.len());
    let _ = writeln!(out, "| Timestamp | Paid kWh | Free kWh | Total kWh |");
    let _ = writeln!(out, "|---|---:|---:|---:|");
    for record in rows {
        let ts = record
            .key(Resolution::Hourly)
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "| {} | {:.3} | {:.3} | {:.3} |",
            ts, record.paid_kwh, record.free_kwh, record.total_kwh
        );
    }
    out
}

/// Human-readable summary of a store
pub fn render_status(store: &UsageStore) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Contract: {}", store.contract_id());
    let _ = writeln!(out, "Cache file: {}", store.path().display());
    let _ = writeln!(
        out,
        "Last saved: {}",
        store
            .get_last_synced()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );

    for resolution in Resolution::ALL {
        let range = match store.range(resolution) {
            Some((from, to)) if resolution == Resolution::Monthly => {
                format!("{} to {}", from.format("%Y-%m"), to.format("%Y-%m"))
            }
            Some((from, to)) => format!("{} to {}", from, to),
            None => "empty".to_string(),
        };
        let synced = store
            .resolution_last_synced(resolution)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            out,
            "{:<8} {:>5} records, {}, last synced {}",
            resolution.as_str(),
            store.record_count(resolution),
            range,
            synced
        );
    }

    let totals = store.get_cumulative_totals(None);
    let _ = writeln!(
        out,
        "Cumulative since {}: paid {:.3} kWh, free {:.3} kWh",
        store
            .energy_sensor_start_date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "start".to_string()),
        totals.paid,
        totals.free
    );
    out
}
