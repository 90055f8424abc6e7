#![no_main]
use libfuzzer_sys::fuzz_target;
use meterbook::Resolution;
use meterbook::contact::UsageResponse;

fuzz_target!(|data: &[u8]| {
    let Ok(response) = serde_json::from_slice::<UsageResponse>(data) else {
        return;
    };
    for point in response.into_points() {
        let mut record = point.to_record(chrono_tz::Pacific::Auckland);
        for resolution in Resolution::ALL {
            let _ = record.sanitize(resolution);
            assert!(record.paid_kwh >= 0.0 && record.free_kwh >= 0.0);
            let _ = record.key(resolution);
        }
    }
});
