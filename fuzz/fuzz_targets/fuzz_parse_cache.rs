#![no_main]
use libfuzzer_sys::fuzz_target;
use meterbook::store::CacheDocument;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = CacheDocument::from_slice(data) else {
        return;
    };
    // A document that parsed must serialize, and read back the same records
    let Ok(bytes) = doc.to_vec() else {
        panic!("parsed cache failed to serialize");
    };
    if let Ok(again) = CacheDocument::from_slice(&bytes) {
        assert_eq!(again.contract_id, doc.contract_id);
        assert_eq!(again.hourly.len(), doc.hourly.len());
        assert_eq!(again.daily.len(), doc.daily.len());
        assert_eq!(again.monthly.len(), doc.monthly.len());
    }
});
