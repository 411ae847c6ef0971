use lada_telemetry::{metrics, new_request_ids, record_duplicate_skipped, record_rows_dumped};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_duplicate_skipped();
    record_rows_dumped(250);
    let after = metrics().snapshot();
    assert!(after.duplicates_skipped >= before.duplicates_skipped + 1);
    assert!(after.rows_dumped >= before.rows_dumped + 250);
}
