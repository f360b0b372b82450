//! Integration test: observers attached through `Vector::observe`.
//!
//! Run: cargo test -p remapvec --test vector_observe_test

use std::sync::Arc;

use remapvec::core::AllocatorLogLevel;
use remapvec::{AllocStats, Backend, GrowthPolicy, LifecycleLog, Vector};

#[test]
fn heap_only_vector_never_maps_pages() {
    let log = Arc::new(LifecycleLog::new());
    {
        let mut v: Vector<u32> =
            Vector::with_policy(GrowthPolicy::default().with_backend(Backend::HeapOnly));
        v.observe(log.clone());
        for i in 0..100_000 {
            v.push(i);
        }
        assert!(!v.is_big_region());
    }
    let records = log.drain();
    assert!(!records.is_empty());
    assert!(
        records
            .iter()
            .all(|r| r.symbol != "mmap" && r.symbol != "mremap")
    );
    let last = records.last().expect("dealloc record");
    assert_eq!(last.event, "dealloc");
    assert_eq!(last.live_regions, 0);
    assert!(log.is_empty());
}

#[test]
fn records_serialize_as_json_lines() {
    let log = Arc::new(LifecycleLog::new());
    let mut v: Vector<u8> = Vector::with_policy(GrowthPolicy::default());
    v.observe(log.clone());
    v.extend_from_copy_slice(&[7; 300]);
    drop(v);

    let lines: Vec<String> = log
        .records()
        .iter()
        .map(|r| serde_json::to_string(r).expect("serialize record"))
        .collect();
    let attach: serde_json::Value = serde_json::from_str(&lines[0]).expect("parse record");
    assert_eq!(attach["event"], "attach");
    assert_eq!(attach["bytes"], 1);
    let alloc: serde_json::Value = serde_json::from_str(&lines[1]).expect("parse record");
    assert_eq!(alloc["event"], "alloc");
    assert_eq!(alloc["decision_id"], 2);
    assert!(
        alloc["trace_id"]
            .as_str()
            .is_some_and(|t| t.starts_with("core::remapvec::heap::"))
    );
    for (i, line) in lines.iter().enumerate() {
        let value: serde_json::Value = serde_json::from_str(line).expect("parse record");
        assert_eq!(value["decision_id"], i as u64 + 1, "ids are dense without filtering");
    }
}

#[cfg(target_os = "linux")]
#[test]
fn info_level_log_reports_the_small_to_big_transition() {
    let log = Arc::new(LifecycleLog::with_min_level(AllocatorLogLevel::Info));
    let stats = Arc::new(AllocStats::new());
    let mut v: Vector<u32> = Vector::with_policy(GrowthPolicy::default());
    v.observe(log.clone());
    for i in 0..10_000 {
        v.push(i);
    }
    // A second observer replaces the first.
    v.observe(stats.clone());
    v.reserve(1 << 20);

    let records = log.drain();
    assert!(
        records
            .iter()
            .all(|r| r.level >= AllocatorLogLevel::Info)
    );
    let transition = records
        .iter()
        .find(|r| r.details.starts_with("small->big"))
        .expect("small->big transition");
    assert_eq!(transition.event, "transition");
    assert_eq!(transition.outcome, "relocate");

    let snap = stats.snapshot();
    assert_eq!(snap.small_to_big, 0, "already big when stats attached");
    let json = serde_json::to_value(snap).expect("serialize snapshot");
    assert!(json.get("remaps_in_place").is_some());
}
