//! Integration tests for the expiring cache used to deduplicate identifier lookups
use std::thread;
use std::time::Duration;

use twitch_credentials::ExpiringCache;

#[test]
fn test_identifier_dedup_window() {
    let cache = ExpiringCache::with_name("user-ids", Duration::from_millis(100), Duration::from_millis(10));

    // The first lookup goes out, repeats inside the window are suppressed
    assert!(cache.insert_if_absent("141981764".to_string()));
    assert!(!cache.insert_if_absent("141981764".to_string()));

    thread::sleep(Duration::from_millis(300));

    // The sweeper has dropped the entry, so the identifier may be looked up again
    assert!(cache.is_empty());
    assert!(cache.insert_if_absent("141981764".to_string()));
}

#[test]
fn test_shared_handles_across_threads() {
    let cache = ExpiringCache::new(Duration::from_secs(30), Duration::from_millis(5));
    let writers: Vec<_> = (0..8u32)
        .map(|n| {
            let cache = cache.clone();
            thread::spawn(move || cache.add(n))
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert!((0..8u32).all(|n| cache.contains(&n)));
    assert!(!cache.contains(&8));
}
