use millrace::core::cache::{Cache, MemoryCache};
use std::net::IpAddr;
use std::time::Duration;

#[test]
fn test_set_and_get() {
    let cache = MemoryCache::<String, u64>::new();
    assert_eq!(cache.get(&"a".to_string()), None);

    cache.set("a".to_string(), 1, None);
    assert_eq!(cache.get(&"a".to_string()), Some(1));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_entries_expire_after_ttl() {
    let cache = MemoryCache::<IpAddr, ()>::new();
    let ip = IpAddr::from([1, 1, 1, 1]);
    cache.set(ip, (), Some(Duration::from_millis(50)));
    assert!(cache.get(&ip).is_some());

    std::thread::sleep(Duration::from_millis(80));
    assert!(cache.get(&ip).is_none());
}

#[test]
fn test_entries_without_ttl_never_expire() {
    let cache = MemoryCache::<String, u64>::new();
    cache.set("forever".to_string(), 7, None);
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(cache.get(&"forever".to_string()), Some(7));
    assert_eq!(cache.purge_expired(), 0);
}

#[test]
fn test_purge_expired_sweeps_only_dead_entries() {
    let cache = MemoryCache::<String, u64>::new();
    cache.set("short".to_string(), 1, Some(Duration::from_millis(30)));
    cache.set("long".to_string(), 2, Some(Duration::from_secs(60)));
    cache.set("eternal".to_string(), 3, None);

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&"long".to_string()), Some(2));
}

#[test]
fn test_set_overwrites_value_and_ttl() {
    let cache = MemoryCache::<String, u64>::new();
    cache.set("k".to_string(), 1, Some(Duration::from_millis(30)));
    cache.set("k".to_string(), 2, None);

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(cache.get(&"k".to_string()), Some(2));
}
