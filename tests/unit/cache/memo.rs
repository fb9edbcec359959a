use std::sync::{
    Barrier,
    atomic::{AtomicUsize, Ordering as AtomicOrdering},
};

use super::*;
use crate::{cache::key::KeyBuilder, foundation::error::AnimError, render::frame::FrameRGBA};

fn key(name: &str) -> CacheKey {
    KeyBuilder::new("test").str(name).key()
}

fn temp_dir(name: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("{name}_{}_{}", std::process::id(), nanos))
}

#[test]
fn sequential_requests_compute_once() {
    let cache = MemoCache::<u32>::new("t");
    let calls = AtomicUsize::new(0);
    for _ in 0..3 {
        let v = cache
            .get_or_compute(&key("a"), || {
                calls.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(7)
            })
            .unwrap();
        assert_eq!(v, 7);
    }
    assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(cache.compute_count(), 1);
    assert_eq!(cache.hit_count(), 2);
}

#[test]
fn concurrent_requests_for_one_key_compute_once() {
    let cache = MemoCache::<u64>::new("t");
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(8);
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                let v = cache
                    .get_or_compute(&key("shared"), || {
                        calls.fetch_add(1, AtomicOrdering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Ok(42)
                    })
                    .unwrap();
                assert_eq!(v, 42);
            });
        }
    });
    assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
}

#[test]
fn distinct_keys_compute_independently() {
    let cache = MemoCache::<String>::new("t");
    let a = cache.get_or_compute(&key("a"), || Ok("a".to_string())).unwrap();
    let b = cache.get_or_compute(&key("b"), || Ok("b".to_string())).unwrap();
    assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
    assert_eq!(cache.compute_count(), 2);
}

#[test]
fn errors_are_not_cached() {
    let cache = MemoCache::<u32>::new("t");
    let err = cache
        .get_or_compute(&key("a"), || Err(AnimError::render("boom")))
        .unwrap_err();
    assert!(matches!(err, AnimError::Render(_)));
    let v = cache.get_or_compute(&key("a"), || Ok(1)).unwrap();
    assert_eq!(v, 1);
    assert_eq!(cache.compute_count(), 2);
}

#[test]
fn clear_forces_recompute() {
    let cache = MemoCache::<u32>::new("t");
    cache.get_or_compute(&key("a"), || Ok(1)).unwrap();
    cache.clear();
    let v = cache.get_or_compute(&key("a"), || Ok(2)).unwrap();
    assert_eq!(v, 2);
}

#[test]
fn without_retention_recomputes() {
    let cache = MemoCache::<u32>::new("t").without_retention();
    cache.get_or_compute(&key("a"), || Ok(1)).unwrap();
    cache.get_or_compute(&key("a"), || Ok(1)).unwrap();
    assert_eq!(cache.compute_count(), 2);
}

#[test]
fn persisted_entries_survive_a_new_cache() {
    let dir = temp_dir("memo_persist");
    let disk = Arc::new(DiskStore::open(&dir).unwrap());
    let inputs = KeyBuilder::new("inputs").u64(1).finish();
    let frame = FrameRGBA::filled(2, 2, crate::foundation::core::Rgba8::rgb(10, 20, 30));

    let first = MemoCache::<FrameRGBA>::new("frames").with_disk(disk.clone());
    first
        .get_or_compute_persisted(&key("f"), inputs, || Ok(frame.clone()))
        .unwrap();

    let second = MemoCache::<FrameRGBA>::new("frames").with_disk(disk.clone());
    let calls = AtomicUsize::new(0);
    let got = second
        .get_or_compute_persisted(&key("f"), inputs, || {
            calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(FrameRGBA::transparent(1, 1))
        })
        .unwrap();
    assert_eq!(got, frame);
    assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);

    // changed inputs: the stale entry is discarded and recomputed
    let third = MemoCache::<FrameRGBA>::new("frames").with_disk(disk);
    let other_inputs = KeyBuilder::new("inputs").u64(2).finish();
    let got = third
        .get_or_compute_persisted(&key("f"), other_inputs, || Ok(FrameRGBA::transparent(1, 1)))
        .unwrap();
    assert_eq!((got.width, got.height), (1, 1));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn corrupted_payload_is_recomputed_not_surfaced() {
    let dir = temp_dir("memo_corrupt");
    let disk = Arc::new(DiskStore::open(&dir).unwrap());
    let inputs = KeyBuilder::new("inputs").finish();
    let k = key("c");

    let cache = MemoCache::<FrameRGBA>::new("frames").with_disk(disk.clone());
    cache
        .get_or_compute_persisted(&k, inputs, || Ok(FrameRGBA::transparent(3, 3)))
        .unwrap();
    std::fs::write(dir.join(format!("{}.bin", k.file_stem())), b"garbage").unwrap();

    let fresh = MemoCache::<FrameRGBA>::new("frames").with_disk(disk);
    let got = fresh
        .get_or_compute_persisted(&k, inputs, || Ok(FrameRGBA::transparent(4, 4)))
        .unwrap();
    assert_eq!(got.width, 4);

    let _ = std::fs::remove_dir_all(&dir);
}
