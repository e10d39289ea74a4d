//! The starvation check on a compressed timeline: same shape as the classic demo, 10x faster.

use std::time::Duration;

use stamped_lock::{
    demo::{run_starvation_check, DemoConfig},
    DemoError, StampedLock,
};

fn fast_config() -> DemoConfig {
    DemoConfig {
        readers: 10,
        reader_spawn_interval_ms: 50,
        reader_hold_ms: 100,
        writer_delay_ms: 180,
        writer_hold_ms: 100,
        threshold_ms: 200,
        pessimistic: false,
    }
}

#[test]
fn optimistic_readers_do_not_starve_the_writer() {
    let lock = StampedLock::new();
    let waited = run_starvation_check(&lock, &fast_config()).unwrap();
    assert!(waited < Duration::from_millis(100));
    assert!(!lock.is_read_locked());
    assert!(!lock.is_write_locked());
    assert_eq!(lock.version(), 1);
}

#[test]
fn pessimistic_readers_only_delay_the_writer_by_the_ones_before_it() {
    let lock = StampedLock::new();
    let config = DemoConfig {
        pessimistic: true,
        ..fast_config()
    };
    // readers 2 and 3 hold at 180ms, the last of them leaves at 250ms;
    // a reader-preferring lock would keep the writer out until ~550ms
    let waited = run_starvation_check(&lock, &config).unwrap();
    assert!(waited < Duration::from_millis(200), "waited {waited:?}");
    assert!(!lock.has_queued_waiters());
}

#[test]
fn writer_wait_does_not_grow_with_later_readers() {
    let short = DemoConfig {
        pessimistic: true,
        readers: 5,
        ..fast_config()
    };
    let long = DemoConfig {
        readers: 15,
        ..short.clone()
    };
    let a = run_starvation_check(&StampedLock::new(), &short).unwrap();
    let b = run_starvation_check(&StampedLock::new(), &long).unwrap();
    // ten more readers after the writer cost it nothing, give or take scheduling noise
    assert!(b < a + Duration::from_millis(50), "{a:?} vs {b:?}");
}

#[test]
fn exceeding_the_threshold_is_reported() {
    let config = DemoConfig {
        pessimistic: true,
        threshold_ms: 0,
        ..fast_config()
    };
    match run_starvation_check(&StampedLock::new(), &config) {
        Err(DemoError::Starvation { waited, threshold }) => {
            assert!(waited > threshold);
            assert_eq!(threshold, Duration::ZERO);
        }
        other => panic!("expected starvation, got {other:?}"),
    }
}
