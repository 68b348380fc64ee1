//! Tests for the injectable clock

use chrono::{Duration, TimeZone, Utc};
use core_kernel::{Clock, ManualClock};
use std::sync::Arc;

#[test]
fn test_manual_clock_set() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let target = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
    clock.set(target);
    assert_eq!(clock.now(), target);
}

#[test]
fn test_manual_clock_shared_behind_trait_object() {
    let manual = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    let as_clock: Arc<dyn Clock> = manual.clone();
    manual.advance(Duration::minutes(5));
    assert_eq!(
        as_clock.now(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
    );
}
