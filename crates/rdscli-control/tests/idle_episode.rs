//! End-to-end idle episodes against the in-memory backends
//!
//! Drives the controller through the sequence of events the reporter,
//! the cleanup schedule and the client produce over a bastion's lifetime.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rdscli_common::{ControlEvent, Outcome};
use rdscli_control::{Controller, IdlePolicy, MemoryCapacity, MemoryStore};
use std::time::Duration;

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + TimeDelta::minutes(minutes)
}

fn controller() -> Controller<MemoryStore, MemoryCapacity> {
    Controller::new(
        MemoryStore::new(),
        MemoryCapacity::new(0),
        IdlePolicy::new(Duration::from_secs(600)),
    )
}

#[tokio::test]
async fn test_full_episode_scales_down_after_sessions_end() {
    let c = controller();

    // Fresh stack: cleanup runs before anyone asked for the instance.
    let outcome = c.handle(&ControlEvent::cleanup(), t(0)).await.unwrap();
    assert_eq!(outcome, Outcome::Kept { idle_seconds: None });

    // Client activates at 30 minutes: a new episode starts.
    let outcome = c.handle(&ControlEvent::activate(), t(30)).await.unwrap();
    assert_eq!(outcome, Outcome::Activated { rearmed: true });
    assert_eq!(c.capacity().desired(), 1);

    // Sessions are open for a while.
    for minute in [31, 36, 41] {
        let outcome = c
            .handle(&ControlEvent::report(2), t(minute))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::ActivityRecorded);
    }

    // Sessions closed; reports with zero sessions run the idle check.
    let outcome = c.handle(&ControlEvent::report(0), t(46)).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Kept {
            idle_seconds: Some(300)
        }
    );
    assert_eq!(c.capacity().desired(), 1);

    // That check also anchored the idle episode at 46 minutes, which is
    // now the latest timestamp.
    assert_eq!(c.store().snapshot().first_cleanup, Some(t(46)));
    let outcome = c.handle(&ControlEvent::cleanup(), t(51)).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Kept {
            idle_seconds: Some(300)
        }
    );

    let outcome = c.handle(&ControlEvent::cleanup(), t(56)).await.unwrap();
    assert_eq!(outcome, Outcome::ScaledToZero { idle_seconds: 600 });
    assert_eq!(c.capacity().desired(), 0);

    // Repeated cleanups are level-triggered and converge on zero.
    let outcome = c.handle(&ControlEvent::cleanup(), t(61)).await.unwrap();
    assert!(matches!(outcome, Outcome::ScaledToZero { .. }));
    assert_eq!(c.capacity().desired(), 0);
    assert!(c.capacity().history().iter().skip(1).all(|v| *v == 0));
}

#[tokio::test]
async fn test_second_episode_gets_fresh_anchor() {
    let c = controller();

    c.handle(&ControlEvent::activate(), t(0)).await.unwrap();
    c.handle(&ControlEvent::cleanup(), t(5)).await.unwrap();
    assert_eq!(c.store().snapshot().first_cleanup, Some(t(5)));

    c.handle(&ControlEvent::cleanup(), t(15)).await.unwrap();
    assert_eq!(c.capacity().desired(), 0);

    // Next day: activating from zero clears the old anchor...
    c.handle(&ControlEvent::activate(), t(24 * 60)).await.unwrap();
    assert_eq!(c.store().snapshot().first_cleanup, None);

    // ...and the first idle check of the new episode sets a new one.
    c.handle(&ControlEvent::cleanup(), t(24 * 60 + 2)).await.unwrap();
    assert_eq!(c.store().snapshot().first_cleanup, Some(t(24 * 60 + 2)));
    assert_eq!(c.capacity().desired(), 1);
}

#[tokio::test]
async fn test_duplicate_events_converge() {
    let a = controller();
    let b = controller();

    let events = [
        ControlEvent::activate(),
        ControlEvent::report(1),
        ControlEvent::cleanup(),
    ];

    for event in &events {
        a.handle(event, t(10)).await.unwrap();
    }
    for event in &events {
        b.handle(event, t(10)).await.unwrap();
        b.handle(event, t(10)).await.unwrap();
    }

    assert_eq!(a.store().snapshot(), b.store().snapshot());
    assert_eq!(a.capacity().desired(), b.capacity().desired());
}
