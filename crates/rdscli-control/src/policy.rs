//! Idle policy: decides whether the bastion should be scaled to zero

use crate::capacity::CapacityControl;
use crate::store::{ActivityRecord, ActivityStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rdscli_common::defaults::DEFAULT_IDLE_THRESHOLD_SECS;
use rdscli_common::{ActivityKey, Outcome};
use std::time::Duration;
use tracing::info;

/// Result of an idle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the current capacity
    NoOp,
    /// Set desired capacity to zero
    ScaleToZero,
}

/// Pure evaluation of an activity record at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    /// Seconds since the most recent known timestamp, if any was present
    pub idle_seconds: Option<i64>,
    /// `FirstCleanup` is absent and must be stamped with `now`
    pub stamp_first_cleanup: bool,
}

/// Idle threshold policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    threshold: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_IDLE_THRESHOLD_SECS))
    }
}

impl IdlePolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Decide without side effects.
    ///
    /// The reference point is the latest of the timestamps present *before*
    /// any `FirstCleanup` stamp. With no timestamps at all the group is brand
    /// new and is never cleaned up blind. The idle time is the full signed
    /// difference, so gaps spanning several days count completely and a
    /// reference in the future (clock skew) reads as not idle.
    pub fn evaluate(&self, record: &ActivityRecord, now: DateTime<Utc>) -> Evaluation {
        let stamp_first_cleanup = record.first_cleanup.is_none();

        let Some(reference) = record.latest() else {
            return Evaluation {
                decision: Decision::NoOp,
                idle_seconds: None,
                stamp_first_cleanup,
            };
        };

        let idle_seconds = (now - reference).num_seconds();
        let threshold = i64::try_from(self.threshold.as_secs()).unwrap_or(i64::MAX);
        let decision = if idle_seconds < threshold {
            Decision::NoOp
        } else {
            Decision::ScaleToZero
        };

        Evaluation {
            decision,
            idle_seconds: Some(idle_seconds),
            stamp_first_cleanup,
        }
    }

    /// Run an idle check against the store and apply its decision
    pub async fn run<S, C>(&self, store: &S, capacity: &C, now: DateTime<Utc>) -> Result<Outcome>
    where
        S: ActivityStore,
        C: CapacityControl,
    {
        let record = store
            .record()
            .await
            .context("Failed to read activity record")?;

        info!(
            last_activity = ?record.last_activity,
            last_request = ?record.last_request,
            first_cleanup = ?record.first_cleanup,
            "Activity check"
        );

        let evaluation = self.evaluate(&record, now);

        if evaluation.stamp_first_cleanup {
            store
                .set(ActivityKey::FirstCleanup, now)
                .await
                .context("Failed to stamp FirstCleanup")?;
        }

        let Some(idle_seconds) = evaluation.idle_seconds else {
            info!("No activity recorded yet, skipping cleanup");
            return Ok(Outcome::Kept { idle_seconds: None });
        };

        info!(
            idle_seconds,
            threshold_secs = self.threshold.as_secs(),
            "Inactivity estimate"
        );

        match evaluation.decision {
            Decision::NoOp => Ok(Outcome::Kept {
                idle_seconds: Some(idle_seconds),
            }),
            Decision::ScaleToZero => {
                info!(idle_seconds, "Inactive for too long, scaling to zero");
                capacity
                    .set_desired_capacity(0)
                    .await
                    .context("Failed to scale group to zero")?;
                Ok(Outcome::ScaledToZero { idle_seconds })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::MockCapacityControl;
    use crate::memory::MemoryStore;
    use chrono::{TimeDelta, TimeZone};
    use mockall::predicate::eq;

    const THRESHOLD: Duration = Duration::from_secs(600);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn ago(secs: i64) -> Option<DateTime<Utc>> {
        Some(now() - TimeDelta::seconds(secs))
    }

    #[test]
    fn test_default_threshold_is_ten_minutes() {
        assert_eq!(IdlePolicy::default().threshold(), THRESHOLD);
    }

    #[test]
    fn test_empty_record_is_noop_and_stamps() {
        let eval = IdlePolicy::new(THRESHOLD).evaluate(&ActivityRecord::default(), now());
        assert_eq!(eval.decision, Decision::NoOp);
        assert_eq!(eval.idle_seconds, None);
        assert!(eval.stamp_first_cleanup);
    }

    #[test]
    fn test_threshold_boundary() {
        let policy = IdlePolicy::new(THRESHOLD);
        let record = |secs| ActivityRecord {
            last_activity: ago(secs),
            first_cleanup: ago(100_000),
            ..Default::default()
        };

        assert_eq!(policy.evaluate(&record(500), now()).decision, Decision::NoOp);
        assert_eq!(policy.evaluate(&record(599), now()).decision, Decision::NoOp);
        assert_eq!(
            policy.evaluate(&record(600), now()).decision,
            Decision::ScaleToZero
        );
        assert_eq!(
            policy.evaluate(&record(700), now()).decision,
            Decision::ScaleToZero
        );
    }

    #[test]
    fn test_latest_timestamp_wins() {
        let policy = IdlePolicy::new(THRESHOLD);
        let record = ActivityRecord {
            last_activity: ago(5000),
            last_request: ago(60),
            first_cleanup: ago(9000),
        };
        let eval = policy.evaluate(&record, now());
        assert_eq!(eval.decision, Decision::NoOp);
        assert_eq!(eval.idle_seconds, Some(60));
        assert!(!eval.stamp_first_cleanup);
    }

    #[test]
    fn test_multi_day_gap_counts_fully() {
        // Two days plus one minute: a same-day seconds delta would read 60s.
        let record = ActivityRecord {
            last_activity: ago(2 * 86_400 + 60),
            first_cleanup: ago(3 * 86_400),
            ..Default::default()
        };
        let eval = IdlePolicy::new(THRESHOLD).evaluate(&record, now());
        assert_eq!(eval.idle_seconds, Some(2 * 86_400 + 60));
        assert_eq!(eval.decision, Decision::ScaleToZero);
    }

    #[test]
    fn test_future_reference_is_not_idle() {
        let record = ActivityRecord {
            last_request: Some(now() + TimeDelta::seconds(30)),
            ..Default::default()
        };
        let eval = IdlePolicy::new(THRESHOLD).evaluate(&record, now());
        assert_eq!(eval.decision, Decision::NoOp);
        assert_eq!(eval.idle_seconds, Some(-30));
    }

    #[test]
    fn test_only_first_cleanup_present() {
        let record = ActivityRecord {
            first_cleanup: ago(601),
            ..Default::default()
        };
        let eval = IdlePolicy::new(THRESHOLD).evaluate(&record, now());
        assert_eq!(eval.decision, Decision::ScaleToZero);
        assert!(!eval.stamp_first_cleanup);
    }

    #[tokio::test]
    async fn test_run_scales_to_zero_after_700s() {
        let store = MemoryStore::with_record(ActivityRecord {
            last_activity: ago(700),
            ..Default::default()
        });
        let mut capacity = MockCapacityControl::new();
        capacity
            .expect_set_desired_capacity()
            .with(eq(0))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = IdlePolicy::new(THRESHOLD)
            .run(&store, &capacity, now())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::ScaledToZero { idle_seconds: 700 });
        // FirstCleanup was absent, so it is stamped even though the decision
        // was taken on LastActivity.
        assert_eq!(store.snapshot().first_cleanup, Some(now()));
    }

    #[tokio::test]
    async fn test_run_keeps_after_500s() {
        let store = MemoryStore::with_record(ActivityRecord {
            last_activity: ago(500),
            ..Default::default()
        });
        let mut capacity = MockCapacityControl::new();
        capacity.expect_set_desired_capacity().never();

        let outcome = IdlePolicy::new(THRESHOLD)
            .run(&store, &capacity, now())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Kept {
                idle_seconds: Some(500)
            }
        );
    }

    #[tokio::test]
    async fn test_run_on_empty_record_only_stamps() {
        let store = MemoryStore::new();
        let mut capacity = MockCapacityControl::new();
        capacity.expect_set_desired_capacity().never();

        let outcome = IdlePolicy::new(THRESHOLD)
            .run(&store, &capacity, now())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Kept { idle_seconds: None });
        let record = store.snapshot();
        assert_eq!(record.first_cleanup, Some(now()));
        assert_eq!(record.last_activity, None);
        assert_eq!(record.last_request, None);
    }

    #[tokio::test]
    async fn test_run_never_overwrites_first_cleanup() {
        let anchor = ago(120);
        let store = MemoryStore::with_record(ActivityRecord {
            first_cleanup: anchor,
            ..Default::default()
        });
        let mut capacity = MockCapacityControl::new();
        capacity.expect_set_desired_capacity().never();

        IdlePolicy::new(THRESHOLD)
            .run(&store, &capacity, now())
            .await
            .unwrap();

        assert_eq!(store.snapshot().first_cleanup, anchor);
    }

    #[tokio::test]
    async fn test_run_propagates_capacity_failure() {
        let store = MemoryStore::with_record(ActivityRecord {
            last_request: ago(3600),
            ..Default::default()
        });
        let mut capacity = MockCapacityControl::new();
        capacity
            .expect_set_desired_capacity()
            .returning(|_| Err(anyhow::anyhow!("throttled")));

        let err = IdlePolicy::new(THRESHOLD)
            .run(&store, &capacity, now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("scale group to zero"));
    }
}
