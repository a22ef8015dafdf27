//! Activity store: the narrow key/value view of the scaling group's tags

use anyhow::Result;
use chrono::{DateTime, Utc};
use rdscli_common::ActivityKey;
use rdscli_common::tags::parse_timestamp;

/// Snapshot of the three activity timestamps.
///
/// A `None` field means the key was never observed (or held a malformed
/// value), not "zero".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityRecord {
    pub last_activity: Option<DateTime<Utc>>,
    pub last_request: Option<DateTime<Utc>>,
    pub first_cleanup: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    /// Build a record from raw tag key/value pairs, ignoring unrelated tags
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut record = Self::default();
        for (key, value) in tags {
            if let Some(key) = ActivityKey::from_tag_key(key) {
                record.set(key, parse_timestamp(value));
            }
        }
        record
    }

    pub fn get(&self, key: ActivityKey) -> Option<DateTime<Utc>> {
        match key {
            ActivityKey::LastActivity => self.last_activity,
            ActivityKey::LastRequest => self.last_request,
            ActivityKey::FirstCleanup => self.first_cleanup,
        }
    }

    pub fn set(&mut self, key: ActivityKey, value: Option<DateTime<Utc>>) {
        match key {
            ActivityKey::LastActivity => self.last_activity = value,
            ActivityKey::LastRequest => self.last_request = value,
            ActivityKey::FirstCleanup => self.first_cleanup = value,
        }
    }

    /// Most recent of the present timestamps
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        ActivityKey::ALL.into_iter().filter_map(|k| self.get(k)).max()
    }

    /// Keys that currently hold a value
    pub fn present_keys(&self) -> Vec<ActivityKey> {
        ActivityKey::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_some())
            .collect()
    }
}

/// Key/value access to the activity record.
///
/// Each key is written independently; there is no multi-key atomicity and
/// concurrent writers follow last-write-wins.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
pub trait ActivityStore: Send + Sync {
    /// Read one key; missing or malformed values are `None`
    async fn get(&self, key: ActivityKey) -> Result<Option<DateTime<Utc>>>;

    /// Write one key
    async fn set(&self, key: ActivityKey, value: DateTime<Utc>) -> Result<()>;

    /// Remove one key (only used to re-arm `FirstCleanup`)
    async fn clear(&self, key: ActivityKey) -> Result<()>;

    /// Read the whole record
    async fn record(&self) -> Result<ActivityRecord> {
        let mut record = ActivityRecord::default();
        for key in ActivityKey::ALL {
            record.set(key, self.get(key).await?);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_from_tags_ignores_unrelated_and_malformed() {
        let record = ActivityRecord::from_tags([
            ("Name", "bastion"),
            ("LastActivity", "2024-05-01 10:00:00"),
            ("LastRequest", "yesterday"),
        ]);
        assert_eq!(record.last_activity, Some(at(10, 0, 0)));
        assert_eq!(record.last_request, None);
        assert_eq!(record.first_cleanup, None);
    }

    #[test]
    fn test_latest_picks_max_present() {
        let record = ActivityRecord {
            last_activity: Some(at(9, 0, 0)),
            last_request: Some(at(11, 30, 0)),
            first_cleanup: Some(at(10, 0, 0)),
        };
        assert_eq!(record.latest(), Some(at(11, 30, 0)));
        assert_eq!(ActivityRecord::default().latest(), None);
    }

    #[test]
    fn test_present_keys() {
        let record = ActivityRecord {
            last_request: Some(at(1, 0, 0)),
            ..Default::default()
        };
        assert_eq!(record.present_keys(), vec![ActivityKey::LastRequest]);
    }
}
