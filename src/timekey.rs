use crate::models::{BucketKey, Granularity};
use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike, Utc,
};

/// Time zone used to render bucket labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Local,
    Fixed(FixedOffset),
}

impl Zone {
    pub fn utc() -> Self {
        Zone::Fixed(Utc.fix())
    }

    pub fn localize(&self, ts: &DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Local => ts.with_timezone(&Local).naive_local(),
            Zone::Fixed(offset) => ts.with_timezone(offset).naive_local(),
        }
    }

    /// Reads a wall-clock instant in this zone. Gaps yield `None`, folds pick the earlier instant.
    pub fn from_wall_clock(&self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Zone::Local => earliest(Local.from_local_datetime(naive)),
            Zone::Fixed(offset) => earliest(offset.from_local_datetime(naive)),
        }
    }
}

fn earliest<Tz: TimeZone>(result: LocalResult<DateTime<Tz>>) -> Option<DateTime<Utc>> {
    result.earliest().map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub key: BucketKey,
    pub label: String,
    pub ordinal: i64,
}

/// Maps a click instant to its bucket under `granularity`.
///
/// Minute buckets carry no date: `9:05` on two different days is one bucket,
/// and the ordinal is minutes since local midnight. Hour and day ordinals are
/// the local wall-clock window start in epoch seconds, so they order the same
/// way the keys read.
pub fn derive_key(ts: &DateTime<Utc>, granularity: Granularity, zone: &Zone) -> DerivedKey {
    let local = zone.localize(ts);
    let (hour, minute) = (local.hour(), local.minute());
    let date = local.date();

    match granularity {
        Granularity::Minute => {
            let label = format!("{hour}:{minute:02}");
            DerivedKey {
                key: BucketKey(label.clone()),
                label,
                ordinal: i64::from(hour * 60 + minute),
            }
        }
        Granularity::Hour => {
            let label = format!("{}, {hour}:00", date_key(date));
            DerivedKey {
                key: BucketKey(label.clone()),
                label,
                ordinal: window_start(date, hour),
            }
        }
        Granularity::Day => {
            let label = date_key(date);
            DerivedKey {
                key: BucketKey(label.clone()),
                label,
                ordinal: window_start(date, 0),
            }
        }
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn window_start(date: NaiveDate, hour: u32) -> i64 {
    date.and_hms_opt(hour, 0, 0)
        .map(|start| start.and_utc().timestamp())
        .unwrap_or_default()
}
