use crate::models::{BucketKey, BucketRecord, Granularity, Series};
use crate::timekey::{derive_key, Zone};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub label: String,
    pub ordinal: i64,
    pub count: u64,
}

pub type BucketMap = HashMap<BucketKey, Bucket>;

/// Counts clicks per bucket. The map carries no order.
pub fn aggregate(timestamps: &[DateTime<Utc>], granularity: Granularity, zone: &Zone) -> BucketMap {
    let mut buckets = BucketMap::new();
    for ts in timestamps {
        let derived = derive_key(ts, granularity, zone);
        let bucket = buckets.entry(derived.key).or_insert_with(|| Bucket {
            label: derived.label,
            ordinal: derived.ordinal,
            count: 0,
        });
        bucket.count = bucket.count.saturating_add(1);
    }
    buckets
}

/// Orders buckets by ordinal, never by label: "10:02" sorts before "9:05" as text.
/// Equal ordinals fall back to key order.
pub fn build(buckets: BucketMap, granularity: Granularity) -> Series {
    let mut entries: Vec<(BucketKey, Bucket)> = buckets.into_iter().collect();
    entries.sort_by(|(a_key, a), (b_key, b)| a.ordinal.cmp(&b.ordinal).then_with(|| a_key.cmp(b_key)));

    Series {
        granularity,
        records: entries
            .into_iter()
            .map(|(key, bucket)| BucketRecord {
                key,
                label: bucket.label,
                count: bucket.count,
            })
            .collect(),
    }
}

pub fn build_series(timestamps: &[DateTime<Utc>], granularity: Granularity, zone: &Zone) -> Series {
    build(aggregate(timestamps, granularity, zone), granularity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use crate::models::RawTimestamp;
    use chrono::Duration;

    const ALL: [Granularity; 3] = [Granularity::Minute, Granularity::Hour, Granularity::Day];

    fn parse(values: &[&str]) -> Vec<DateTime<Utc>> {
        let raw: Vec<RawTimestamp> = values.iter().map(|value| RawTimestamp::from(*value)).collect();
        ingest(&raw, &Zone::utc()).timestamps
    }

    fn labels(series: &Series) -> Vec<(&str, u64)> {
        series
            .records
            .iter()
            .map(|record| (record.label.as_str(), record.count))
            .collect()
    }

    fn spread() -> Vec<DateTime<Utc>> {
        let start = parse(&["2024-02-28T21:17:00Z"])[0];
        (0..120)
            .map(|step| start + Duration::minutes(step * 37) + Duration::seconds(step % 50))
            .collect()
    }

    fn ordinals(series: &Series, zone: &Zone) -> Vec<i64> {
        let mut map = HashMap::new();
        for ts in spread() {
            let derived = derive_key(&ts, series.granularity, zone);
            map.insert(derived.key, derived.ordinal);
        }
        series.records.iter().map(|record| map[&record.key]).collect()
    }

    #[test]
    fn minute_series_sorts_by_time_of_day() {
        let timestamps = parse(&["2024-01-01T09:05:00Z", "2024-01-01T09:05:30Z", "2024-01-01T10:02:00Z"]);
        let series = build_series(&timestamps, Granularity::Minute, &Zone::utc());
        assert_eq!(labels(&series), vec![("9:05", 2), ("10:02", 1)]);
    }

    #[test]
    fn day_series_groups_one_date() {
        let timestamps = parse(&["2024-01-01T09:05:00Z", "2024-01-01T09:05:30Z", "2024-01-01T10:02:00Z"]);
        let series = build_series(&timestamps, Granularity::Day, &Zone::utc());
        assert_eq!(labels(&series), vec![("2024-01-01", 3)]);
    }

    #[test]
    fn hour_series_spans_midnight_in_time_order() {
        let timestamps = parse(&["2024-01-02T00:10:00Z", "2024-01-01T23:50:00Z"]);
        let series = build_series(&timestamps, Granularity::Hour, &Zone::utc());
        assert_eq!(
            labels(&series),
            vec![("2024-01-01, 23:00", 1), ("2024-01-02, 0:00", 1)]
        );
    }

    #[test]
    fn empty_input_yields_empty_series() {
        for granularity in ALL {
            assert!(aggregate(&[], granularity, &Zone::utc()).is_empty());
            assert!(build(BucketMap::new(), granularity).is_empty());
        }
    }

    #[test]
    fn aggregation_ignores_input_order() {
        let zone = Zone::utc();
        let forward = spread();
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut shuffled = forward.clone();
        shuffled.rotate_left(47);
        shuffled.swap(3, 90);

        for granularity in ALL {
            let expected = aggregate(&forward, granularity, &zone);
            assert_eq!(aggregate(&reversed, granularity, &zone), expected);
            assert_eq!(aggregate(&shuffled, granularity, &zone), expected);
        }
    }

    #[test]
    fn no_click_is_lost_or_double_counted() {
        let zone = Zone::utc();
        let timestamps = spread();
        for granularity in ALL {
            let series = build_series(&timestamps, granularity, &zone);
            assert_eq!(series.total(), timestamps.len() as u64);
            assert!(series.records.iter().all(|record| record.count >= 1));
        }
    }

    #[test]
    fn series_is_strictly_increasing_by_ordinal() {
        let zone = Zone::utc();
        for granularity in ALL {
            let series = build_series(&spread(), granularity, &zone);
            let ordinals = ordinals(&series, &zone);
            assert!(ordinals.windows(2).all(|pair| pair[0] < pair[1]), "{granularity} out of order");
        }
    }

    #[test]
    fn building_twice_is_identical() {
        let zone = Zone::utc();
        for granularity in ALL {
            let first = build_series(&spread(), granularity, &zone);
            let second = build_series(&spread(), granularity, &zone);
            assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&second).unwrap()
            );
        }
    }

    #[test]
    fn equal_ordinals_fall_back_to_key_order() {
        let mut buckets = BucketMap::new();
        for key in ["b", "a", "c"] {
            buckets.insert(
                BucketKey(key.to_string()),
                Bucket {
                    label: key.to_uppercase(),
                    ordinal: 7,
                    count: 1,
                },
            );
        }
        let series = build(buckets, Granularity::Minute);
        assert_eq!(labels(&series), vec![("A", 1), ("B", 1), ("C", 1)]);
    }
}
