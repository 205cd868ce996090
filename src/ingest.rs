use crate::models::RawTimestamp;
use crate::timekey::Zone;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingested {
    pub timestamps: Vec<DateTime<Utc>>,
    pub skipped: usize,
}

/// Parses a batch of raw instants, dropping the ones that do not parse.
pub fn ingest(raw: &[RawTimestamp], zone: &Zone) -> Ingested {
    let mut ingested = Ingested {
        timestamps: Vec::with_capacity(raw.len()),
        skipped: 0,
    };

    for entry in raw {
        match parse_timestamp(entry, zone) {
            Some(ts) => ingested.timestamps.push(ts),
            None => {
                debug!("skipping malformed click timestamp: {entry:?}");
                ingested.skipped += 1;
            }
        }
    }

    ingested
}

/// Strings carrying an offset are absolute; naive strings are read as wall
/// clock in `zone`. Integers are epoch milliseconds.
pub fn parse_timestamp(raw: &RawTimestamp, zone: &Zone) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Text(text) => {
            let text = text.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Some(ts.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .and_then(|naive| zone.from_wall_clock(&naive))
        }
        RawTimestamp::EpochMillis(millis) => DateTime::from_timestamp_millis(*millis),
        RawTimestamp::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_timestamp(&"2024-01-01T11:05:00+02:00".into(), &Zone::utc()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-01T09:05:00+00:00");
    }

    #[test]
    fn naive_strings_use_the_configured_zone() {
        let plus_one = Zone::Fixed(FixedOffset::east_opt(3600).unwrap());
        let ts = parse_timestamp(&"2024-01-01T10:05:00.123456".into(), &plus_one).unwrap();
        assert_eq!(ts.timestamp(), 1_704_099_900);
    }

    #[test]
    fn integers_are_epoch_millis() {
        let ts = parse_timestamp(&RawTimestamp::EpochMillis(1_704_099_900_000), &Zone::utc()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-01T09:05:00+00:00");
    }

    #[test]
    fn malformed_entries_are_counted_not_fatal() {
        let raw = vec![
            RawTimestamp::from("2024-01-01T09:05:00Z"),
            RawTimestamp::from("yesterday"),
            RawTimestamp::Other(serde_json::Value::Null),
            RawTimestamp::from("2024-13-01T00:00:00Z"),
            RawTimestamp::from("2024-01-01T10:02:00Z"),
        ];

        let ingested = ingest(&raw, &Zone::utc());
        assert_eq!(ingested.timestamps.len(), 2);
        assert_eq!(ingested.skipped, 3);
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(ingest(&[], &Zone::utc()), Ingested::default());
    }
}
