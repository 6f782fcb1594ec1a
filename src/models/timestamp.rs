//! Persisted timestamps are RFC 3339 strings with exactly three fractional
//! digits, so string order in the database equals time order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    DateTime::<Utc>::deserialize(deserializer)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&format(value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn string_order_matches_time_order() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let later = whole + chrono::Duration::milliseconds(500);
        assert_eq!(format(&whole), "2024-05-01T12:00:00.000Z");
        assert!(format(&whole) < format(&later));
    }

    #[test]
    fn reads_back_what_it_writes() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Stamped {
            #[serde(with = "super")]
            at: DateTime<Utc>,
            #[serde(default, with = "super::option")]
            done: Option<DateTime<Utc>>,
        }
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_value(Stamped { at, done: None }).unwrap();
        assert_eq!(json["at"], "2024-05-01T12:00:00.000Z");
        let back: Stamped = serde_json::from_str(r#"{"at":"2024-05-01T12:00:00Z"}"#).unwrap();
        assert_eq!(back.at, at);
        assert!(back.done.is_none());
    }
}
