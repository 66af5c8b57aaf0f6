//! Audit timestamps and the record TTL window.
//!
//! Timestamps are taken in a fixed zone so stored records read the same
//! regardless of the region the function runs in. They are truncated to
//! whole seconds, matching the precision of the stored representation.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use chrono_tz::Tz;

pub const AUDIT_TIME_ZONE: Tz = chrono_tz::Asia::Tokyo;

/// Seconds a record lives past its most recent write.
pub const TTL_SECONDS: i64 = 24 * 60 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock in the audit time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().trunc_subsecs(0).with_timezone(&AUDIT_TIME_ZONE)
    }
}

/// Absolute instant after which the store may reclaim a row written at `now`.
pub fn expire_at(now: &DateTime<Tz>) -> DateTime<Utc> {
    now.with_timezone(&Utc) + TimeDelta::seconds(TTL_SECONDS)
}

/// Serde representation of audit timestamps: `%Y-%m-%d %H:%M:%S` local to the audit zone.
pub mod audit_time {
    use super::AUDIT_TIME_ZONE;
    use chrono::{DateTime, NaiveDateTime, TimeZone};
    use chrono_tz::Tz;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// The stored text of `value`.
    pub fn render(value: &DateTime<Tz>) -> String {
        let local = value.with_timezone(&AUDIT_TIME_ZONE);
        local.format(FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Tz>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&render(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Tz>, D::Error> {
        let raw: String = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(D::Error::custom)?;

        AUDIT_TIME_ZONE
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| D::Error::custom(format!("ambiguous local time {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn expiry_is_one_day_after_write() {
        let now: DateTime<Tz> = AUDIT_TIME_ZONE
            .with_ymd_and_hms(2024, 3, 1, 23, 30, 0)
            .unwrap();

        let expiry: DateTime<Utc> = expire_at(&now);

        assert_eq!(86_400, (expiry - now.with_timezone(&Utc)).num_seconds());
        let expected: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 3, 2, 14, 30, 0).unwrap();
        assert_eq!(expected, expiry);
    }

    #[test]
    fn system_clock_uses_whole_seconds_in_tokyo() {
        let now: DateTime<Tz> = SystemClock.now();

        assert_eq!(0, now.nanosecond());
        assert_eq!(AUDIT_TIME_ZONE, now.timezone());
    }

    #[test]
    fn audit_time_reads_back_unchanged() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Stamp(#[serde(with = "audit_time")] DateTime<Tz>);

        let now: DateTime<Tz> = AUDIT_TIME_ZONE
            .with_ymd_and_hms(2024, 12, 31, 9, 0, 5)
            .unwrap();

        let json: String = serde_json::to_string(&Stamp(now)).unwrap();
        assert_eq!("\"2024-12-31 09:00:05\"", json);
        // Stored text is always local to the audit zone
        let utc_view: DateTime<Tz> = now.with_timezone(&Tz::UTC);
        assert_eq!("2024-12-31 09:00:05", audit_time::render(&utc_view));

        let Stamp(parsed) = serde_json::from_str(&json).unwrap();
        assert_eq!(now, parsed);
    }

    #[test]
    fn audit_time_rejects_other_formats() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Stamp(#[serde(with = "audit_time")] DateTime<Tz>);

        let parsed = serde_json::from_str::<Stamp>("\"2024-12-31T09:00:05Z\"");
        assert!(parsed.is_err());
    }
}
