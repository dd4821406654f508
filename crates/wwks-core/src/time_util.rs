//! Wire timestamps and time-based request ids.
//!
//! The WWKS envelope carries `TimeStamp="yyyy-MM-ddTHH:mm:ssZ"` and every
//! request carries a client-generated `Id`. Ids are the UTC time of day as
//! `HHmmssfff`, which is compact and unique enough within one session once
//! same-millisecond collisions are bumped (see [`IdGenerator`]).

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Timelike, Utc};

/// Milliseconds in one day; ids wrap at midnight.
const MS_PER_DAY: u64 = 86_400_000;

/// Ids closer than this to the last issued one are treated as collisions.
const COLLISION_WINDOW_MS: u64 = 1_000;

/// Current UTC time formatted as a WWKS envelope timestamp.
pub fn wwks_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Format an instant as `yyyy-MM-ddTHH:mm:ssZ`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Milliseconds since UTC midnight for `at`.
fn ms_of_day(at: DateTime<Utc>) -> u64 {
    u64::from(at.num_seconds_from_midnight()) * 1_000
        + u64::from(at.nanosecond() / 1_000_000) % 1_000
}

/// Render milliseconds-of-day as `HHmmssfff`.
pub fn format_request_id(ms: u64) -> String {
    let ms = ms % MS_PER_DAY;
    let h = ms / 3_600_000;
    let m = ms / 60_000 % 60;
    let s = ms / 1_000 % 60;
    let f = ms % 1_000;
    format!("{h:02}{m:02}{s:02}{f:03}")
}

/// Generates session-unique, time-based request ids.
///
/// Two requests issued within the same millisecond would otherwise share an
/// id; the generator hands out `last + 1ms` instead. A value far behind the
/// last one (midnight wrap, clock step) is accepted as is.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
    issued_any: std::sync::atomic::AtomicBool,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id based on the current wall clock.
    pub fn next_id(&self) -> String {
        self.next_id_at(Utc::now())
    }

    /// Next id based on an explicit instant (deterministic in tests).
    pub fn next_id_at(&self, at: DateTime<Utc>) -> String {
        let now = ms_of_day(at);
        let first = !self.issued_any.swap(true, Ordering::AcqRel);
        let mut chosen = now;
        let _ = self.last.fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            chosen = if !first && now <= last && last - now < COLLISION_WINDOW_MS {
                (last + 1) % MS_PER_DAY
            } else {
                now
            };
            Some(chosen)
        });
        format_request_id(chosen)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamp_format() {
        let at = Utc.with_ymd_and_hms(2023, 11, 30, 14, 53, 51).unwrap();
        assert_eq!(format_timestamp(at), "2023-11-30T14:53:51Z");
    }

    #[test]
    fn request_id_is_hhmmssfff() {
        assert_eq!(format_request_id(12 * 3_600_000 + 1), "120000001");
        assert_eq!(format_request_id(0), "000000000");
        assert_eq!(format_request_id(MS_PER_DAY - 1), "235959999");
    }

    #[test]
    fn same_millisecond_ids_are_bumped() {
        let ids = IdGenerator::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let a = ids.next_id_at(at);
        let b = ids.next_id_at(at);
        let c = ids.next_id_at(at);
        assert_eq!(a, "120000000");
        assert_eq!(b, "120000001");
        assert_eq!(c, "120000002");
    }

    #[test]
    fn midnight_wrap_is_accepted() {
        let ids = IdGenerator::new();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap();
        ids.next_id_at(late);
        assert_eq!(ids.next_id_at(early), "000001000");
    }
}
