//! Day-boundary helpers in the app's reference timezone (JST, UTC+9).
//!
//! All functions are pure in the current instant so the quota gate never has
//! to reason about timezones itself.

use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, TimeZone, Utc};

const JST_UTC_OFFSET_SECS: i32 = 9 * 3600;

fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_UTC_OFFSET_SECS).expect("JST offset is in range")
}

/// Canonical `YYYY-MM-DD` identifier of the JST calendar day containing `now`.
pub fn jst_day_key(now: DateTime<Utc>) -> String {
    now.with_timezone(&jst()).format("%Y-%m-%d").to_string()
}

/// UTC instant of the next JST midnight after `now`, RFC 3339 with millis.
pub fn next_jst_midnight_iso(now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&jst());
    let next_day = local.date_naive() + Duration::days(1);
    let midnight = next_day
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    let at_offset = jst()
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offsets map local times uniquely");
    at_offset
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .expect("valid test instant")
    }

    #[test]
    fn day_key_uses_jst_not_utc() {
        // 14:59 UTC is 23:59 JST, still the same JST day.
        assert_eq!(jst_day_key(utc(2024, 1, 1, 14, 59, 0)), "2024-01-01");
        // 15:00 UTC is midnight JST of the next day.
        assert_eq!(jst_day_key(utc(2024, 1, 1, 15, 0, 0)), "2024-01-02");
    }

    #[test]
    fn next_midnight_is_the_upcoming_jst_boundary() {
        assert_eq!(
            next_jst_midnight_iso(utc(2024, 1, 1, 14, 59, 0)),
            "2024-01-01T15:00:00.000Z"
        );
        // Exactly at the boundary the "next" midnight is a full day away.
        assert_eq!(
            next_jst_midnight_iso(utc(2024, 1, 1, 15, 0, 0)),
            "2024-01-02T15:00:00.000Z"
        );
    }

    #[test]
    fn next_midnight_crosses_month_and_year_ends() {
        assert_eq!(
            next_jst_midnight_iso(utc(2024, 2, 29, 0, 0, 0)),
            "2024-02-29T15:00:00.000Z"
        );
        assert_eq!(
            next_jst_midnight_iso(utc(2024, 12, 31, 16, 0, 0)),
            "2025-01-01T15:00:00.000Z"
        );
    }
}
