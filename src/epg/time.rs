//! Schedule timestamp conversion
//!
//! Schedule timestamps look like `20240826123000 +0300`. The digits are read
//! as a naive wall-clock time and shifted by `local offset - source offset`,
//! giving an instant in the host's local frame. The returned `NaiveDateTime`
//! values are always host-local.

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Converts raw schedule timestamps to host-local instants.
pub struct TimeConverter {
    source_offset_secs: i64,
    local_offset_secs: i64,
    use_embedded_offset: bool,
    cache: Mutex<LruCache<String, Option<NaiveDateTime>>>,
}

impl TimeConverter {
    /// `local_offset_secs` is the host's UTC deviation, e.g. `5 * 3600` for UTC+5.
    pub fn new(source_offset_hours: i32, local_offset_secs: i32, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            source_offset_secs: i64::from(source_offset_hours) * 3600,
            local_offset_secs: i64::from(local_offset_secs),
            use_embedded_offset: false,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Read the host offset once, now.
    pub fn from_host(source_offset_hours: i32, cache_size: usize) -> Self {
        let local = Local::now().offset().local_minus_utc();
        Self::new(source_offset_hours, local, cache_size)
    }

    /// Prefer a `+HHMM` suffix on the timestamp over the fixed source offset.
    pub fn with_embedded_offset(mut self, enabled: bool) -> Self {
        self.use_embedded_offset = enabled;
        self
    }

    /// Flat correction applied to every timestamp without a usable suffix.
    pub fn correction(&self) -> TimeDelta {
        TimeDelta::seconds(self.local_offset_secs - self.source_offset_secs)
    }

    /// Parse a raw timestamp; `None` when the 14-digit prefix is missing or invalid.
    pub fn parse(&self, timestamp: &str) -> Option<NaiveDateTime> {
        let mut cache = self.cache.lock();
        if let Some(hit) = cache.get(timestamp) {
            return *hit;
        }
        let parsed = self.convert(timestamp);
        cache.put(timestamp.to_string(), parsed);
        parsed
    }

    /// Parse, substituting `fallback` (normally the query instant) for malformed input.
    pub fn parse_or(&self, timestamp: &str, fallback: NaiveDateTime) -> NaiveDateTime {
        self.parse(timestamp).unwrap_or(fallback)
    }

    fn convert(&self, timestamp: &str) -> Option<NaiveDateTime> {
        let timestamp = timestamp.trim();
        let digits = timestamp.get(..14)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let year: i32 = digits[0..4].parse().ok()?;
        let month: u32 = digits[4..6].parse().ok()?;
        let day: u32 = digits[6..8].parse().ok()?;
        let hour: u32 = digits[8..10].parse().ok()?;
        let minute: u32 = digits[10..12].parse().ok()?;
        let second: u32 = digits[12..14].parse().ok()?;

        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;

        let source_offset = if self.use_embedded_offset {
            parse_tz_offset(&timestamp[14..]).unwrap_or(self.source_offset_secs)
        } else {
            self.source_offset_secs
        };
        naive.checked_add_signed(TimeDelta::seconds(self.local_offset_secs - source_offset))
    }

    /// Format a host-local instant as 24-hour `HH:MM`.
    pub fn format(instant: NaiveDateTime) -> String {
        instant.format("%H:%M").to_string()
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Parse timezone offset like "+0100", "-0530" or "Z" to seconds
fn parse_tz_offset(tz: &str) -> Option<i64> {
    let tz = tz.trim();
    if tz.is_empty() {
        return None;
    }
    if tz.eq_ignore_ascii_case("z") {
        return Some(0);
    }

    let sign = match tz.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let tz: String = tz[1..].chars().filter(|c| *c != ':').collect();
    if !tz.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if tz.len() >= 4 {
        let hours: i64 = tz[0..2].parse().ok()?;
        let minutes: i64 = tz[2..4].parse().ok()?;
        Some(sign * (hours * 3600 + minutes * 60))
    } else if tz.len() >= 2 {
        let hours: i64 = tz[0..2].parse().ok()?;
        Some(sign * hours * 3600)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn test_source_to_host_shift() {
        let conv = TimeConverter::new(3, 5 * 3600, 16);
        assert_eq!(conv.parse("20240826123000"), Some(at(2024, 8, 26, 14, 30, 0)));
        assert_eq!(conv.correction(), TimeDelta::hours(2));
    }

    #[test]
    fn test_negative_shift_crosses_midnight() {
        let conv = TimeConverter::new(3, 0, 16);
        assert_eq!(conv.parse("20240101013000 +0300"), Some(at(2023, 12, 31, 22, 30, 0)));
    }

    #[test]
    fn test_suffix_ignored_by_default() {
        let conv = TimeConverter::new(3, 3 * 3600, 16);
        assert_eq!(conv.parse("20240826123000 +0000"), Some(at(2024, 8, 26, 12, 30, 0)));
    }

    #[test]
    fn test_embedded_offset() {
        let conv = TimeConverter::new(3, 3 * 3600, 16).with_embedded_offset(true);
        assert_eq!(conv.parse("20240826123000 +0000"), Some(at(2024, 8, 26, 15, 30, 0)));
        assert_eq!(conv.parse("20240826123000 -05:30"), Some(at(2024, 8, 26, 21, 0, 0)));
        // No suffix falls back to the fixed source offset
        assert_eq!(conv.parse("20240826123000"), Some(at(2024, 8, 26, 12, 30, 0)));
    }

    #[test]
    fn test_malformed() {
        let conv = TimeConverter::new(0, 0, 16);
        assert_eq!(conv.parse("2024082612"), None);
        assert_eq!(conv.parse("2024O826123000"), None);
        assert_eq!(conv.parse("20241326123000"), None);
        assert_eq!(conv.parse(""), None);

        let fallback = at(2024, 1, 1, 0, 0, 0);
        assert_eq!(conv.parse_or("garbage", fallback), fallback);
    }

    #[test]
    fn test_cache_is_bounded() {
        let conv = TimeConverter::new(0, 0, 2);
        conv.parse("20240101000000");
        conv.parse("20240101010000");
        conv.parse("20240101020000");
        conv.parse("20240101020000");
        assert_eq!(conv.cached_len(), 2);
    }

    #[test]
    fn test_format() {
        assert_eq!(TimeConverter::format(at(2024, 8, 26, 9, 5, 59)), "09:05");
        assert_eq!(TimeConverter::format(at(2024, 8, 26, 23, 0, 0)), "23:00");
    }

    #[test]
    fn test_parse_tz_offset() {
        assert_eq!(parse_tz_offset("+0100"), Some(3600));
        assert_eq!(parse_tz_offset("-0530"), Some(-(5 * 3600 + 30 * 60)));
        assert_eq!(parse_tz_offset("Z"), Some(0));
        assert_eq!(parse_tz_offset("+03"), Some(3 * 3600));
        assert_eq!(parse_tz_offset("UTC"), None);
        assert_eq!(parse_tz_offset(""), None);
        assert_eq!(parse_tz_offset("+1é"), None);
        assert_eq!(parse_tz_offset("+0a00"), None);
    }

    #[test]
    fn test_non_ascii_suffix_uses_source_offset() {
        let conv = TimeConverter::new(3, 3 * 3600, 16).with_embedded_offset(true);
        assert_eq!(conv.parse("20240826123000 +1é"), Some(at(2024, 8, 26, 12, 30, 0)));
        assert_eq!(conv.parse("20240826123000 +ÿÿÿÿ"), Some(at(2024, 8, 26, 12, 30, 0)));
    }
}
