use chrono::{Datelike, Duration, NaiveTime};

use crate::error::{Result, TraderError};

/// Returns YYYY-MM-DD in the configured timezone.
pub fn day_key(tz: &str) -> Result<String> {
    let tz: chrono_tz::Tz = tz
        .parse()
        .map_err(|_| TraderError::config(format!("invalid tz: {tz}")))?;
    let now = chrono::Utc::now().with_timezone(&tz);
    Ok(format!("{:04}-{:02}-{:02}", now.year(), now.month(), now.day()))
}

/// Parses the broker's `HHMMSS` trade-time field.
pub fn parse_hhmmss(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::parse_from_str(raw, "%H%M%S").ok()
}

pub fn format_hhmmss(t: NaiveTime) -> String {
    t.format("%H%M%S").to_string()
}

/// One second earlier, or `None` when that would wrap past midnight.
pub fn second_before(t: NaiveTime) -> Option<NaiveTime> {
    let (prev, wrapped) = t.overflowing_sub_signed(Duration::seconds(1));
    (wrapped == 0).then_some(prev)
}
