use chrono::{NaiveDate, NaiveTime};
use std::path::Path;

use super::format::parse_timestamp_ms;

/// Time encoded by a `YYYY-MM-DD/<symbol>/<name>` path, in epoch milliseconds.
///
/// `<name>` stems are either `HH_MM` (combined with the date directory) or an
/// epoch timestamp written by the uploaders. Returns `None` for anything else.
pub fn path_timestamp_ms(date_dir: &str, file_name: &str) -> Option<i64> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;

    if let Some((hh, mm)) = stem.split_once('_') {
        let date = NaiveDate::parse_from_str(date_dir, "%Y-%m-%d").ok()?;
        let hour: u32 = hh.parse().ok()?;
        let minute: u32 = mm.parse().ok()?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        return Some(date.and_time(time).and_utc().timestamp_millis());
    }

    if !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
        return parse_timestamp_ms(stem);
    }

    None
}
