use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

// Matches portal timestamps such as "Jan. 15, 2024, 10:00 p.m. PST",
// "Sept. 3, 9 a.m." or "March 1, 2024, noon".
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (?P<month>[a-z]{3,9})\.?\s+
        (?P<day>\d{1,2})(?:st|nd|rd|th)?,?\s*
        (?:(?P<year>\d{4}),?\s*)?
        (?:
            (?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<meridiem>[ap])\.?\s*m\b\.?
          | (?P<noon>noon)
          | (?P<midnight>midnight)
        )",
    )
    .expect("timestamp pattern must compile")
});

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    months
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

/// Convert a 12-hour clock reading into a 24-hour `NaiveTime`.
pub fn to_24_hour(hour: u32, minute: u32, pm: bool) -> Option<NaiveTime> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parse a meridiem-formatted portal timestamp.
///
/// Text without a year is placed in whichever of the reference year, the year
/// before, or the year after lands closest to `reference`.
pub fn parse_meridiem_timestamp(text: &str, reference: NaiveDateTime) -> Option<NaiveDateTime> {
    let caps = TIMESTAMP.captures(text)?;

    let month = month_number(&caps["month"])?;
    let day: u32 = caps["day"].parse().ok()?;

    let time = if caps.name("noon").is_some() {
        NaiveTime::from_hms_opt(12, 0, 0)?
    } else if caps.name("midnight").is_some() {
        NaiveTime::from_hms_opt(0, 0, 0)?
    } else {
        let hour: u32 = caps.name("hour")?.as_str().parse().ok()?;
        let minute: u32 = match caps.name("minute") {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let pm = caps["meridiem"].eq_ignore_ascii_case("p");
        to_24_hour(hour, minute, pm)?
    };

    if let Some(year) = caps.name("year") {
        let year: i32 = year.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_time(time));
    }

    let base = reference.year();
    [base - 1, base, base + 1]
        .into_iter()
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .map(|date| date.and_time(time))
        .min_by_key(|candidate| (*candidate - reference).num_seconds().abs())
}
