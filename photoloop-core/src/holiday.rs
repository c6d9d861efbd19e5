//! Built-in holiday calendar. Covers the fixed-date holidays of the commonly
//! configured countries plus the floating US federal holidays; anything more
//! exotic plugs in through the [`HolidayCalendar`] trait instead.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::collaborators::HolidayCalendar;

pub struct BuiltinHolidays;

impl HolidayCalendar for BuiltinHolidays {
    fn is_holiday(&self, date: NaiveDate, country: &str) -> bool {
        let (month, day) = (date.month(), date.day());
        match country.to_ascii_uppercase().as_str() {
            "US" => us_holiday(date),
            "GB" | "UK" => matches!((month, day), (1, 1) | (12, 25) | (12, 26)),
            "FR" => matches!(
                (month, day),
                (1, 1) | (5, 1) | (5, 8) | (7, 14) | (8, 15) | (11, 1) | (11, 11) | (12, 25)
            ),
            "DE" => matches!((month, day), (1, 1) | (5, 1) | (10, 3) | (12, 25) | (12, 26)),
            "CA" => matches!((month, day), (1, 1) | (7, 1) | (12, 25) | (12, 26)),
            _ => {
                tracing::debug!("no holiday data for country {country}");
                false
            }
        }
    }
}

fn us_holiday(date: NaiveDate) -> bool {
    let (month, day) = (date.month(), date.day());
    match (month, day) {
        // New Year's, Juneteenth, Independence Day, Veterans Day, Christmas.
        (1, 1) | (6, 19) | (7, 4) | (11, 11) | (12, 25) => return true,
        _ => {}
    }
    let year = date.year();
    date == nth_weekday(year, 1, Weekday::Mon, 3) // Martin Luther King Jr. Day
        || date == nth_weekday(year, 2, Weekday::Mon, 3) // Presidents' Day
        || date == last_weekday(year, 5, Weekday::Mon) // Memorial Day
        || date == nth_weekday(year, 9, Weekday::Mon, 1) // Labor Day
        || date == nth_weekday(year, 11, Weekday::Thu, 4) // Thanksgiving
}

/// The `n`th given weekday of a month (1-based).
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + chrono::Duration::days((offset + (n - 1) * 7) as i64)
}

/// The last given weekday of a month.
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let next_month_start = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month start");
    let last = next_month_start - chrono::Duration::days(1);
    let offset = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    last - chrono::Duration::days(offset as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn fixed_us_holidays() {
        let calendar = BuiltinHolidays;
        assert!(calendar.is_holiday(date("2026-01-01"), "US"));
        assert!(calendar.is_holiday(date("2026-07-04"), "us"));
        assert!(calendar.is_holiday(date("2026-12-25"), "US"));
        assert!(!calendar.is_holiday(date("2026-03-11"), "US"));
    }

    #[test]
    fn floating_us_holidays() {
        let calendar = BuiltinHolidays;
        // Thanksgiving 2026 is November 26; Memorial Day is May 25.
        assert!(calendar.is_holiday(date("2026-11-26"), "US"));
        assert!(calendar.is_holiday(date("2026-05-25"), "US"));
        assert!(!calendar.is_holiday(date("2026-11-19"), "US"));
    }

    #[test]
    fn other_countries_and_unknown() {
        let calendar = BuiltinHolidays;
        assert!(calendar.is_holiday(date("2026-07-14"), "FR"));
        assert!(calendar.is_holiday(date("2026-10-03"), "DE"));
        assert!(!calendar.is_holiday(date("2026-07-14"), "DE"));
        assert!(!calendar.is_holiday(date("2026-01-01"), "ZZ"));
    }
}
