//! Date extraction from free-text metadata fields.
//!
//! Corpus dates arrive in whatever shape the source site used: ISO stamps,
//! dotted or slashed day-first numerics, spelled-out Turkish dates
//! ("18 Mart 2021"), or a bare year. Parsing tries each form in order and
//! the first hit wins; anything unparseable is treated as "no date" rather
//! than an error, so a malformed field can never abort a build or a search.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

static ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap());
static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[./](\d{1,2})[./](\d{4})\b").unwrap()
});
static DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s+([A-Za-zÇĞİÖŞÜçğıöşü]+)\s+(\d{4})\b").unwrap()
});
static BARE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

/// Turkish month names, including the undotted ASCII spellings that show
/// up in scraped text.
fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "ocak" => 1,
        "şubat" | "subat" => 2,
        "mart" => 3,
        "nisan" => 4,
        "mayıs" | "mayis" => 5,
        "haziran" => 6,
        "temmuz" => 7,
        "ağustos" | "agustos" => 8,
        "eylül" | "eylul" => 9,
        "ekim" => 10,
        "kasım" | "kasim" => 11,
        "aralık" | "aralik" => 12,
        _ => return None,
    };
    Some(n)
}

/// Parse a date out of a free-text metadata field.
///
/// Tries, in order: ISO (`2024-03-18`, anywhere in the string), day-first
/// numeric (`18.03.2024` / `18/03/2024`), `18 Mart 2021` with Turkish month
/// names, and finally a bare 4-digit year (mapped to January 1st). A match
/// that is not a valid calendar date falls through to the next form.
///
/// # Examples
///
/// ```
/// use derlem::dates::parse_date;
///
/// assert!(parse_date("2021-03-18").is_some());
/// assert!(parse_date("18 Mart 2021").is_some());
/// assert!(parse_date("tarih yok").is_none());
/// ```
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = ISO.captures(text) {
        let (y, m, d) = (num(&caps, 1), num(&caps, 2), num(&caps, 3));
        if let Some(date) = NaiveDate::from_ymd_opt(y as i32, m, d) {
            return Some(date);
        }
    }

    if let Some(caps) = DAY_FIRST.captures(text) {
        let (d, m, y) = (num(&caps, 1), num(&caps, 2), num(&caps, 3));
        if let Some(date) = NaiveDate::from_ymd_opt(y as i32, m, d) {
            return Some(date);
        }
    }

    if let Some(caps) = DAY_MONTH_NAME.captures(text) {
        let day = num(&caps, 1);
        let name = caps.get(2).unwrap().as_str().to_lowercase();
        let year = num(&caps, 3);
        if let Some(month) = month_number(&name)
            && let Some(date) =
                NaiveDate::from_ymd_opt(year as i32, month, day)
        {
            return Some(date);
        }
    }

    if let Some(caps) = BARE_YEAR.captures(text) {
        let year = num(&caps, 1);
        return NaiveDate::from_ymd_opt(year as i32, 1, 1);
    }

    None
}

fn num(caps: &regex::Captures<'_>, group: usize) -> u32 {
    caps.get(group).unwrap().as_str().parse().unwrap_or(0)
}

/// Day number in the proleptic Gregorian calendar, for cheap range checks.
pub fn date_ordinal(raw: &str) -> Option<i32> {
    parse_date(raw).map(|d| d.num_days_from_ce())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn iso_date() {
        assert_eq!(parse_date("2024-03-18"), Some(ymd(2024, 3, 18)));
        assert_eq!(
            parse_date("2024-03-18T10:30:00Z"),
            Some(ymd(2024, 3, 18))
        );
    }

    #[test]
    fn day_first_numeric() {
        assert_eq!(parse_date("18.03.2024"), Some(ymd(2024, 3, 18)));
        assert_eq!(parse_date("5/11/1999"), Some(ymd(1999, 11, 5)));
    }

    #[test]
    fn turkish_month_names() {
        assert_eq!(parse_date("18 Mart 2021"), Some(ymd(2021, 3, 18)));
        assert_eq!(parse_date("3 Ağustos 2019"), Some(ymd(2019, 8, 3)));
        assert_eq!(parse_date("3 agustos 2019"), Some(ymd(2019, 8, 3)));
        assert_eq!(parse_date("1 Eylül 2020"), Some(ymd(2020, 9, 1)));
    }

    #[test]
    fn bare_year_maps_to_january_first() {
        assert_eq!(parse_date("2015"), Some(ymd(2015, 1, 1)));
        assert_eq!(parse_date("yaklaşık 1998 civarı"), Some(ymd(1998, 1, 1)));
    }

    #[test]
    fn invalid_calendar_date_falls_through_to_year() {
        // The ISO pattern matches but 2024-13-45 is not a real date; the
        // bare-year fallback still salvages the year.
        assert_eq!(parse_date("2024-13-45"), Some(ymd(2024, 1, 1)));
    }

    #[test]
    fn unknown_month_name_falls_through() {
        assert_eq!(parse_date("18 Brumaire 1799"), None);
        // 1799 is outside the 1900-2099 bare-year window.
    }

    #[test]
    fn garbage_and_empty_return_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("tarih belirtilmemiş"), None);
    }

    #[test]
    fn ordinal_is_monotonic_in_date() {
        let a = date_ordinal("2020-01-01").unwrap();
        let b = date_ordinal("2020-01-02").unwrap();
        assert_eq!(b, a + 1);
        assert!(date_ordinal("not a date").is_none());
    }
}
