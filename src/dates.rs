use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Per-record parse failure. Never fatal: callers leave derived fields unset.
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("no year found in {0:?}")]
    NoYear(String),
}

/// Full-date layouts tried before falling back to token scanning.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d/%m/%Y",
];

// A standalone 4-digit year, not embedded in a longer number
static FOUR_DIGIT_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])(?P<year>[12]\d{3})(?:[^0-9]|$)").unwrap()
});

// Three short numeric fields: d/m/yy, m/d/yy or yy-mm-dd
static SHORT_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])(?P<a>\d{1,2})[/\-.](?P<b>\d{1,2})[/\-.](?P<c>\d{1,2})(?:[^0-9]|$)")
        .unwrap()
});

// "2 January 75", "2 Jan '75"
static DAY_MONTH_SHORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[^0-9])(?P<day>\d{1,2})(?:st|nd|rd|th)?\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+'?(?P<year>\d{2})(?:[^0-9]|$)",
    )
    .unwrap()
});

// "January 2, 75", "Jan 2 '05"
static MONTH_DAY_SHORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(?P<day>\d{1,2})(?:st|nd|rd|th)?,?\s+'?(?P<year>\d{2})(?:[^0-9]|$)",
    )
    .unwrap()
});

/// Expand a 2-digit year to 4 digits (30-99 → 19xx, 00-29 → 20xx).
fn expand_year(y: i32) -> i32 {
    if y >= 30 { 1900 + y } else { 2000 + y }
}

/// Year of a short numeric date. Day-first and month-first layouts put the
/// year last; a leading field that can't be a day or month is a year.
fn short_numeric_year(a: &str, b: &str, c: &str) -> Option<i32> {
    let (x, y, z): (u32, u32, u32) = (a.parse().ok()?, b.parse().ok()?, c.parse().ok()?);
    let day_or_month = |v: u32| (1..=31).contains(&v);

    if c.len() == 2 && day_or_month(x) && day_or_month(y) && x.min(y) <= 12 {
        return Some(expand_year(z as i32));
    }
    if a.len() == 2 && (1..=12).contains(&y) && day_or_month(z) {
        return Some(expand_year(x as i32));
    }
    None
}

/// Two-digit year after a day and month name, in either order.
fn month_name_short_year(s: &str) -> Option<i32> {
    [&*DAY_MONTH_SHORT_RE, &*MONTH_DAY_SHORT_RE]
        .into_iter()
        .flat_map(|re| re.captures_iter(s))
        .find_map(|caps| {
            let day: u32 = caps["day"].parse().ok()?;
            let year: i32 = caps["year"].parse().ok()?;
            (1..=31).contains(&day).then(|| expand_year(year))
        })
}

/// Leniently extract a calendar year from a loosely structured date string.
///
/// Accepts full dates ("1975-03-01", "2 January 1975"), partial dates
/// ("1975-03", "1975") and free text with a date buried in it
/// ("Week of 2 January 1975 -"). Non-date tokens are ignored.
pub fn parse_year(raw: &str) -> Result<i32, ParseError> {
    let s = raw.trim();

    for fmt in DATE_FORMATS {
        // chrono accepts short years for %Y; those go through the pivot below
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            if d.year() >= 1000 {
                return Ok(d.year());
            }
        }
    }

    if let Some(caps) = FOUR_DIGIT_YEAR_RE.captures(s) {
        if let Ok(y) = caps["year"].parse::<i32>() {
            return Ok(y);
        }
    }

    let short = SHORT_DATE_RE
        .captures_iter(s)
        .find_map(|caps| short_numeric_year(&caps["a"], &caps["b"], &caps["c"]))
        .or_else(|| month_name_short_year(s));
    if let Some(y) = short {
        return Ok(y);
    }

    Err(ParseError::NoYear(raw.to_string()))
}

/// Start of the decade containing `year`. Always a multiple of 10 and `<= year`.
pub fn decade_of(year: i32) -> i32 {
    year - year.rem_euclid(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_dates() {
        assert_eq!(parse_year("1975-03-01"), Ok(1975));
        assert_eq!(parse_year("2 January 1975"), Ok(1975));
        assert_eq!(parse_year("02 Jan 1975"), Ok(1975));
        assert_eq!(parse_year("March 1, 1975"), Ok(1975));
    }

    #[test]
    fn test_partial_dates() {
        assert_eq!(parse_year("1975"), Ok(1975));
        assert_eq!(parse_year("1975-03"), Ok(1975));
        assert_eq!(parse_year("  1988 "), Ok(1988));
    }

    #[test]
    fn test_fuzzy_tokens_ignored() {
        assert_eq!(parse_year("Week of 2 January 1975 -"), Ok(1975));
        assert_eq!(parse_year("released sometime in 1969, remastered"), Ok(1969));
    }

    #[test]
    fn test_first_year_wins() {
        assert_eq!(parse_year("1975 reissued 2009"), Ok(1975));
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(parse_year("1/2/75"), Ok(1975));
        assert_eq!(parse_year("01-02-05"), Ok(2005));
        assert_eq!(parse_year("12/31/99"), Ok(1999));
    }

    #[test]
    fn test_two_digit_year_first() {
        assert_eq!(parse_year("75-03-01"), Ok(1975));
        assert_eq!(parse_year("99.12.31"), Ok(1999));
        // Neither layout fits
        assert!(parse_year("75-13-01").is_err());
        assert!(parse_year("40/40/40").is_err());
    }

    #[test]
    fn test_two_digit_year_with_month_name() {
        assert_eq!(parse_year("2 January 75"), Ok(1975));
        assert_eq!(parse_year("2nd Jan '75"), Ok(1975));
        assert_eq!(parse_year("Jan 2, 05"), Ok(2005));
        assert_eq!(parse_year("week of March 14 68"), Ok(1968));
        assert!(parse_year("January 12").is_err());
    }

    #[test]
    fn test_no_year() {
        assert!(parse_year("").is_err());
        assert!(parse_year("unknown").is_err());
        // Embedded in a longer number is not a year
        assert!(parse_year("track 123456").is_err());
    }

    #[test]
    fn test_decade_of() {
        assert_eq!(decade_of(1975), 1970);
        assert_eq!(decade_of(1970), 1970);
        assert_eq!(decade_of(2009), 2000);
        for y in [1, 999, 1955, 2024, -5] {
            let d = decade_of(y);
            assert_eq!(d % 10, 0);
            assert!(d <= y);
        }
    }
}
