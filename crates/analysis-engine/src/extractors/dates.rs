// Date extraction for timeline and contradiction checks
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// Day-first numeric dates: 05/03/2024, 5-3-2024
    static ref DAY_FIRST_PATTERN: Regex =
        Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b").unwrap();

    /// ISO-style dates: 2024-03-05, 2024/3/5
    static ref YEAR_FIRST_PATTERN: Regex =
        Regex::new(r"\b(\d{4})[/-](\d{1,2})[/-](\d{1,2})\b").unwrap();

    /// March 5, 2024 / Mar 5 2024
    static ref MONTH_NAME_FIRST_PATTERN: Regex = Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b"
    )
    .unwrap();

    /// 5 March 2024 / 5th of March, 2024
    static ref DAY_FIRST_NAMED_PATTERN: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b"
    )
    .unwrap();
}

/// A date found in text, with its byte span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMention {
    pub date: NaiveDate,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn number(caps: &Captures, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

fn parse_day_first(c: &Captures) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(number(c, 3)? as i32, number(c, 2)?, number(c, 1)?)
}

fn parse_year_first(c: &Captures) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(number(c, 1)? as i32, number(c, 2)?, number(c, 3)?)
}

fn parse_month_name_first(c: &Captures) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        number(c, 3)? as i32,
        month_number(c.get(1)?.as_str())?,
        number(c, 2)?,
    )
}

fn parse_day_first_named(c: &Captures) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        number(c, 3)? as i32,
        month_number(c.get(2)?.as_str())?,
        number(c, 1)?,
    )
}

/// All valid calendar dates in `text`, in order of appearance
///
/// Numeric dates are read day-first. Strings that look like dates but are not
/// real calendar days (31/02/2024) are skipped.
pub fn extract_dates(text: &str) -> Vec<DateMention> {
    let mut mentions: Vec<DateMention> = Vec::new();

    let parsers: [(&Regex, fn(&Captures) -> Option<NaiveDate>); 4] = [
        (&*DAY_FIRST_PATTERN, parse_day_first),
        (&*YEAR_FIRST_PATTERN, parse_year_first),
        (&*MONTH_NAME_FIRST_PATTERN, parse_month_name_first),
        (&*DAY_FIRST_NAMED_PATTERN, parse_day_first_named),
    ];

    for (pattern, parse) in parsers {
        for caps in pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(date) = parse(&caps) else { continue };

            let overlaps = mentions
                .iter()
                .any(|m| whole.start() < m.end && m.start < whole.end());
            if !overlaps {
                mentions.push(DateMention {
                    date,
                    start: whole.start(),
                    end: whole.end(),
                    text: whole.as_str().to_string(),
                });
            }
        }
    }

    mentions.sort_by_key(|m| m.start);
    mentions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_numeric_dates_are_day_first() {
        let dates = extract_dates("Seen on 05/03/2024 and again 2024-04-01.");
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].date, ymd(2024, 3, 5));
        assert_eq!(dates[0].text, "05/03/2024");
        assert_eq!(dates[1].date, ymd(2024, 4, 1));
    }

    #[test]
    fn test_named_month_formats() {
        let dates = extract_dates("Reviewed March 5, 2024; visited 12th of Sept 2023; met 1 jan 2022");
        let parsed: Vec<NaiveDate> = dates.iter().map(|d| d.date).collect();
        assert_eq!(parsed, vec![ymd(2024, 3, 5), ymd(2023, 9, 12), ymd(2022, 1, 1)]);
    }

    #[test]
    fn test_invalid_calendar_dates_are_skipped() {
        assert!(extract_dates("on 31/02/2024").is_empty());
        assert!(extract_dates("room 12/40/2024").is_empty());
        assert!(extract_dates("no dates here").is_empty());
    }
}
