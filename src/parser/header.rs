//! Header pass: circular date and number from the preamble.

use once_cell::sync::Lazy;
use regex::Regex;

/// `تونس في 12/03/2025` or `في : 12/03/2025`.
static RE_DATE_ANCHORED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:تونس\s*في|في\s*:?)\s*:?\s*(\d{1,2})/(\d{1,2})/(\d{4})").unwrap()
});

static RE_DATE_ANY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

/// `رقم 2025/03`, its visual-order twin `مقر`, or `: 2025/03`.
static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:رقم|مقر|:)\s*(\d{4})/(\d{1,2})\b").unwrap());

static RE_NUMBER_ANCHORED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:رقم|مقر)\s*(\d{4})/(\d{1,2})\b").unwrap());

/// Date and number found by the header pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub date: Option<String>,
    pub circulaire_number: Option<String>,
}

impl Header {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.circulaire_number.is_none()
    }
}

/// Scan `preamble` first; fall back to the anchored patterns over `full_text`.
///
/// The unanchored date pattern is only trusted inside the preamble, where
/// the first date is the issue date. Deeper in the document it would pick
/// up expiry or decision dates.
pub fn scan(preamble: &str, full_text: &str) -> Header {
    let date = find_date(&RE_DATE_ANCHORED, preamble)
        .or_else(|| find_date(&RE_DATE_ANY, preamble))
        .or_else(|| find_date(&RE_DATE_ANCHORED, full_text));

    let circulaire_number = find_number(&RE_NUMBER, preamble)
        .or_else(|| find_number(&RE_NUMBER_ANCHORED, full_text));

    Header {
        date,
        circulaire_number,
    }
}

fn find_date(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text).find_map(|caps| {
        let day: u32 = caps.get(1)?.as_str().parse().ok()?;
        let month: u32 = caps.get(2)?.as_str().parse().ok()?;
        let year: u32 = caps.get(3)?.as_str().parse().ok()?;
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) || !(1990..=2100).contains(&year)
        {
            return None;
        }
        Some(format!("{year:04}-{month:02}-{day:02}"))
    })
}

fn find_number(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    Some(format!("{}/{}", caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}
