//! Domain token rules shared by the parser and the matcher.
//!
//! A medication name carries two machine-readable facts besides the brand:
//! its strength (`2mg`, `2,5 %`, `200 doses`) and its packaging (`Bt 30`,
//! `Fl 1`, `Amp 5`). The parser uses them to recognise medication lines; the
//! matcher compares them between a record and a catalog candidate. Both go
//! through this module so that "is a strength" means the same thing in both.

use once_cell::sync::Lazy;
use regex::Regex;

/// `number[.,number]` followed by a unit; the next char is checked separately
/// because `%` has no word boundary after it.
static RE_STRENGTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(mg|µg|μg|mcg|ml|g|%|doses?)").unwrap()
});

/// A known packaging abbreviation followed by its quantity.
static RE_PACKAGING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(bt|fl|tb|amp|ser)[./]?\s*(?:de\s+)?(\d+)\b").unwrap()
});

/// Packaging abbreviation and unit count, e.g. `("bt", 30)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packaging {
    pub abbreviation: String,
    pub quantity: u32,
}

/// All strength tokens of `text` in canonical form (`2.5mg`, `5%`, `200dose`).
pub fn strengths(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for caps in RE_STRENGTH.captures_iter(text) {
        let (Some(whole), Some(value), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let followed_by_letter = text[whole.end()..]
            .chars()
            .next()
            .is_some_and(char::is_alphabetic);
        if followed_by_letter {
            continue;
        }
        let value = value.as_str().replace(',', ".");
        let unit = match unit.as_str().to_lowercase().as_str() {
            "μg" | "mcg" => "µg".to_string(),
            "doses" => "dose".to_string(),
            other => other.to_string(),
        };
        found.push(format!("{value}{unit}"));
    }
    found
}

/// Whether `text` contains at least one strength token.
pub fn has_strength(text: &str) -> bool {
    !strengths(text).is_empty()
}

/// First packaging token of `text`, if any.
pub fn packaging(text: &str) -> Option<Packaging> {
    let caps = RE_PACKAGING.captures(text)?;
    let abbreviation = caps.get(1)?.as_str().to_lowercase();
    let quantity = caps.get(2)?.as_str().parse().ok()?;
    Some(Packaging {
        abbreviation,
        quantity,
    })
}
