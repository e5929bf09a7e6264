//! Laboratory name lines.
//!
//! Inside a section the products are grouped under the name of the
//! laboratory that markets them (`SAIPH`, `SANOFI AVENTIS`, `ADWYA S.A`).
//! Names sometimes wrap onto a second line; [`LaboratoryAccumulator`] joins
//! the pieces.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_NON_LAB_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:bt|fl|sol|comp|gel|ser|pde|mg|ml|µg|μg)\b|^\d|^[|\-.\s]+$|^(?:mois|vie|amm|exp)\b")
        .unwrap()
});

static RE_PHARMA_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:PHARMA\w*|PHARM|LAB\w*|LLC|GMBH|LTD|INC|SANTE|HEALTH|SCIENCES?|INDUSTRIES?)\b",
        r"|\bS\.?A\.?(?:\s|$)",
    ))
    .unwrap()
});

/// Column titles of the price tables, printed in caps like a laboratory.
static RE_COLUMN_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:PRIX|DESIGNATION|CODE|TOTAL|MARGE)\b").unwrap());

static RE_STRENGTH_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s*(?:mg|ml|µg|μg|%)").unwrap());

fn is_all_caps(s: &str) -> bool {
    s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase)
}

/// Heuristic: does this line name a laboratory?
pub fn is_laboratory_line(line: &str) -> bool {
    let line = line.trim();
    let total = line.chars().count();
    if total < 4 {
        return false;
    }
    if line.chars().filter(char::is_ascii_digit).count() > 3 {
        return false;
    }
    let arabic = line
        .chars()
        .filter(|c| ('\u{0600}'..='\u{06FF}').contains(c))
        .count();
    if arabic as f64 > total as f64 * 0.3 {
        return false;
    }
    if RE_NON_LAB_PREFIX.is_match(line) || RE_COLUMN_TITLE.is_match(line) {
        return false;
    }
    if !line.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    if RE_PHARMA_SUFFIX.is_match(line) {
        return true;
    }
    let letters = line.chars().filter(char::is_ascii_alphabetic).count();
    is_all_caps(line) && (3..=60).contains(&letters) && !RE_STRENGTH_HINT.is_match(line)
}

/// Joins laboratory names that wrap over several lines.
#[derive(Debug, Default)]
pub struct LaboratoryAccumulator {
    pending: Vec<String>,
}

impl LaboratoryAccumulator {
    /// Feed a laboratory line. Returns a completed name when this line
    /// starts a new laboratory instead of continuing the pending one.
    pub fn push(&mut self, line: &str) -> Option<String> {
        let continues = self.pending.last().is_some_and(|prev| {
            let prev = prev.trim_end();
            prev.ends_with("AND")
                || prev.ends_with('&')
                || (is_all_caps(line) && line.split_whitespace().count() <= 3)
        });
        if continues {
            self.pending.push(line.to_string());
            None
        } else {
            let done = self.take();
            self.pending.push(line.to_string());
            done
        }
    }

    /// The pending name, if any, leaving the accumulator empty.
    pub fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let name = self.pending.join(" ");
        self.pending.clear();
        Some(name)
    }
}
