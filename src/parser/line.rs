//! Line rules: one medication line → one set of fields.
//!
//! Layout of a price line (digital text layer):
//!
//! ```text
//! 303760 DIARETYL 2mg Gél. Bt 10   1.403  1.526  2.180  B  0.350
//! code   name ..................   whol.  pharm. public cat margin
//! ```
//!
//! OCR of right-to-left pages often moves the code to the end of the line
//! and sprinkles `]`, `_`, `{` around the numbers; both variants are read
//! by peeling fields off the ends of the token list.

use crate::lexicon;
use crate::output::Category;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());

/// Prices are printed in dinars with three decimals (millimes).
static RE_PRICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,4}[.,]\d{3}$").unwrap());

/// Margin; OCR may prefix a stray `0`/`1` read from the cell border.
static RE_MARGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[01]?(\d[.,]\d{3})$").unwrap());

/// Fields read from one medication line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFields {
    pub code: Option<String>,
    pub name: String,
    pub price_wholesale: Option<f64>,
    pub price_pharmacy: Option<f64>,
    pub price_public: Option<f64>,
    pub category: Option<Category>,
    pub margin: Option<f64>,
}

/// Strip OCR table debris from a token before classifying it.
fn clean_token(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '[' | ']' | '{' | '}' | '(' | ')' | '|' | '_'))
}

fn parse_amount(token: &str) -> Option<f64> {
    token.replace(',', ".").parse().ok()
}

/// `A`, `B`, `C`, or `-` for "no category".
fn category_marker(token: &str) -> Option<Option<Category>> {
    match token {
        "-" => Some(None),
        other => Category::from_marker(other).map(Some),
    }
}

/// Apply the line rules; `None` when the line is not a medication line.
///
/// Rules, in priority order: six-digit code (first or last token), trailing
/// category/margin markers, up to three trailing price tokens, and the
/// remaining tokens as the name. A line needs the wholesale and pharmacy
/// prices, and either a code or a strength in its name.
///
/// A blank category cell leaves the margin as a fourth price-shaped token
/// after the public price; it is read as the margin, not as a price.
pub fn parse_medication_line(line: &str) -> Option<LineFields> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return None;
    }

    // ── Code ─────────────────────────────────────────────────────────────
    let mut start = 0;
    let mut end = tokens.len();
    let mut code = None;
    if RE_CODE.is_match(clean_token(tokens[0])) {
        code = Some(clean_token(tokens[0]).to_string());
        start = 1;
    } else if RE_CODE.is_match(clean_token(tokens[end - 1])) {
        code = Some(clean_token(tokens[end - 1]).to_string());
        end -= 1;
    }

    // ── Category and margin ──────────────────────────────────────────────
    let mut category = None;
    let mut margin = None;
    let mut category_cell = false;
    if end > start {
        let last = clean_token(tokens[end - 1]);
        if let Some(cat) = category_marker(last) {
            category = cat;
            category_cell = true;
            end -= 1;
        } else if end - start >= 2 {
            let before = clean_token(tokens[end - 2]);
            if let (Some(caps), Some(cat)) = (RE_MARGIN.captures(last), category_marker(before)) {
                margin = caps.get(1).and_then(|m| parse_amount(m.as_str()));
                category = cat;
                category_cell = true;
                end -= 2;
            }
        }
    }

    // ── Prices ───────────────────────────────────────────────────────────
    // Without a category cell, a fourth trailing amount is the margin.
    let max_amounts = if category_cell { 3 } else { 4 };
    let mut amounts: Vec<&str> = Vec::with_capacity(max_amounts);
    while end > start && amounts.len() < max_amounts {
        let token = clean_token(tokens[end - 1]);
        if !RE_PRICE.is_match(token) {
            break;
        }
        amounts.push(token);
        end -= 1;
    }
    if amounts.len() == 4 {
        match RE_MARGIN.captures(amounts[0]) {
            Some(caps) => {
                margin = caps.get(1).and_then(|m| parse_amount(m.as_str()));
                amounts.remove(0);
            }
            None => {
                // Not a margin: the earliest amount stays with the name.
                amounts.pop();
                end += 1;
            }
        }
    }
    if amounts.len() < 2 {
        return None;
    }
    let mut prices = Vec::with_capacity(3);
    for token in amounts.iter().rev() {
        prices.push(parse_amount(token)?);
    }

    // ── Name ─────────────────────────────────────────────────────────────
    let name = tokens[start..end].join(" ");
    let name = name
        .trim_matches(|c: char| matches!(c, '[' | ']' | '|' | '_') || c.is_whitespace())
        .to_string();
    if name.is_empty() {
        return None;
    }
    if code.is_none() {
        let starts_with_letter = name.chars().next().is_some_and(char::is_alphabetic);
        if !starts_with_letter || !lexicon::has_strength(&name) {
            return None;
        }
    }

    Some(LineFields {
        code,
        name,
        price_wholesale: prices.first().copied(),
        price_pharmacy: prices.get(1).copied(),
        price_public: prices.get(2).copied(),
        category,
        margin,
    })
}
