//! Weighted similarity between a circular record and a catalog candidate.
//!
//! | Signal            | Points | Rule                                          |
//! |-------------------|--------|-----------------------------------------------|
//! | Brand gate        | → 0    | first tokens differ ⇒ score is 0, full stop   |
//! | Strength          | 0–40   | all / some / none of the record's strengths   |
//! | Token similarity  | 0–40   | Jaccard of name tokens × 40                   |
//! | Packaging         | 0–20   | same abbreviation+quantity 20, abbreviation 10 |
//! | Substring         | 0–10   | one full name contains the other              |
//! | Laboratory boost  | +10    | laboratory token similarity above 70 %        |
//!
//! The total is capped at 100. All comparisons run on [`normalize`]d text.

use super::source::Candidate;
use crate::lexicon::{self, Packaging};
use crate::normalize::{self, normalize};
use std::collections::HashSet;

pub const MAX_SCORE: f64 = 100.0;

const STRENGTH_ALL: f64 = 40.0;
const STRENGTH_SOME: f64 = 20.0;
const TOKEN_WEIGHT: f64 = 40.0;
const PACKAGING_EXACT: f64 = 20.0;
const PACKAGING_ABBREVIATION: f64 = 10.0;
const SUBSTRING_BONUS: f64 = 10.0;
const LABORATORY_BOOST: f64 = 10.0;
const LABORATORY_SIMILARITY_MIN: f64 = 70.0;

/// Pre-computed comparison features of one name.
#[derive(Debug, Clone)]
pub struct NameFeatures {
    pub key: String,
    pub tokens: HashSet<String>,
    pub brand: Option<String>,
    pub strengths: Vec<String>,
    pub packaging: Option<Packaging>,
}

impl NameFeatures {
    pub fn new(name: &str) -> Self {
        let key = normalize(name);
        let brand = key.split(' ').next().filter(|b| !b.is_empty()).map(str::to_string);
        let tokens = normalize::tokens(&key).into_iter().collect();
        Self {
            strengths: lexicon::strengths(&key),
            packaging: lexicon::packaging(&key),
            brand,
            tokens,
            key,
        }
    }
}

/// Features of a record or candidate: name plus laboratory tokens.
#[derive(Debug, Clone)]
pub struct ProductFeatures {
    pub name: NameFeatures,
    pub laboratory: Option<HashSet<String>>,
}

impl ProductFeatures {
    pub fn new(name: &str, laboratory: Option<&str>) -> Self {
        let laboratory = laboratory
            .map(|lab| normalize::tokens(lab).into_iter().collect::<HashSet<_>>())
            .filter(|tokens| !tokens.is_empty());
        Self {
            name: NameFeatures::new(name),
            laboratory,
        }
    }

    pub fn of_candidate(candidate: &Candidate) -> Self {
        Self::new(&candidate.name, candidate.laboratory.as_deref())
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Score two names and laboratories, 0–100.
pub fn score_features(record: &ProductFeatures, candidate: &ProductFeatures) -> f64 {
    let (r, c) = (&record.name, &candidate.name);

    // ── Brand gate ───────────────────────────────────────────────────────
    match (&r.brand, &c.brand) {
        (Some(a), Some(b)) if a == b => {}
        _ => return 0.0,
    }

    let mut score = 0.0;

    // ── Strength ─────────────────────────────────────────────────────────
    score += if r.strengths.is_empty() {
        if c.strengths.is_empty() {
            STRENGTH_ALL
        } else {
            0.0
        }
    } else {
        let found = r.strengths.iter().filter(|s| c.strengths.contains(s)).count();
        if found == r.strengths.len() {
            STRENGTH_ALL
        } else if found > 0 {
            STRENGTH_SOME
        } else {
            0.0
        }
    };

    // ── Token similarity ─────────────────────────────────────────────────
    score += jaccard(&r.tokens, &c.tokens) * TOKEN_WEIGHT;

    // ── Packaging ────────────────────────────────────────────────────────
    if let (Some(rp), Some(cp)) = (&r.packaging, &c.packaging) {
        if rp.abbreviation == cp.abbreviation {
            score += if rp.quantity == cp.quantity {
                PACKAGING_EXACT
            } else {
                PACKAGING_ABBREVIATION
            };
        }
    }

    // ── Substring ────────────────────────────────────────────────────────
    if r.key.contains(c.key.as_str()) || c.key.contains(r.key.as_str()) {
        score += SUBSTRING_BONUS;
    }

    // ── Laboratory boost ─────────────────────────────────────────────────
    if let (Some(rl), Some(cl)) = (&record.laboratory, &candidate.laboratory) {
        if jaccard(rl, cl) * 100.0 > LABORATORY_SIMILARITY_MIN {
            score += LABORATORY_BOOST;
        }
    }

    score.min(MAX_SCORE)
}

/// Score a record name/laboratory against a candidate.
pub fn score(
    record_name: &str,
    record_laboratory: Option<&str>,
    candidate: &Candidate,
) -> f64 {
    score_features(
        &ProductFeatures::new(record_name, record_laboratory),
        &ProductFeatures::of_candidate(candidate),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, lab: Option<&str>) -> Candidate {
        Candidate {
            id: name.to_string(),
            name: name.to_string(),
            laboratory: lab.map(str::to_string),
            code: None,
        }
    }

    const RECORD: &str = "XARELTO 10mg Comp.Pell. Bt 30";

    #[test]
    fn identical_names_score_100() {
        let s = score(RECORD, None, &candidate("XARELTO 10mg Comp.Pell. Bt 30", None));
        assert_eq!(s, 100.0);
    }

    #[test]
    fn different_quantity_gets_partial_packaging_bonus() {
        let s = score(RECORD, None, &candidate("XARELTO 10mg Comp.Pell. Bt 90", None));
        // 40 strength + 4/6 × 40 tokens + 10 packaging
        assert!((70.0..90.0).contains(&s), "score {s}");
        assert!((s - (40.0 + 40.0 * 4.0 / 6.0 + 10.0)).abs() < 1e-9, "score {s}");
    }

    #[test]
    fn brand_gate_forces_zero() {
        let s = score(RECORD, None, &candidate("CARDOSYL 10mg Comp.Pell. Bt 30", None));
        assert_eq!(s, 0.0);
    }

    #[test]
    fn laboratory_boost_cannot_bypass_brand_gate() {
        let s = score(
            RECORD,
            Some("Bayer Pharma"),
            &candidate("CARDOSYL 10mg Comp.Pell. Bt 30", Some("BAYER PHARMA")),
        );
        assert_eq!(s, 0.0);
    }

    #[test]
    fn laboratory_boost_applies_above_threshold() {
        let name = "XARELTO 20mg Comp.Pell. Bt 28";
        let without = score(RECORD, Some("Bayer Pharma"), &candidate(name, Some("Saiph")));
        let with = score(RECORD, Some("Bayer Pharma"), &candidate(name, Some("BAYER PHARMA")));
        assert!(((with - without) - 10.0).abs() < 1e-9, "{with} vs {without}");
    }

    #[test]
    fn some_strengths_score_half() {
        let s_all = score("AUGMENTIN 1g/125mg Sachet", None, &candidate("AUGMENTIN 1g/125mg Sachet", None));
        let s_some = score("AUGMENTIN 1g/125mg Sachet", None, &candidate("AUGMENTIN 1g/62.5mg Sachet", None));
        assert!(s_some < s_all);
        // strength 20 + tokens 3/5 × 40
        assert!((s_some - (20.0 + 24.0)).abs() < 1e-9, "score {s_some}");
    }

    #[test]
    fn adding_matching_signals_never_decreases() {
        let base = score("ADOL Comp", None, &candidate("ADOL Sirop", None));
        let with_strength = score("ADOL 500mg Comp", None, &candidate("ADOL 500mg Sirop", None));
        let with_packaging = score("ADOL 500mg Comp Bt 20", None, &candidate("ADOL 500mg Sirop Bt 20", None));
        assert!(with_strength >= base, "{with_strength} < {base}");
        assert!(with_packaging >= with_strength, "{with_packaging} < {with_strength}");

        // Same tokens, strength and packaging; only the substring relation differs.
        let scrambled = score("ADOL 500mg Comp", None, &candidate("ADOL Forte 500mg Comp", None));
        let contained = score("ADOL 500mg Comp", None, &candidate("ADOL 500mg Comp Forte", None));
        assert!(((contained - scrambled) - 10.0).abs() < 1e-9, "{contained} vs {scrambled}");

        // Laboratories never lower a pair that passed the brand gate.
        let name = "ADOL 500mg Sirop Bt 20";
        let no_labs = score("ADOL 500mg Comp Bt 20", None, &candidate(name, None));
        let same_lab = score("ADOL 500mg Comp Bt 20", Some("Saiph"), &candidate(name, Some("SAIPH")));
        let other_lab = score("ADOL 500mg Comp Bt 20", Some("Saiph"), &candidate(name, Some("Adwya")));
        assert!(same_lab >= no_labs, "{same_lab} < {no_labs}");
        assert_eq!(other_lab, no_labs);
    }

    #[test]
    fn empty_names_score_zero() {
        assert_eq!(score("", None, &candidate("ADOL", None)), 0.0);
        assert_eq!(score("ADOL", None, &candidate("  ", None)), 0.0);
    }
}
