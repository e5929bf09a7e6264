//! Public-price inference from the pharmacy price.
//!
//! Circulars list the wholesale and pharmacy prices of every product, but
//! the public (retail) price column is frequently missing for new entries.
//! The regulated retail markup is degressive: the cheaper the product, the
//! larger the ratio. The tier table below reproduces the observed ratios.

use crate::output::MedicationRecord;

/// One markup tier: applies when the pharmacy price is ≥ `lower_bound`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTier {
    pub lower_bound: f64,
    pub ratio: f64,
}

/// Tiers ordered highest bound first; the first satisfied tier wins.
pub const PRICE_TIERS: [PriceTier; 4] = [
    PriceTier {
        lower_bound: 25.0,
        ratio: 1.316,
    },
    PriceTier {
        lower_bound: 8.0,
        ratio: 1.351,
    },
    PriceTier {
        lower_bound: 3.0,
        ratio: 1.389,
    },
    PriceTier {
        lower_bound: 0.0,
        ratio: 1.429,
    },
];

/// Markup ratio for a (positive) pharmacy price.
pub fn markup_ratio(pharmacy_price: f64) -> f64 {
    PRICE_TIERS
        .iter()
        .find(|tier| pharmacy_price >= tier.lower_bound)
        .map(|tier| tier.ratio)
        .unwrap_or(PRICE_TIERS[PRICE_TIERS.len() - 1].ratio)
}

/// Infer the public price, rounded to 2 decimals.
///
/// Absent, zero, negative or non-finite pharmacy prices yield `None`.
pub fn infer_public_price(pharmacy_price: Option<f64>) -> Option<f64> {
    let price = pharmacy_price.filter(|p| p.is_finite() && *p > 0.0)?;
    Some(round2(price * markup_ratio(price)))
}

/// Fill `price_public` when it is missing; records with a public price are untouched.
pub fn apply(mut record: MedicationRecord) -> MedicationRecord {
    if record.price_public.is_none() {
        if let Some(public) = infer_public_price(record.price_pharmacy) {
            record.price_public = Some(public);
            record.price_public_calculated = true;
        }
    }
    record
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
