//! Output types: records, per-stage results and the document views.
//!
//! Every type here is plain data with `serde` derives, so a processed
//! circular can be written as JSON, diffed between runs, or loaded back by
//! a downstream importer without touching the pipeline.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Record enums ─────────────────────────────────────────────────────────

/// Reimbursement category printed after the public price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    A,
    B,
    C,
}

impl Category {
    /// Parse the single-letter marker (`A`, `B`, `C`).
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "A" => Some(Category::A),
            "B" => Some(Category::B),
            "C" => Some(Category::C),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::A => "A",
            Category::B => "B",
            Category::C => "C",
        };
        f.write_str(s)
    }
}

/// New listing or price revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    #[default]
    New,
    Revised,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specialty {
    #[default]
    Human,
    Veterinary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Local,
    Imported,
}

// ── Records ──────────────────────────────────────────────────────────────

/// One medication line of a circular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRecord {
    /// Six-digit product code, when printed.
    pub code: Option<String>,
    /// Display name as printed (strength, form and packaging included).
    pub name: String,
    /// Laboratory block the line belongs to.
    pub laboratory: Option<String>,
    pub price_wholesale: Option<f64>,
    pub price_pharmacy: Option<f64>,
    pub price_public: Option<f64>,
    /// `true` when `price_public` came from [`crate::pricing`].
    #[serde(default)]
    pub price_public_calculated: bool,
    pub category: Option<Category>,
    pub margin: Option<f64>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub specialty: Specialty,
    pub origin: Origin,
}

impl MedicationRecord {
    /// A record with only a name; every other field absent or default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            code: None,
            name: name.into(),
            laboratory: None,
            price_wholesale: None,
            price_pharmacy: None,
            price_public: None,
            price_public_calculated: false,
            category: None,
            margin: None,
            record_type: RecordType::default(),
            specialty: Specialty::default(),
            origin: Origin::default(),
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// How a page's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    TextLayer,
    Ocr,
    /// OCR failed or timed out; nothing usable was produced.
    Empty,
}

/// Per-page extraction summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExtraction {
    /// 1-indexed page number.
    pub page_num: usize,
    pub source: PageSource,
    pub chars: usize,
    pub duration_ms: u64,
}

/// Result of [`crate::pipeline::extract::Extractor::extract`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Normalized text, pages concatenated in page order.
    pub text: String,
    pub ocr_used: bool,
    pub page_count: usize,
    pub pages: Vec<PageExtraction>,
    /// Pages whose OCR failed or timed out.
    pub page_errors: Vec<PageError>,
}

impl ExtractionResult {
    /// Non-whitespace character count of the extracted text.
    pub fn usable_chars(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// A section of the circular and how many records it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub specialty: Specialty,
    pub origin: Origin,
    pub medications_count: usize,
}

/// Non-fatal parser observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseDiagnostics {
    /// Neither a date nor a circular number was found.
    pub header_not_found: bool,
    /// Lines inside sections that were looked at.
    pub lines_seen: usize,
    /// Lines that were neither laboratory names nor medication lines.
    pub lines_not_recognized: usize,
}

/// Result of [`crate::parser::parse_records`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// `YYYY-MM-DD`.
    pub date: Option<String>,
    /// `YYYY/NN`.
    pub circulaire_number: Option<String>,
    pub records: Vec<MedicationRecord>,
    /// Laboratories that own at least one record, first-seen order.
    pub laboratories: Vec<String>,
    pub sections: Vec<SectionSummary>,
    pub diagnostics: ParseDiagnostics,
}

// ── Document views ───────────────────────────────────────────────────────

/// Identity of a circular: where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentity {
    /// Circular number within the year, when fetched by index.
    pub index: Option<u32>,
    /// Two-digit year, when fetched by index.
    pub year: Option<u32>,
    pub filename: String,
}

impl DocumentIdentity {
    /// Identity for a local file or URL input.
    pub fn from_filename(filename: impl Into<String>) -> Self {
        Self {
            index: None,
            year: None,
            filename: filename.into(),
        }
    }

    /// Filename without its extension.
    pub fn stem(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }
}

/// The "parsed" view of a circular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCirculaire {
    pub filename: String,
    pub date: Option<String>,
    pub circulaire_number: Option<String>,
    pub medications: Vec<MedicationRecord>,
    pub laboratories: Vec<String>,
    pub sections_found: Vec<SectionSummary>,
}

/// Reduced medication projection of the simplified view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedMedication {
    pub code: Option<String>,
    pub name: String,
    pub sale_price: Option<f64>,
    pub pharmacy_price: Option<f64>,
    pub wholesale_price: Option<f64>,
    pub category: Option<Category>,
}

impl From<&MedicationRecord> for SimplifiedMedication {
    fn from(record: &MedicationRecord) -> Self {
        Self {
            code: record.code.clone(),
            name: record.name.clone(),
            sale_price: record.price_public,
            pharmacy_price: record.price_pharmacy,
            wholesale_price: record.price_wholesale,
            category: record.category,
        }
    }
}

/// Records of one (laboratory, type) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedEntry {
    pub date: Option<String>,
    /// Circular number, or the filename stem when the number is unknown.
    pub circulaire: String,
    pub laboratory: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub medications: Vec<SimplifiedMedication>,
}

/// Label used for records outside any laboratory block.
pub const UNKNOWN_LABORATORY: &str = "Unknown";

/// Extraction facts kept with a processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub ocr_used: bool,
    pub page_count: usize,
    pub page_errors: Vec<PageError>,
    pub diagnostics: ParseDiagnostics,
}

/// Everything produced for one circular.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedCirculaire {
    pub document: DocumentIdentity,
    pub extraction: ExtractionSummary,
    pub parsed: ParsedCirculaire,
    pub simplified: Vec<SimplifiedEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serialises_type_field_name() {
        let record = MedicationRecord {
            code: Some("303760".into()),
            category: Some(Category::B),
            record_type: RecordType::Revised,
            ..MedicationRecord::named("DIARETYL 2mg")
        };
        let json = serde_json::to_value(&record).expect("serialise");
        assert_eq!(json["type"], "revised");
        assert_eq!(json["category"], "B");
        assert_eq!(json["specialty"], "human");
        assert_eq!(json["origin"], "local");
    }

    #[test]
    fn simplified_projection_maps_prices() {
        let record = MedicationRecord {
            price_wholesale: Some(1.403),
            price_pharmacy: Some(1.526),
            price_public: Some(2.18),
            ..MedicationRecord::named("DIARETYL 2mg")
        };
        let simple = SimplifiedMedication::from(&record);
        assert_eq!(simple.sale_price, Some(2.18));
        assert_eq!(simple.pharmacy_price, Some(1.526));
        assert_eq!(simple.wholesale_price, Some(1.403));
    }

    #[test]
    fn identity_stem_strips_extension() {
        assert_eq!(DocumentIdentity::from_filename("circ0125.pdf").stem(), "circ0125");
        assert_eq!(DocumentIdentity::from_filename("noext").stem(), "noext");
    }

    #[test]
    fn category_marker_parsing() {
        assert_eq!(Category::from_marker("A"), Some(Category::A));
        assert_eq!(Category::from_marker("-"), None);
        assert_eq!(Category::C.to_string(), "C");
    }
}
