//! Section headers and section breaks.
//!
//! A circular lists products under headers such as
//! `اختصاصات بشرية محلية (مراجعة أسعار)` ("local human specialties, price
//! revision"). Some text layers emit Arabic in visual order, which reverses
//! every word (`ةيلحم ةيرشب تاصاصتخا`), so each marker is matched in both
//! directions. Markers are fixed tokens; no fuzzy search happens here.

use crate::output::{Origin, RecordType, Specialty};
use once_cell::sync::Lazy;
use regex::Regex;

const SPECIALTIES_MARKERS: &[&str] = &["اختصاصات", "إختصاصات", "تاصاصتخا", "تاصاصتخإ"];
const HUMAN_MARKERS: &[&str] = &["بشري", "يرشب"];
const VETERINARY_MARKERS: &[&str] = &["بيطري", "يرطيب"];
const LOCAL_MARKERS: &[&str] = &["محلي", "يلحم"];
const IMPORTED_MARKERS: &[&str] = &["مستورد", "دروتسم"];
const REVISED_MARKERS: &[&str] = &["مراجعة", "مراجعه", "ةعجارم", "هعجارم"];

/// Notices that follow the price tables (withdrawals, renamings, ...).
static RE_SECTION_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)إعلام|ملعإ|قرار\s*سحب|بحس\s*رارق",
        r"|ARRET\s*DE\s*COMMERCIALISATION|CHANGEMENT\s*DE\s*DENOMINATION",
        r"|AVIS\s*DE\s*DISPONIBILITE|CHANGEMENT\s*DU\s*TABLEAU",
        r"|retrait\s*du\s*commerce|Lot\s*à\s*retirer",
    ))
    .unwrap()
});

/// Attributes every record of a section inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionKind {
    pub record_type: RecordType,
    pub specialty: Specialty,
    pub origin: Origin,
}

fn contains_any(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| line.contains(m))
}

/// Recognise a section header line.
///
/// Both the "specialties" marker and a specialty marker must be present;
/// the bare word also occurs in running prose.
pub fn detect_header(line: &str) -> Option<SectionKind> {
    if !contains_any(line, SPECIALTIES_MARKERS) {
        return None;
    }
    let specialty = if contains_any(line, VETERINARY_MARKERS) {
        Specialty::Veterinary
    } else if contains_any(line, HUMAN_MARKERS) {
        Specialty::Human
    } else {
        return None;
    };
    let origin = if contains_any(line, IMPORTED_MARKERS) {
        Origin::Imported
    } else if contains_any(line, LOCAL_MARKERS) {
        Origin::Local
    } else if specialty == Specialty::Veterinary {
        Origin::Imported
    } else {
        Origin::Local
    };
    let record_type = if contains_any(line, REVISED_MARKERS) {
        RecordType::Revised
    } else {
        RecordType::New
    };
    Some(SectionKind {
        record_type,
        specialty,
        origin,
    })
}

pub fn is_break(line: &str) -> bool {
    RE_SECTION_BREAK.is_match(line)
}
