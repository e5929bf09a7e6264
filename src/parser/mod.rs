//! Structural parser: normalized circular text → typed medication records.
//!
//! ## Two passes
//!
//! 1. **Header** ([`header`]): date and circular number from the preamble
//!    (everything before the first section header).
//! 2. **Blocks**: a line-by-line walk that tracks only the current section
//!    ([`sections`]) and the current laboratory ([`laboratory`]). Every
//!    other line is handed to the line rules ([`line`]) on its own; no
//!    record depends on a neighbouring line.
//!
//! A document without any section header is read as a single
//! new/human/local section, so bare price lists still parse.
//!
//! Parsing never fails. A missing header is flagged in
//! [`ParseDiagnostics::header_not_found`]; unrecognized lines are counted.

pub mod header;
pub mod laboratory;
pub mod line;
pub mod sections;

use crate::output::{MedicationRecord, ParseDiagnostics, ParseResult, SectionSummary};
use laboratory::LaboratoryAccumulator;
use sections::SectionKind;
use tracing::debug;

/// Parse normalized text (see [`crate::normalize::normalize_lines`]).
pub fn parse_records(text: &str) -> ParseResult {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let first_header = lines
        .iter()
        .position(|l| sections::detect_header(l).is_some());
    let preamble = lines[..first_header.unwrap_or(lines.len())].join("\n");
    let header = header::scan(&preamble, text);

    let mut walk = BlockWalk::default();
    if first_header.is_none() {
        walk.open_section(SectionKind::default());
    }
    for line in &lines[first_header.unwrap_or(0)..] {
        walk.feed(line);
    }

    let diagnostics = ParseDiagnostics {
        header_not_found: header.is_empty(),
        lines_seen: walk.lines_seen,
        lines_not_recognized: walk.lines_not_recognized,
    };
    debug!(
        "Parsed {} records in {} sections ({} of {} lines unrecognized)",
        walk.records.len(),
        walk.sections.len(),
        diagnostics.lines_not_recognized,
        diagnostics.lines_seen
    );

    ParseResult {
        date: header.date,
        circulaire_number: header.circulaire_number,
        records: walk.records,
        laboratories: walk.laboratories,
        sections: walk.sections,
        diagnostics,
    }
}

/// Number of lines the medication line rules accept.
///
/// Cheap structural check used to judge whether a text layer is usable.
pub fn count_medication_lines(text: &str) -> usize {
    text.lines()
        .filter(|l| line::parse_medication_line(l.trim()).is_some())
        .count()
}

// ── Block walk ───────────────────────────────────────────────────────────

#[derive(Default)]
struct BlockWalk {
    section: Option<SectionKind>,
    laboratory: Option<String>,
    pending_laboratory: LaboratoryAccumulator,
    records: Vec<MedicationRecord>,
    laboratories: Vec<String>,
    sections: Vec<SectionSummary>,
    lines_seen: usize,
    lines_not_recognized: usize,
}

impl BlockWalk {
    fn open_section(&mut self, kind: SectionKind) {
        self.section = Some(kind);
        self.laboratory = None;
        self.pending_laboratory.take();
        self.sections.push(SectionSummary {
            record_type: kind.record_type,
            specialty: kind.specialty,
            origin: kind.origin,
            medications_count: 0,
        });
    }

    fn feed(&mut self, text: &str) {
        if let Some(kind) = sections::detect_header(text) {
            debug!("Section header: {:?}", kind);
            self.open_section(kind);
            return;
        }
        if sections::is_break(text) {
            self.section = None;
            self.pending_laboratory.take();
            return;
        }
        let Some(kind) = self.section else {
            return;
        };
        self.lines_seen += 1;

        if laboratory::is_laboratory_line(text) {
            if let Some(done) = self.pending_laboratory.push(text) {
                self.laboratory = Some(done);
            }
            return;
        }
        if let Some(done) = self.pending_laboratory.take() {
            self.laboratory = Some(done);
        }

        let Some(fields) = line::parse_medication_line(text) else {
            self.lines_not_recognized += 1;
            return;
        };

        if let Some(lab) = &self.laboratory {
            if !self.laboratories.contains(lab) {
                self.laboratories.push(lab.clone());
            }
        }
        if let Some(summary) = self.sections.last_mut() {
            summary.medications_count += 1;
        }
        self.records.push(MedicationRecord {
            code: fields.code,
            name: fields.name,
            laboratory: self.laboratory.clone(),
            price_wholesale: fields.price_wholesale,
            price_pharmacy: fields.price_pharmacy,
            price_public: fields.price_public,
            price_public_calculated: false,
            category: fields.category,
            margin: fields.margin,
            record_type: kind.record_type,
            specialty: kind.specialty,
            origin: kind.origin,
        });
    }
}
