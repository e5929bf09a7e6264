//! Product matching: circular record → catalog product.
//!
//! ## Staged narrowing
//!
//! ```text
//! record ─▶ 1. exact code ──hit──▶ matched (100)
//!              │ miss
//!              ▼
//!           2. brand prefix (≤100, lab-filtered when known) ─▶ score, keep best
//!              │ best < threshold
//!              ▼
//!           3. laboratory only (≤200) ─▶ score, keep best
//!              │
//!              ▼
//!           best ≥ threshold ? matched : not_found(best score)
//! ```
//!
//! Each stage runs only when the previous one produced nothing acceptable,
//! so a typical record costs one indexed lookup and one bounded query.
//! Ties keep the earlier stage, then the earlier candidate.

pub mod score;
pub mod source;

use crate::config::PipelineConfig;
use crate::error::CirculaireError;
use crate::normalize::normalize;
use crate::output::MedicationRecord;
use score::ProductFeatures;
use serde::{Deserialize, Serialize};
use source::{Candidate, CandidateFilter, CandidateSource};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    NotFound,
}

/// Stage that produced the best candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    ExactCode,
    Brand,
    Laboratory,
}

/// Outcome of matching one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub record: MedicationRecord,
    pub status: MatchStatus,
    /// Present only when `status` is `Matched`.
    pub candidate: Option<Candidate>,
    /// Best score observed, 0–100.
    pub confidence: f64,
    pub stage: Option<MatchStage>,
}

/// Staged matcher with its thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductMatcher {
    pub threshold: f64,
    pub brand_limit: usize,
    pub laboratory_limit: usize,
}

impl Default for ProductMatcher {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

struct Best {
    candidate: Candidate,
    score: f64,
    stage: MatchStage,
}

impl ProductMatcher {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            threshold: config.match_threshold,
            brand_limit: config.brand_candidate_limit,
            laboratory_limit: config.laboratory_candidate_limit,
        }
    }

    /// Match one record against `source`.
    ///
    /// Fails only when the source errors or breaks its contract; "no match"
    /// is a [`MatchStatus::NotFound`] result.
    pub fn match_record(
        &self,
        record: &MedicationRecord,
        source: &dyn CandidateSource,
    ) -> Result<MatchResult, CirculaireError> {
        // ── Stage 1: exact code ──────────────────────────────────────────
        if let Some(code) = record.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            if let Some(candidate) = source.exact_code_lookup(code)? {
                check_exact(code, &candidate)?;
                debug!("'{}' matched by code {}", record.name, code);
                return Ok(MatchResult {
                    record: record.clone(),
                    status: MatchStatus::Matched,
                    candidate: Some(candidate),
                    confidence: score::MAX_SCORE,
                    stage: Some(MatchStage::ExactCode),
                });
            }
        }

        let features = ProductFeatures::new(&record.name, record.laboratory.as_deref());
        let lab_key = record
            .laboratory
            .as_deref()
            .map(normalize)
            .filter(|l| !l.is_empty());
        let mut best: Option<Best> = None;

        // ── Stage 2: brand prefix ────────────────────────────────────────
        if let Some(brand) = features.name.brand.clone() {
            let mut filter = CandidateFilter {
                name_prefix: Some(brand),
                laboratory_contains: lab_key.clone(),
                limit: self.brand_limit,
            };
            let mut candidates = self.query(source, &filter)?;
            if candidates.is_empty() && filter.laboratory_contains.is_some() {
                filter.laboratory_contains = None;
                candidates = self.query(source, &filter)?;
            }
            consider(&mut best, &features, candidates, MatchStage::Brand);
        }

        // ── Stage 3: laboratory only ─────────────────────────────────────
        let best_score = best.as_ref().map_or(0.0, |b| b.score);
        if best_score < self.threshold {
            if let Some(lab) = lab_key {
                let filter = CandidateFilter {
                    name_prefix: None,
                    laboratory_contains: Some(lab),
                    limit: self.laboratory_limit,
                };
                let candidates = self.query(source, &filter)?;
                consider(&mut best, &features, candidates, MatchStage::Laboratory);
            }
        }

        // ── Rejection ────────────────────────────────────────────────────
        let result = match best {
            Some(b) if b.score >= self.threshold => MatchResult {
                record: record.clone(),
                status: MatchStatus::Matched,
                candidate: Some(b.candidate),
                confidence: b.score,
                stage: Some(b.stage),
            },
            other => MatchResult {
                record: record.clone(),
                status: MatchStatus::NotFound,
                candidate: None,
                confidence: other.map_or(0.0, |b| b.score),
                stage: None,
            },
        };
        debug!(
            "'{}' → {:?} ({:.1})",
            record.name, result.status, result.confidence
        );
        Ok(result)
    }

    /// Run `search` and enforce the limit.
    fn query(
        &self,
        source: &dyn CandidateSource,
        filter: &CandidateFilter,
    ) -> Result<Vec<Candidate>, CirculaireError> {
        let candidates = source.search(filter)?;
        if candidates.len() > filter.limit {
            return Err(CirculaireError::InvalidCandidateSource(format!(
                "search returned {} candidates for a limit of {}",
                candidates.len(),
                filter.limit
            )));
        }
        if let Some(bad) = candidates.iter().find(|c| c.name.trim().is_empty()) {
            return Err(CirculaireError::InvalidCandidateSource(format!(
                "candidate '{}' has an empty name",
                bad.id
            )));
        }
        Ok(candidates)
    }
}

/// An exact-code hit may omit its code, but must not carry a different one.
fn check_exact(code: &str, candidate: &Candidate) -> Result<(), CirculaireError> {
    match candidate.code.as_deref().map(str::trim) {
        Some(c) if c != code => Err(CirculaireError::InvalidCandidateSource(format!(
            "exact lookup for code {code} returned candidate '{}' with code {c}",
            candidate.id
        ))),
        _ => Ok(()),
    }
}

/// Score `candidates` and replace `best` only on a strictly higher score.
fn consider(
    best: &mut Option<Best>,
    features: &ProductFeatures,
    candidates: Vec<Candidate>,
    stage: MatchStage,
) {
    for candidate in candidates {
        let s = score::score_features(features, &ProductFeatures::of_candidate(&candidate));
        let better = match best {
            Some(b) => s > b.score,
            None => true,
        };
        if better {
            *best = Some(Best {
                candidate,
                score: s,
                stage,
            });
        }
    }
}

/// Match with default thresholds.
pub fn match_record(
    record: &MedicationRecord,
    source: &dyn CandidateSource,
) -> Result<MatchResult, CirculaireError> {
    ProductMatcher::default().match_record(record, source)
}
