//! Candidate retrieval capability and an in-memory implementation.
//!
//! The matcher never scans a catalog. It asks a [`CandidateSource`] for
//! either one product by exact code or a bounded list filtered by
//! name prefix and/or laboratory substring. How the catalog is stored
//! (JSON file, relational table, remote service) is the source's business.

use crate::error::CirculaireError;
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// An external product as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Opaque reference into the external catalog.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub laboratory: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Search filter. Both string fields are matching keys (see [`normalize`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Candidate's normalized name must start with this.
    pub name_prefix: Option<String>,
    /// Candidate's normalized laboratory must contain this.
    pub laboratory_contains: Option<String>,
    /// Upper bound on returned candidates.
    pub limit: usize,
}

/// Read access to the product catalog.
///
/// Implementations return results in a stable order; ties between equal
/// scores are resolved by that order.
pub trait CandidateSource: Send + Sync {
    fn exact_code_lookup(&self, code: &str) -> Result<Option<Candidate>, CirculaireError>;

    fn search(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>, CirculaireError>;
}

/// Catalog held in memory, indexed by code and by sorted name key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Vec<Candidate>,
    name_keys: Vec<String>,
    lab_keys: Vec<Option<String>>,
    /// Product positions sorted by name key, for prefix range lookups.
    by_name: Vec<usize>,
    by_code: HashMap<String, usize>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Candidate>) -> Self {
        let name_keys: Vec<String> = products.iter().map(|p| normalize(&p.name)).collect();
        let lab_keys = products
            .iter()
            .map(|p| p.laboratory.as_deref().map(normalize))
            .collect();
        let mut by_name: Vec<usize> = (0..products.len()).collect();
        by_name.sort_by(|&a, &b| name_keys[a].cmp(&name_keys[b]).then(a.cmp(&b)));

        let mut by_code = HashMap::new();
        for (i, p) in products.iter().enumerate() {
            if let Some(code) = p.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                by_code.entry(code.to_string()).or_insert(i);
            }
        }

        Self {
            products,
            name_keys,
            lab_keys,
            by_name,
            by_code,
        }
    }

    /// Parse a JSON array of candidates.
    pub fn from_json(json: &str) -> Result<Self, CirculaireError> {
        let products: Vec<Candidate> = serde_json::from_str(json).map_err(|e| {
            CirculaireError::CandidateSourceUnavailable(format!("catalog JSON is invalid: {e}"))
        })?;
        Ok(Self::new(products))
    }

    /// Load a JSON catalog file.
    pub fn load(path: &Path) -> Result<Self, CirculaireError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CirculaireError::CandidateSourceUnavailable(format!(
                "cannot read catalog '{}': {e}",
                path.display()
            ))
        })?;
        let catalog = Self::from_json(&json)?;
        info!("Loaded {} catalog products from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    fn lab_matches(&self, i: usize, needle: Option<&str>) -> bool {
        match needle {
            None => true,
            Some(needle) => self.lab_keys[i]
                .as_deref()
                .is_some_and(|lab| lab.contains(needle)),
        }
    }
}

impl CandidateSource for InMemoryCatalog {
    fn exact_code_lookup(&self, code: &str) -> Result<Option<Candidate>, CirculaireError> {
        Ok(self
            .by_code
            .get(code.trim())
            .map(|&i| self.products[i].clone()))
    }

    fn search(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>, CirculaireError> {
        let lab = filter.laboratory_contains.as_deref();
        let mut hits: Vec<usize> = match filter.name_prefix.as_deref() {
            Some(prefix) => {
                let from = self
                    .by_name
                    .partition_point(|&i| self.name_keys[i].as_str() < prefix);
                self.by_name[from..]
                    .iter()
                    .copied()
                    .take_while(|&i| self.name_keys[i].starts_with(prefix))
                    .filter(|&i| self.lab_matches(i, lab))
                    .collect()
            }
            None => (0..self.products.len())
                .filter(|&i| self.lab_matches(i, lab))
                .collect(),
        };
        hits.sort_unstable();
        hits.truncate(filter.limit);
        Ok(hits.into_iter().map(|i| self.products[i].clone()).collect())
    }
}
