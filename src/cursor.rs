//! Processing cursor: the highest circular index processed per year.
//!
//! Range runs consult the cursor before fetching so circulars that were
//! already processed are skipped, and advance it after each success. The
//! pipeline itself stays stateless; the cursor is owned by the caller.

use crate::error::CirculaireError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Durable record of progress through each year's circulars.
pub trait ProcessingCursor: Send + Sync {
    /// Highest index processed for `year`, if any.
    fn last_processed(&self, year: u32) -> Result<Option<u32>, CirculaireError>;

    /// Record `index` as processed. Never moves the cursor backwards.
    fn advance(&self, year: u32, index: u32) -> Result<(), CirculaireError>;
}

fn raise(map: &mut BTreeMap<u32, u32>, year: u32, index: u32) -> bool {
    let slot = map.entry(year).or_insert(0);
    if index > *slot {
        *slot = index;
        true
    } else {
        false
    }
}

/// Cursor held in memory; forgets everything on drop.
#[derive(Debug, Default)]
pub struct InMemoryCursor {
    positions: Mutex<BTreeMap<u32, u32>>,
}

impl InMemoryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<u32, u32>>, CirculaireError> {
        self.positions
            .lock()
            .map_err(|_| CirculaireError::Internal("cursor lock poisoned".to_string()))
    }
}

impl ProcessingCursor for InMemoryCursor {
    fn last_processed(&self, year: u32) -> Result<Option<u32>, CirculaireError> {
        Ok(self.lock()?.get(&year).copied().filter(|&i| i > 0))
    }

    fn advance(&self, year: u32, index: u32) -> Result<(), CirculaireError> {
        raise(&mut *self.lock()?, year, index);
        Ok(())
    }
}

/// Cursor persisted as a JSON object `{"25": 12, "24": 40}`.
///
/// Every advance rewrites the file atomically (temp file + rename), so a
/// crash mid-run never leaves a truncated cursor behind.
#[derive(Debug)]
pub struct JsonFileCursor {
    path: PathBuf,
    positions: Mutex<BTreeMap<u32, u32>>,
}

impl JsonFileCursor {
    /// Load the cursor at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CirculaireError> {
        let path = path.into();
        let positions = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| CirculaireError::CursorStoreFailed {
                path: path.clone(),
                reason: format!("invalid JSON: {e}"),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CirculaireError::CursorStoreFailed {
                    path,
                    reason: e.to_string(),
                })
            }
        };
        debug!("Cursor {} loaded: {:?}", path.display(), positions);
        Ok(Self {
            path,
            positions: Mutex::new(positions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failed(&self, reason: impl Into<String>) -> CirculaireError {
        CirculaireError::CursorStoreFailed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn save(&self, positions: &BTreeMap<u32, u32>) -> Result<(), CirculaireError> {
        let json = serde_json::to_string_pretty(positions).map_err(|e| self.failed(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.failed(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.failed(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.failed(e.to_string()))
    }
}

impl ProcessingCursor for JsonFileCursor {
    fn last_processed(&self, year: u32) -> Result<Option<u32>, CirculaireError> {
        let positions = self
            .positions
            .lock()
            .map_err(|_| self.failed("cursor lock poisoned"))?;
        Ok(positions.get(&year).copied().filter(|&i| i > 0))
    }

    fn advance(&self, year: u32, index: u32) -> Result<(), CirculaireError> {
        let mut positions = self
            .positions
            .lock()
            .map_err(|_| self.failed("cursor lock poisoned"))?;
        if raise(&mut *positions, year, index) {
            self.save(&*positions)?;
        }
        Ok(())
    }
}
