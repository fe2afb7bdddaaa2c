//! Threshold persistence in `store.json`.
//!
//! The file is a pretty-printed JSON object. Keys other than
//! `fullcharged` and `notcharged` belong to other tools and are written
//! back untouched.

use elocker_core::Thresholds;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;

#[derive(Debug, Default, Deserialize, Serialize)]
struct StoreFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fullcharged: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    notcharged: Option<f64>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// File-backed threshold store.
#[derive(Debug, Clone)]
pub struct ThresholdStore {
    path: PathBuf,
}

impl ThresholdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load thresholds, filling missing or unusable values with defaults,
    /// and write the result back so the file always holds both keys.
    pub fn load_or_init(&self) -> Result<Thresholds, StoreError> {
        let mut file = self.read()?;
        let defaults = Thresholds::default();

        let thresholds = Thresholds::new(
            usable(file.fullcharged, "fullcharged").unwrap_or(defaults.fullcharged_ma),
            usable(file.notcharged, "notcharged").unwrap_or(defaults.notcharged_ma),
        )
        .unwrap_or(defaults);

        file.fullcharged = Some(thresholds.fullcharged_ma);
        file.notcharged = Some(thresholds.notcharged_ma);
        self.write(&file)?;

        info!(path = %self.path.display(), %thresholds, "Loaded thresholds");
        Ok(thresholds)
    }

    /// Persist new thresholds, keeping every other key in the file.
    pub fn save(&self, thresholds: &Thresholds) -> Result<(), StoreError> {
        let mut file = self.read()?;
        file.fullcharged = Some(thresholds.fullcharged_ma);
        file.notcharged = Some(thresholds.notcharged_ma);
        self.write(&file)?;
        debug!(path = %self.path.display(), "Saved thresholds");
        Ok(())
    }

    fn read(&self) -> Result<StoreFile, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &StoreFile) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Zero or negative stored values fall back to the default.
fn usable(value: Option<f64>, key: &str) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Some(v),
        Some(v) => {
            warn!(key, value = v, "Ignoring stored threshold");
            None
        }
        None => None,
    }
}
