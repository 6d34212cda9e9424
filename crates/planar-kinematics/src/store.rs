//! Persistence of [`CalibrationProfile`]s.
//!
//! [`JsonProfileStore`] keeps one JSON object keyed by camera name, the
//! layout of the legacy `calibration_db.json`:
//!
//! ```json
//! {
//!     "bench": {
//!         "camera_matrix": [[800.0, 0.0, 320.0], [0.0, 780.0, 240.0], [0.0, 0.0, 1.0]],
//!         "dist_coefs": [[-0.1, 0.02, 0.0, 0.0, 0.0]],
//!         "square_size": 25.0,
//!         "pattern_size": [9, 6]
//!     }
//! }
//! ```
//!
//! `pattern_size` is `[cols, rows]`. `dist_coefs` may be flat or nested
//! one level; fewer than five coefficients are zero-padded.

use log::{debug, warn};
use planar_kinematics_calib::{CalibrationProfile, ProfileError};
use planar_kinematics_core::{ImageSize, PatternSize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("profile {0:?} already exists; remove it first")]
    AlreadyExists(String),

    #[error("profile {0:?} not found")]
    NotFound(String),

    #[error(transparent)]
    Invalid(#[from] ProfileError),

    #[error("profile {name:?} in {path}: {reason}")]
    Malformed {
        path: PathBuf,
        name: String,
        reason: String,
    },

    #[error("failed to access profile database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile database {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Whole-record profile persistence. Profiles are never updated in place.
pub trait ProfileStore {
    /// `Ok(None)` when no profile has this name.
    fn load(&self, name: &str) -> Result<Option<CalibrationProfile>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] when the name is taken.
    fn save(&mut self, profile: &CalibrationProfile) -> Result<(), StoreError>;

    fn remove(&mut self, name: &str) -> Result<(), StoreError>;

    /// Sorted profile names.
    fn names(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryProfileStore {
    profiles: BTreeMap<String, CalibrationProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, name: &str) -> Result<Option<CalibrationProfile>, StoreError> {
        Ok(self.profiles.get(name).cloned())
    }

    fn save(&mut self, profile: &CalibrationProfile) -> Result<(), StoreError> {
        profile.validate()?;
        if self.profiles.contains_key(&profile.name) {
            return Err(StoreError::AlreadyExists(profile.name.clone()));
        }
        self.profiles.insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StoreError> {
        self.profiles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.profiles.keys().cloned().collect())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Coefs {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl Coefs {
    fn flatten(self) -> Vec<f64> {
        match self {
            Coefs::Flat(v) => v,
            Coefs::Nested(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

/// One entry of the database file.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Record {
    camera_matrix: [[f64; 3]; 3],
    dist_coefs: Coefs,
    square_size: f64,
    /// `[cols, rows]`
    pattern_size: [usize; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_size: Option<ImageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rms: Option<f64>,
}

impl Record {
    fn from_profile(p: &CalibrationProfile) -> Self {
        Self {
            camera_matrix: p.camera_matrix,
            dist_coefs: Coefs::Nested(vec![p.dist_coefs.to_vec()]),
            square_size: p.square_size,
            pattern_size: [p.pattern_size.cols, p.pattern_size.rows],
            image_size: p.image_size,
            rms: p.rms,
        }
    }

    fn into_profile(self, name: &str, path: &Path) -> Result<CalibrationProfile, StoreError> {
        let coefs = self.dist_coefs.flatten();
        if coefs.len() > 5 {
            if coefs[5..].iter().any(|&c| c != 0.0) {
                return Err(StoreError::Malformed {
                    path: path.to_path_buf(),
                    name: name.to_string(),
                    reason: format!(
                        "{} distortion coefficients; only [k1, k2, p1, p2, k3] are supported",
                        coefs.len()
                    ),
                });
            }
            warn!("profile {name:?}: ignoring {} zero trailing coefficients", coefs.len() - 5);
        }
        let mut dist_coefs = [0.0; 5];
        for (dst, src) in dist_coefs.iter_mut().zip(&coefs) {
            *dst = *src;
        }
        let [cols, rows] = self.pattern_size;
        Ok(CalibrationProfile {
            name: name.to_string(),
            camera_matrix: self.camera_matrix,
            dist_coefs,
            square_size: self.square_size,
            pattern_size: PatternSize::new(rows, cols),
            image_size: self.image_size,
            rms: self.rms,
        })
    }
}

/// Profile database in a single JSON file.
///
/// Every call reads the file; `save` and `remove` rewrite it through a
/// temporary sibling file. A missing file is an empty database.
#[derive(Clone, Debug)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, Record>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(self.io_err(err)),
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn write_all(&self, records: &BTreeMap<String, Record>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        debug!("wrote {} profiles to {}", records.len(), self.path.display());
        Ok(())
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self, name: &str) -> Result<Option<CalibrationProfile>, StoreError> {
        let mut records = self.read_all()?;
        records
            .remove(name)
            .map(|record| record.into_profile(name, &self.path))
            .transpose()
    }

    fn save(&mut self, profile: &CalibrationProfile) -> Result<(), StoreError> {
        profile.validate()?;
        let mut records = self.read_all()?;
        if records.contains_key(&profile.name) {
            return Err(StoreError::AlreadyExists(profile.name.clone()));
        }
        records.insert(profile.name.clone(), Record::from_profile(profile));
        self.write_all(&records)
    }

    fn remove(&mut self, name: &str) -> Result<(), StoreError> {
        let mut records = self.read_all()?;
        if records.remove(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.write_all(&records)
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_all()?.into_keys().collect())
    }
}
