//! JSON configuration files for the calibrate and analyze workflows.
//!
//! Every field has a default, so a config file only lists what it changes:
//!
//! ```json
//! { "tracker": { "locator": { "kind": "circle", "min_radius": 8 } },
//!   "output_unit": "meter" }
//! ```

use planar_kinematics_calib::CalibrationParams;
use planar_kinematics_chessboard::ChessboardParams;
use planar_kinematics_motion::{KinematicsParams, LengthUnit};
use planar_kinematics_plane::PlaneParams;
use planar_kinematics_track::TrackerParams;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateConfig {
    pub detector: ChessboardParams,
    pub calibration: CalibrationParams,
}

impl CalibrateConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json(path.as_ref())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_json(path.as_ref(), self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Reference-image detection and homography acceptance.
    pub plane: PlaneParams,
    pub tracker: TrackerParams,
    pub kinematics: KinematicsParams,
    /// Unit of the profile's square size.
    pub square_unit: LengthUnit,
    /// Unit of reported positions, speeds and accelerations.
    pub output_unit: LengthUnit,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            plane: PlaneParams::default(),
            tracker: TrackerParams::default(),
            kinematics: KinematicsParams::default(),
            square_unit: LengthUnit::Millimeter,
            output_unit: LengthUnit::Meter,
        }
    }
}

impl AnalysisConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json(path.as_ref())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_json(path.as_ref(), self)
    }
}
