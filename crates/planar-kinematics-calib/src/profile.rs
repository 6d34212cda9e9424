use nalgebra::Matrix3;
use planar_kinematics_core::{CameraIntrinsics, CameraModel, Distortion, ImageSize, PatternSize};
use serde::{Deserialize, Serialize};

/// A saved camera calibration.
///
/// Immutable once stored: later sessions read it to build a
/// [`CameraModel`] and the physical scale of the pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub name: String,
    /// Row-major 3x3 intrinsic matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// `[k1, k2, p1, p2, k3]`.
    pub dist_coefs: [f64; 5],
    /// Side of one pattern square in the user's length unit.
    pub square_size: f64,
    pub pattern_size: PatternSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
    /// RMS reprojection error of the calibration run, pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("profile name is empty")]
    EmptyName,
    #[error("profile {0:?}: camera matrix is not a valid pinhole matrix")]
    InvalidCameraMatrix(String),
    #[error("profile {0:?}: distortion coefficients are not finite")]
    InvalidDistortion(String),
    #[error("profile {name:?}: square size must be positive, got {square_size}")]
    InvalidSquareSize { name: String, square_size: f64 },
    #[error("profile {name:?}: invalid pattern size {rows}x{cols}")]
    InvalidPattern {
        name: String,
        rows: usize,
        cols: usize,
    },
}

impl CalibrationProfile {
    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics::from_array(self.camera_matrix)
    }

    pub fn camera_model(&self) -> CameraModel {
        CameraModel::new(self.intrinsics(), Distortion::from_coefs(self.dist_coefs))
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        self.intrinsics().matrix()
    }

    /// Structural checks run by stores before persisting.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        let k = self.camera_matrix;
        let shape_ok = k[1][0] == 0.0 && k[2][0] == 0.0 && k[2][1] == 0.0 && k[2][2] == 1.0;
        if !shape_ok || !self.intrinsics().is_valid() {
            return Err(ProfileError::InvalidCameraMatrix(self.name.clone()));
        }
        if self.dist_coefs.iter().any(|c| !c.is_finite()) {
            return Err(ProfileError::InvalidDistortion(self.name.clone()));
        }
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return Err(ProfileError::InvalidSquareSize {
                name: self.name.clone(),
                square_size: self.square_size,
            });
        }
        if !self.pattern_size.is_valid() {
            return Err(ProfileError::InvalidPattern {
                name: self.name.clone(),
                rows: self.pattern_size.rows,
                cols: self.pattern_size.cols,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CalibrationProfile {
        CalibrationProfile {
            name: "bench".to_string(),
            camera_matrix: [[800.0, 0.0, 320.0], [0.0, 780.0, 240.0], [0.0, 0.0, 1.0]],
            dist_coefs: [-0.1, 0.02, 0.0, 0.0, 0.0],
            square_size: 25.0,
            pattern_size: PatternSize::new(6, 9),
            image_size: None,
            rms: Some(0.21),
        }
    }

    #[test]
    fn camera_model_reads_k1_k2_p1_p2_k3() {
        let cam = profile().camera_model();
        assert_eq!(cam.intrinsics.fy, 780.0);
        assert_eq!(cam.distortion.k1, -0.1);
        assert_eq!(cam.distortion.k2, 0.02);
    }

    #[test]
    fn json_omits_absent_optionals() {
        let json = serde_json::to_value(profile()).unwrap();
        assert!(json.get("image_size").is_none());
        assert_eq!(json["rms"], 0.21);
        let back: CalibrationProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile());
    }

    #[test]
    fn validate_rejects_bad_records() {
        assert!(profile().validate().is_ok());

        let mut p = profile();
        p.name = "  ".into();
        assert_eq!(p.validate(), Err(ProfileError::EmptyName));

        let mut p = profile();
        p.camera_matrix[2][2] = 0.0;
        assert!(matches!(
            p.validate(),
            Err(ProfileError::InvalidCameraMatrix(_))
        ));

        let mut p = profile();
        p.square_size = 0.0;
        assert!(matches!(
            p.validate(),
            Err(ProfileError::InvalidSquareSize { .. })
        ));
    }
}
