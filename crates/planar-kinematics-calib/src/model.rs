use nalgebra::{Point2, Point3, Rotation3, Vector3};
use planar_kinematics_core::{CameraIntrinsics, CameraModel, Distortion};
use serde::{Deserialize, Serialize};

/// Pose of the pattern in the camera frame: `X_cam = R * X_board + t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    /// Rodrigues rotation vector (axis * angle, radians).
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
}

impl ViewPose {
    pub fn from_parts(rotation: &Rotation3<f64>, translation: Vector3<f64>) -> Self {
        let r = rotation.scaled_axis();
        Self {
            rotation: [r.x, r.y, r.z],
            translation: [translation.x, translation.y, translation.z],
        }
    }

    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::new(Vector3::from(self.rotation))
    }

    pub fn translation_vector(&self) -> Vector3<f64> {
        Vector3::from(self.translation)
    }

    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation_matrix() * p + self.translation_vector()
    }
}

/// Project a board point through pose, pinhole and distortion.
#[inline]
pub fn project(camera: &CameraModel, pose: &ViewPose, board: &Point2<f64>) -> Point2<f64> {
    let pc = pose.transform(&Point3::new(board.x, board.y, 0.0));
    camera.project_normalized(Point2::new(pc.x / pc.z, pc.y / pc.z))
}

/// Which distortion terms take part in the refinement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ParamLayout {
    pub tangential: bool,
    pub k3: bool,
}

pub(crate) const VIEW_PARAMS: usize = 6;

impl ParamLayout {
    /// fx, fy, cx, cy, k1, k2 [, p1, p2] [, k3]
    pub fn intrinsic_len(&self) -> usize {
        6 + if self.tangential { 2 } else { 0 } + usize::from(self.k3)
    }

    pub fn view_offset(&self, view: usize) -> usize {
        self.intrinsic_len() + view * VIEW_PARAMS
    }

    pub fn len(&self, views: usize) -> usize {
        self.view_offset(views)
    }

    pub fn pack(&self, camera: &CameraModel, poses: &[ViewPose]) -> Vec<f64> {
        let k = &camera.intrinsics;
        let d = &camera.distortion;
        let mut x = vec![k.fx, k.fy, k.cx, k.cy, d.k1, d.k2];
        if self.tangential {
            x.extend([d.p1, d.p2]);
        }
        if self.k3 {
            x.push(d.k3);
        }
        for pose in poses {
            x.extend(pose.rotation);
            x.extend(pose.translation);
        }
        x
    }

    pub fn unpack_camera(&self, x: &[f64]) -> CameraModel {
        let mut d = Distortion {
            k1: x[4],
            k2: x[5],
            ..Distortion::default()
        };
        let mut idx = 6;
        if self.tangential {
            d.p1 = x[idx];
            d.p2 = x[idx + 1];
            idx += 2;
        }
        if self.k3 {
            d.k3 = x[idx];
        }
        CameraModel::new(
            CameraIntrinsics {
                fx: x[0],
                fy: x[1],
                cx: x[2],
                cy: x[3],
            },
            d,
        )
    }

    pub fn unpack_pose(&self, x: &[f64], view: usize) -> ViewPose {
        let o = self.view_offset(view);
        ViewPose {
            rotation: [x[o], x[o + 1], x[o + 2]],
            translation: [x[o + 3], x[o + 4], x[o + 5]],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rodrigues_round_trips() {
        let rot = Rotation3::from_euler_angles(0.2, -0.3, 0.1);
        let pose = ViewPose::from_parts(&rot, Vector3::new(1.0, 2.0, 3.0));
        let back = pose.rotation_matrix();
        assert_relative_eq!(back.matrix(), rot.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn pack_unpack_respects_layout() {
        let camera = CameraModel::new(
            CameraIntrinsics {
                fx: 500.0,
                fy: 510.0,
                cx: 320.0,
                cy: 240.0,
            },
            Distortion::from_coefs([0.1, -0.2, 0.01, 0.02, 0.3]),
        );
        let pose = ViewPose {
            rotation: [0.1, 0.2, 0.3],
            translation: [4.0, 5.0, 6.0],
        };
        let layout = ParamLayout {
            tangential: false,
            k3: true,
        };
        let x = layout.pack(&camera, &[pose, pose]);
        assert_eq!(x.len(), layout.len(2));
        assert_eq!(layout.intrinsic_len(), 7);

        let cam = layout.unpack_camera(&x);
        assert_eq!(cam.distortion.k3, 0.3);
        // Fixed terms come back as zero.
        assert_eq!(cam.distortion.p1, 0.0);
        assert_eq!(layout.unpack_pose(&x, 1), pose);
    }

    #[test]
    fn projects_through_principal_point() {
        let camera = CameraModel::new(
            CameraIntrinsics {
                fx: 800.0,
                fy: 800.0,
                cx: 320.0,
                cy: 240.0,
            },
            Distortion::default(),
        );
        let pose = ViewPose {
            rotation: [0.0; 3],
            translation: [0.0, 0.0, 100.0],
        };
        let p = project(&camera, &pose, &Point2::new(10.0, 0.0));
        assert_relative_eq!(p.x, 400.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 240.0, epsilon = 1e-9);
    }
}
