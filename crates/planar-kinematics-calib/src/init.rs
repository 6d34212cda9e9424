//! Closed-form initial estimates: intrinsics from plane homographies and
//! per-view poses from `K^-1 H`.

use crate::model::ViewPose;
use log::{debug, warn};
use nalgebra::{DMatrix, Matrix3, Rotation3, SVector};
use planar_kinematics_core::{CameraIntrinsics, ImageSize};

/// Conditioning transform mapping the image to roughly `[-1, 1]^2`.
fn image_normalization(size: ImageSize) -> Matrix3<f64> {
    let s = 2.0 / (size.width + size.height) as f64;
    let cx = 0.5 * size.width as f64;
    let cy = 0.5 * size.height as f64;
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Build the 6-vector v_ij(H) of the absolute-conic constraints.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Closed-form intrinsics from at least three plane homographies
/// (board -> pixels). Skew is estimated but dropped from the result.
pub fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
    size: ImageSize,
) -> Option<CameraIntrinsics> {
    if homographies.len() < 3 {
        return None;
    }
    let n = image_normalization(size);

    let m = homographies.len();
    let mut v = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        let hn = n * h;
        let hn = hn / hn.norm();
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        let v12 = v_ij(&hn, 0, 1);
        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let vtv = v.transpose() * &v;
    let svd = vtv.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let b = v_t.row(min_idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() < 1e-12 * (b11 * b11 + b22 * b22).max(f64::MIN_POSITIVE) {
        return None;
    }
    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return None;
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k_norm = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let k = n.try_inverse()? * k_norm;
    let intrinsics = CameraIntrinsics::from_matrix(&k);
    debug!(
        "closed-form intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
    );
    intrinsics.is_valid().then_some(intrinsics)
}

/// Fallback for one or two views: principal point at the image center,
/// square pixels, focal length from the orthogonality of `r1` and `r2`.
pub fn focal_from_homographies(homographies: &[Matrix3<f64>], size: ImageSize) -> CameraIntrinsics {
    let cx = 0.5 * size.width as f64;
    let cy = 0.5 * size.height as f64;
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    // Each constraint reads a * w + b = 0 with w = 1 / f^2.
    let mut num = 0.0;
    let mut den = 0.0;
    for h in homographies {
        let hs = shift * h;
        let hs = hs / hs.norm();
        let (h11, h21, h31) = (hs[(0, 0)], hs[(1, 0)], hs[(2, 0)]);
        let (h12, h22, h32) = (hs[(0, 1)], hs[(1, 1)], hs[(2, 1)]);
        let constraints = [
            (h11 * h12 + h21 * h22, h31 * h32),
            (
                h11 * h11 + h21 * h21 - h12 * h12 - h22 * h22,
                h31 * h31 - h32 * h32,
            ),
        ];
        for (a, b) in constraints {
            num -= a * b;
            den += a * a;
        }
    }

    let fallback = (size.width.max(size.height)) as f64;
    let f = if den > 0.0 && num / den > 0.0 {
        (den / num).sqrt()
    } else {
        f64::NAN
    };
    let f = if f.is_finite() && f > 0.05 * fallback && f < 50.0 * fallback {
        f
    } else {
        warn!("focal length is unobservable from the given views, using {fallback:.1} px");
        fallback
    };

    CameraIntrinsics {
        fx: f,
        fy: f,
        cx,
        cy,
    }
}

/// Decompose a board-to-image homography into a pose given intrinsics.
///
/// The board is assumed to lie in front of the camera (`t_z > 0`).
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<ViewPose> {
    let k_inv = k.try_inverse()?;

    let k_inv_h1 = k_inv * h.column(0);
    let k_inv_h2 = k_inv * h.column(1);
    let k_inv_h3 = k_inv * h.column(2);

    // Scale factor: normalize first two columns (average for robustness)
    let norm = 0.5 * (k_inv_h1.norm() + k_inv_h2.norm());
    if norm <= f64::MIN_POSITIVE {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if (lambda * k_inv_h3).z < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);
    let mut r = Matrix3::<f64>::zeros();
    r.set_column(0, &r1);
    r.set_column(1, &r2);
    r.set_column(2, &r3);

    // Project onto SO(3) (polar decomposition via SVD)
    let svd = r.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t = lambda * k_inv_h3;
    if !t.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(ViewPose::from_parts(
        &Rotation3::from_matrix_unchecked(r_orth),
        t,
    ))
}
