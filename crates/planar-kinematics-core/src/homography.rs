use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Projective map between two planes: `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    /// Like [`Homography::apply`], but `None` for points mapped to infinity.
    #[inline]
    pub fn try_apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        let out = Point2::new(v[0] / v[2], v[1] / v[2]);
        (out.x.is_finite() && out.y.is_finite()).then_some(out)
    }

    pub fn inverse(&self) -> Option<Self> {
        let inv = self.h.try_inverse()?;
        let inv = normalize_homography(inv).unwrap_or(inv);
        inv.iter().all(|v| v.is_finite()).then_some(Self::new(inv))
    }
}

/// Homography estimate together with a scale-free quality measure.
#[derive(Clone, Copy, Debug)]
pub struct HomographyFit {
    pub homography: Homography,
    /// Ratio of the largest to the smallest singular value of the
    /// homography expressed between Hartley-normalized point sets.
    /// Near-degenerate configurations (e.g. collinear points) blow this up.
    pub condition_number: f64,
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // Hartley normalization: translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let cx = sx / n;
    let cy = sy / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);

    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

fn condition_number(hn: &Matrix3<f64>) -> f64 {
    let sv = hn.singular_values();
    let max = sv.max();
    let min = sv.min();
    if min <= f64::MIN_POSITIVE || !max.is_finite() {
        f64::INFINITY
    } else {
        max / min
    }
}

/// Estimate H such that `dst ~ H * src` and report its conditioning.
///
/// Uses all correspondences (normalized DLT + SVD). Exactly four points
/// go through the direct 8x8 solve instead.
pub fn fit_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<HomographyFit> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    let hn = if src.len() == 4 {
        solve_4pt_normalized(&s, &d)?
    } else {
        solve_dlt_normalized(&s, &d)?
    };
    let condition_number = condition_number(&hn);

    // Denormalize: H = Td^{-1} * Hn * Ts
    let h_den = denormalize_homography(hn, ts, td)?;
    let h_den = normalize_homography(h_den)?;
    if !h_den.iter().all(|v| v.is_finite()) {
        return None;
    }

    Some(HomographyFit {
        homography: Homography::new(h_den),
        condition_number,
    })
}

/// Estimate H such that `dst ~ H * src`.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    fit_homography(src, dst).map(|fit| fit.homography)
}

/// Compute H such that `dst ~ H * src` from exactly 4 correspondences.
///
/// Corner order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    estimate_homography(src, dst)
}

fn solve_dlt_normalized(s: &[Point2<f64>], d: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    // Build A (2N x 9)
    let n = s.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Ah = 0 -> h is the right singular vector of the smallest singular value.
    // Square up first so the SVD always yields a full 9x9 V.
    let ata = a.transpose() * &a;
    let svd = ata.svd(false, true);
    let vt = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = vt.row(min_idx);

    Some(Matrix3::<f64>::from_row_slice(&[
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8],
    ]))
}

fn solve_4pt_normalized(s: &[Point2<f64>], d: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    Some(Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    ))
}
