//! Sub-pixel corner refinement.
//!
//! For a saddle point `q`, the image gradient at every pixel `p` of a small
//! window is orthogonal to `p - q`. Stacking `g_p g_pᵀ (p - q) = 0` over the
//! window gives a 2x2 system that is solved repeatedly (fixed-point
//! iteration) until the update drops below `epsilon`.

use crate::params::CornerRefineParams;
use nalgebra::{Matrix2, Point2, Vector2};
use planar_kinematics_core::{sample_bilinear, GrayImageView};

/// Refine a coarse corner. Returns the input unchanged when the local
/// structure tensor is degenerate or the iteration walks out of its window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    coarse: Point2<f64>,
    params: &CornerRefineParams,
) -> Point2<f64> {
    let half = params.half_window as i32;
    if half == 0 {
        return coarse;
    }

    // Gaussian weights, sigma ~ half window.
    let weights: Vec<f64> = (-half..=half)
        .map(|k| {
            let t = k as f64 / half as f64;
            (-t * t).exp()
        })
        .collect();

    let eps2 = params.epsilon * params.epsilon;
    let mut q = coarse;

    for _ in 0..params.max_iters {
        let mut tensor = Matrix2::<f64>::zeros();
        let mut rhs = Vector2::<f64>::zeros();

        for (wy, dy) in weights.iter().zip(-half..=half) {
            for (wx, dx) in weights.iter().zip(-half..=half) {
                let px = q.x + dx as f64;
                let py = q.y + dy as f64;
                let (fx, fy) = (px as f32, py as f32);
                let gx = 0.5
                    * (sample_bilinear(img, fx + 1.0, fy) - sample_bilinear(img, fx - 1.0, fy))
                        as f64;
                let gy = 0.5
                    * (sample_bilinear(img, fx, fy + 1.0) - sample_bilinear(img, fx, fy - 1.0))
                        as f64;
                let w = wx * wy;
                let a = w * gx * gx;
                let b = w * gx * gy;
                let c = w * gy * gy;
                tensor[(0, 0)] += a;
                tensor[(0, 1)] += b;
                tensor[(1, 0)] += b;
                tensor[(1, 1)] += c;
                rhs[0] += a * px + b * py;
                rhs[1] += b * px + c * py;
            }
        }

        let det = tensor.determinant();
        if det.abs() <= 1e-9 * tensor.norm_squared().max(1.0) {
            break;
        }
        let Some(next) = tensor.try_inverse().map(|inv| inv * rhs) else {
            break;
        };
        let next = Point2::new(next[0], next[1]);
        let step2 = (next - q).norm_squared();
        q = next;
        if step2 <= eps2 {
            break;
        }
    }

    let drift = q - coarse;
    if !q.x.is_finite()
        || !q.y.is_finite()
        || drift.x.abs() > half as f64
        || drift.y.abs() > half as f64
    {
        return coarse;
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar_kinematics_core::GrayImage;

    /// Anti-aliased 2x2 checker with its saddle at `(sx, sy)`.
    fn saddle_image(sx: f64, sy: f64) -> GrayImage {
        let (w, h) = (40usize, 40usize);
        let ss = 8;
        let mut img = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0u32;
                for sy_i in 0..ss {
                    for sx_i in 0..ss {
                        let u = x as f64 + (sx_i as f64 + 0.5) / ss as f64 - 0.5;
                        let v = y as f64 + (sy_i as f64 + 0.5) / ss as f64 - 0.5;
                        let white = (u < sx) == (v < sy);
                        acc += if white { 230 } else { 25 };
                    }
                }
                img.set(x, y, (acc / (ss * ss) as u32) as u8);
            }
        }
        img
    }

    #[test]
    fn converges_to_subpixel_saddle() {
        let (sx, sy) = (19.3, 20.6);
        let img = saddle_image(sx, sy);
        let refined = refine_corner(
            &img.view(),
            Point2::new(20.0, 20.0),
            &CornerRefineParams::default(),
        );
        assert!((refined.x - sx).abs() < 0.1, "x {}", refined.x);
        assert!((refined.y - sy).abs() < 0.1, "y {}", refined.y);
    }

    #[test]
    fn flat_patch_keeps_coarse_corner() {
        let mut img = GrayImage::new(30, 30);
        img.data.fill(128);
        let p = Point2::new(15.0, 15.0);
        assert_eq!(refine_corner(&img.view(), p, &CornerRefineParams::default()), p);
    }
}
