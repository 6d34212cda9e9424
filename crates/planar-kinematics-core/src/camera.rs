//! Pinhole camera with the polynomial (Brown-Conrady) distortion model.
//!
//! Distortion coefficients follow the common `[k1, k2, p1, p2, k3]` order.
//! Undistortion keeps the original camera matrix as the output camera, so
//! an undistorted image has the same focal lengths and principal point.

use crate::image::{sample_bilinear_u8, GrayImage, GrayImageView};
use nalgebra::{Matrix3, Point2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Focal lengths and principal point in pixels (zero skew).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read fx, fy, cx, cy from a 3x3 camera matrix. Skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self {
            fx: rows[0][0],
            fy: rows[1][1],
            cx: rows[0][2],
            cy: rows[1][2],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx > 0.0
            && self.fy > 0.0
    }

    #[inline]
    pub fn normalized_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * p.x + self.cx, self.fy * p.y + self.cy)
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }
}

/// Radial (k1, k2, k3) and tangential (p1, p2) distortion coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn from_coefs(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn to_coefs(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.to_coefs().iter().all(|c| *c == 0.0)
    }
}

/// Apply lens distortion to a point on the normalized image plane.
#[inline]
pub fn distort_normalized(d: &Distortion, p: Point2<f64>) -> Point2<f64> {
    let (x, y) = (p.x, p.y);
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let radial = 1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6;
    let xd = x * radial + 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
    let yd = y * radial + d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
    Point2::new(xd, yd)
}

const UNDISTORT_ITERS: usize = 20;
const UNDISTORT_EPS: f64 = 1e-12;

/// Intrinsics plus distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a normalized (undistorted) point to distorted pixel coordinates.
    #[inline]
    pub fn project_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        self.intrinsics
            .normalized_to_pixel(distort_normalized(&self.distortion, p))
    }

    /// Map a distorted pixel to the pixel it would occupy in the undistorted
    /// image (same camera matrix).
    pub fn undistort_point(&self, pixel: Point2<f64>) -> Point2<f64> {
        let distorted = self.intrinsics.pixel_to_normalized(pixel);
        if self.distortion.is_zero() {
            return pixel;
        }
        // Fixed-point iteration: x = (xd - tangential(x)) / radial(x).
        let d = &self.distortion;
        let mut p = distorted;
        for _ in 0..UNDISTORT_ITERS {
            let (x, y) = (p.x, p.y);
            let r2 = x * x + y * y;
            let radial = 1.0 + d.k1 * r2 + d.k2 * r2 * r2 + d.k3 * r2 * r2 * r2;
            let dx = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
            let dy = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
            let next = Point2::new((distorted.x - dx) / radial, (distorted.y - dy) / radial);
            let step = (next - p).norm();
            p = next;
            if step < UNDISTORT_EPS {
                break;
            }
        }
        self.intrinsics.normalized_to_pixel(p)
    }
}

/// Precomputed remap table from undistorted pixels to source pixels.
///
/// Building the table is the expensive part; applying it is one bilinear
/// sample per pixel, so it is built once per image size and reused.
#[derive(Clone, Debug)]
pub struct UndistortMap {
    pub width: usize,
    pub height: usize,
    map: Vec<[f32; 2]>,
}

impl UndistortMap {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(camera), fields(width = width, height = height))
    )]
    pub fn new(camera: &CameraModel, width: usize, height: usize) -> Self {
        let mut map = vec![[0.0f32; 2]; width * height];
        map.par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let n = camera
                        .intrinsics
                        .pixel_to_normalized(Point2::new(x as f64, y as f64));
                    let src = camera.project_normalized(n);
                    *out = [src.x as f32, src.y as f32];
                }
            });
        Self { width, height, map }
    }

    /// Whether this table was built for images of the given size.
    pub fn matches(&self, width: usize, height: usize) -> bool {
        self.width == width && self.height == height
    }

    /// Source (distorted) coordinates for an undistorted pixel.
    pub fn source_of(&self, x: usize, y: usize) -> Option<[f32; 2]> {
        (x < self.width && y < self.height).then(|| self.map[y * self.width + x])
    }

    /// Remap `src` into an undistorted image. `src` must match the table size.
    pub fn apply(&self, src: &GrayImageView<'_>) -> Option<GrayImage> {
        if !self.matches(src.width, src.height) {
            return None;
        }
        let mut out = GrayImage::new(self.width, self.height);
        out.data
            .par_chunks_mut(self.width.max(1))
            .zip(self.map.par_chunks(self.width.max(1)))
            .for_each(|(dst, coords)| {
                for (d, [sx, sy]) in dst.iter_mut().zip(coords) {
                    *d = sample_bilinear_u8(src, *sx, *sy);
                }
            });
        Some(out)
    }
}

/// One-shot undistortion. Returns a plain copy when there is no distortion.
pub fn undistort_image(camera: &CameraModel, src: &GrayImageView<'_>) -> GrayImage {
    if camera.distortion.is_zero() {
        return src.to_owned_image();
    }
    let map = UndistortMap::new(camera, src.width, src.height);
    map.apply(src).unwrap_or_else(|| src.to_owned_image())
}
