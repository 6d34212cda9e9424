//! Glue between frame views and `imageproc`.

use image::{GrayImage as LumaImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::region_labelling::{connected_components, Connectivity};
use nalgebra::Point2;
use planar_kinematics_core::GrayImageView;

/// Copy a frame into an `image` buffer. `None` when the view is empty or
/// shorter than `width * height`.
pub(crate) fn to_luma(frame: &GrayImageView<'_>) -> Option<LumaImage> {
    let n = frame.width.checked_mul(frame.height)?;
    if n == 0 || frame.data.len() < n {
        return None;
    }
    LumaImage::from_raw(frame.width as u32, frame.height as u32, frame.data[..n].to_vec())
}

/// Sigma of a Gaussian with the given odd kernel size, the usual
/// `0.3 * ((k - 1) / 2 - 1) + 0.8` rule.
pub(crate) fn kernel_sigma(kernel: usize) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian pre-blur; kernels of 1 or less leave the image as is.
pub(crate) fn presmooth(img: &LumaImage, kernel: usize) -> LumaImage {
    if kernel <= 1 {
        return img.clone();
    }
    gaussian_blur_f32(img, kernel_sigma(kernel))
}

/// Pixel statistics of one 8-connected foreground region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Region {
    pub area: usize,
    sum_x: f64,
    sum_y: f64,
}

impl Region {
    pub fn centroid(&self) -> Point2<f64> {
        Point2::new(self.sum_x / self.area as f64, self.sum_y / self.area as f64)
    }
}

/// Label the non-zero pixels of `mask` and collect per-region statistics,
/// in label order.
pub(crate) fn regions(mask: &LumaImage) -> Vec<Region> {
    let labels: ImageBuffer<Luma<u32>, Vec<u32>> =
        connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut out: Vec<Region> = Vec::new();
    for (x, y, px) in labels.enumerate_pixels() {
        let label = px[0] as usize;
        if label == 0 {
            continue;
        }
        if out.len() < label {
            out.resize(
                label,
                Region {
                    area: 0,
                    sum_x: 0.0,
                    sum_y: 0.0,
                },
            );
        }
        let r = &mut out[label - 1];
        r.area += 1;
        r.sum_x += x as f64;
        r.sum_y += y as f64;
    }
    out
}

/// Largest region whose area lies in `min_area..=max_area`.
pub(crate) fn largest_region(mask: &LumaImage, min_area: usize, max_area: usize) -> Option<Region> {
    regions(mask)
        .into_iter()
        .filter(|r| (min_area..=max_area).contains(&r.area))
        .max_by_key(|r| r.area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar_kinematics_core::GrayImage;

    #[test]
    fn short_or_empty_views_do_not_convert() {
        let img = GrayImage::new(4, 3);
        assert!(to_luma(&img.view()).is_some());
        let short = GrayImageView {
            width: 4,
            height: 3,
            data: &img.data[..11],
        };
        assert!(to_luma(&short).is_none());
        assert!(to_luma(&GrayImage::new(0, 3).view()).is_none());
    }

    #[test]
    fn kernel_sigma_matches_common_sizes() {
        assert!((kernel_sigma(3) - 0.8).abs() < 1e-6);
        assert!((kernel_sigma(5) - 1.1).abs() < 1e-6);
    }

    #[test]
    fn regions_are_eight_connected() {
        let mut mask = LumaImage::new(10, 8);
        // Diagonal pair joins; the isolated square does not.
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(2, 2, Luma([255]));
        for y in 4..7 {
            for x in 5..8 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let mut areas: Vec<usize> = regions(&mask).iter().map(|r| r.area).collect();
        areas.sort_unstable();
        assert_eq!(areas, vec![2, 9]);

        let big = largest_region(&mask, 3, 100).unwrap();
        let c = big.centroid();
        assert!((c.x - 6.0).abs() < 1e-12 && (c.y - 5.0).abs() < 1e-12);
        assert!(largest_region(&mask, 10, 100).is_none());
    }
}
