use nalgebra::Vector2;
use std::f32::consts::PI;

/// Wrap an angle (radians) into `[-π, π)`.
pub fn wrap_angle(a: f32) -> f32 {
    let two_pi = 2.0 * PI;
    let mut diff = a.rem_euclid(two_pi);
    if diff >= PI {
        diff -= two_pi;
    }
    diff
}

/// Dominant direction of a set of grid edges, defined modulo 90°.
///
/// Edge angles are multiplied by four so that all four axis directions of a
/// square grid vote for the same point on the unit circle. The result lies
/// in `[-π/4, π/4]`, i.e. it is the grid axis closest to the image x axis.
pub fn dominant_axis_angle<'a>(edges: impl IntoIterator<Item = &'a Vector2<f32>>) -> Option<f32> {
    let mut sum = Vector2::<f32>::zeros();
    let mut count = 0usize;
    for e in edges {
        let n = e.norm();
        if n <= f32::EPSILON {
            continue;
        }
        let four_theta = 4.0 * e.y.atan2(e.x);
        sum += Vector2::new(four_theta.cos(), four_theta.sin());
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f32;
    if mean.norm_squared() < 1e-4 {
        // Edge directions are spread uniformly, no grid structure.
        return None;
    }
    Some(0.25 * mean.y.atan2(mean.x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn wraps_into_half_open_interval() {
        assert!((wrap_angle(3.0 * PI) + PI).abs() < 1e-5);
        assert!((wrap_angle(-FRAC_PI_2) + FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn all_four_axis_directions_agree() {
        let theta = 0.2f32;
        let edges: Vec<Vector2<f32>> = (0..4)
            .map(|k| {
                let a = theta + k as f32 * FRAC_PI_2;
                Vector2::new(a.cos(), a.sin()) * (5.0 + k as f32)
            })
            .collect();
        let got = dominant_axis_angle(&edges).unwrap();
        assert!((got - theta).abs() < 1e-4, "got {got}");
    }

    #[test]
    fn no_edges_means_no_axis() {
        assert!(dominant_axis_angle(&[]).is_none());
    }
}
