use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Number of *inner* corners of a checker pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    pub rows: usize,
    pub cols: usize,
}

impl PatternSize {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Expected number of corners, `rows * cols`.
    pub fn count(&self) -> usize {
        self.rows * self.cols
    }

    /// A pattern needs at least a 2x2 grid to define two axes.
    pub fn is_valid(&self) -> bool {
        self.rows >= 2 && self.cols >= 2
    }

    /// Row-major index of the corner at `(col, row)`.
    #[inline]
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }
}

/// Image resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

/// Detected pattern corners in row-major order matching [`world_grid`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub points: Vec<Point2<f64>>,
}

impl CornerSet {
    pub fn new(points: Vec<Point2<f64>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when the cardinality matches the pattern.
    pub fn matches(&self, pattern: PatternSize) -> bool {
        self.points.len() == pattern.count()
    }
}

/// Planar pattern coordinates `(col, row) * square_size`, row-major.
///
/// The x axis runs along a row (cols), the y axis down the columns (rows).
pub fn world_grid(pattern: PatternSize, square_size: f64) -> Vec<Point2<f64>> {
    (0..pattern.rows)
        .flat_map(|r| {
            (0..pattern.cols)
                .map(move |c| Point2::new(c as f64 * square_size, r as f64 * square_size))
        })
        .collect()
}
