use crate::background::{BackgroundParams, BackgroundSubtractionLocator};
use crate::blob::{BlobLocator, BlobParams};
use crate::circle::{CircleLocator, CircleParams};
use crate::contour::{ContourLocator, ContourParams};
use nalgebra::Point2;
use planar_kinematics_core::GrayImageView;
use serde::{Deserialize, Serialize};

/// Finds the centroid of the tracked object in one frame.
///
/// Implementations may keep state across frames (a background model, for
/// example); [`Locator::reset`] clears it before a new video.
pub trait Locator: Send {
    fn locate(&mut self, frame: &GrayImageView<'_>) -> Option<Point2<f64>>;

    fn reset(&mut self) {}
}

/// Locator selection with its parameters.
///
/// ```json
/// { "kind": "circle", "min_radius": 8, "max_radius": 40 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorKind {
    Blob(BlobParams),
    Circle(CircleParams),
    Contour(ContourParams),
    BackgroundSubtraction(BackgroundParams),
}

impl Default for LocatorKind {
    fn default() -> Self {
        LocatorKind::Blob(BlobParams::default())
    }
}

impl LocatorKind {
    pub fn build(&self) -> Box<dyn Locator> {
        match self {
            LocatorKind::Blob(p) => Box::new(BlobLocator::new(p.clone())),
            LocatorKind::Circle(p) => Box::new(CircleLocator::new(p.clone())),
            LocatorKind::Contour(p) => Box::new(ContourLocator::new(p.clone())),
            LocatorKind::BackgroundSubtraction(p) => {
                Box::new(BackgroundSubtractionLocator::new(p.clone()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocatorKind::Blob(_) => "blob",
            LocatorKind::Circle(_) => "circle",
            LocatorKind::Contour(_) => "contour",
            LocatorKind::BackgroundSubtraction(_) => "background_subtraction",
        }
    }
}

#[inline]
pub(crate) fn is_empty(frame: &GrayImageView<'_>) -> bool {
    frame.width == 0 || frame.height == 0 || frame.data.len() < frame.width * frame.height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_json() {
        let kind: LocatorKind =
            serde_json::from_str(r#"{ "kind": "circle", "min_radius": 8 }"#).unwrap();
        match &kind {
            LocatorKind::Circle(p) => {
                assert_eq!(p.min_radius, 8);
                assert_eq!(p.max_radius, CircleParams::default().max_radius);
            }
            other => panic!("unexpected {other:?}"),
        }
        let json = serde_json::to_string(&kind).unwrap();
        let back: LocatorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn default_is_blob() {
        assert_eq!(LocatorKind::default().name(), "blob");
        let kind: LocatorKind = serde_json::from_str(r#"{ "kind": "background_subtraction" }"#).unwrap();
        assert_eq!(kind.name(), "background_subtraction");
    }

    #[test]
    fn every_kind_rejects_empty_frames() {
        let frame = GrayImageView {
            width: 0,
            height: 0,
            data: &[],
        };
        for kind in [
            LocatorKind::default(),
            LocatorKind::Circle(CircleParams::default()),
            LocatorKind::Contour(ContourParams::default()),
            LocatorKind::BackgroundSubtraction(BackgroundParams::default()),
        ] {
            assert!(kind.build().locate(&frame).is_none(), "{}", kind.name());
        }
    }
}
