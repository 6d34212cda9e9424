use crate::io::{list_images, load_gray, IoError};
use planar_kinematics_core::GrayImage;
use planar_kinematics_motion::{FrameSource, FrameSourceError};
use std::path::{Path, PathBuf};

/// Video given as a directory of decoded frames, in file-name order.
///
/// Image files carry no timing, so the frame rate comes from the caller.
#[derive(Clone, Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    frame_rate: Option<f64>,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, frame_rate: Option<f64>) -> Result<Self, IoError> {
        let dir = dir.as_ref();
        let paths = list_images(dir)?;
        if paths.is_empty() {
            return Err(IoError::NoImages(dir.to_path_buf()));
        }
        log::debug!("{} frames in {}", paths.len(), dir.display());
        Ok(Self::from_paths(paths, frame_rate))
    }

    pub fn from_paths(paths: Vec<PathBuf>, frame_rate: Option<f64>) -> Self {
        Self { paths, frame_rate }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequenceSource {
    fn frame_count(&self) -> usize {
        self.paths.len()
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn read_frame(&mut self, index: usize) -> Result<GrayImage, FrameSourceError> {
        let path = self.paths.get(index).ok_or(FrameSourceError::OutOfRange {
            index,
            count: self.paths.len(),
        })?;
        load_gray(path).map_err(|err| FrameSourceError::Decode {
            index,
            reason: err.to_string(),
        })
    }
}
