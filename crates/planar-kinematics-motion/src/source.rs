use planar_kinematics_core::GrayImage;

#[derive(thiserror::Error, Debug)]
pub enum FrameSourceError {
    #[error("frame {index} is out of range (source has {count} frames)")]
    OutOfRange { index: usize, count: usize },

    #[error("failed to decode frame {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Random-access decoded frames.
///
/// Container decoding lives behind this trait; scans only need grayscale
/// frames by index.
pub trait FrameSource {
    fn frame_count(&self) -> usize;

    /// Native frame rate, when the source knows it.
    fn frame_rate(&self) -> Option<f64>;

    fn read_frame(&mut self, index: usize) -> Result<GrayImage, FrameSourceError>;
}

/// Frames held in memory. `None` entries stand for undecodable frames.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    frames: Vec<Option<GrayImage>>,
    frame_rate: Option<f64>,
}

impl InMemorySource {
    pub fn new(frames: Vec<GrayImage>, frame_rate: Option<f64>) -> Self {
        Self {
            frames: frames.into_iter().map(Some).collect(),
            frame_rate,
        }
    }

    pub fn with_gaps(frames: Vec<Option<GrayImage>>, frame_rate: Option<f64>) -> Self {
        Self { frames, frame_rate }
    }
}

impl FrameSource for InMemorySource {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn read_frame(&mut self, index: usize) -> Result<GrayImage, FrameSourceError> {
        match self.frames.get(index) {
            Some(Some(frame)) => Ok(frame.clone()),
            Some(None) => Err(FrameSourceError::Decode {
                index,
                reason: "frame is corrupt".to_string(),
            }),
            None => Err(FrameSourceError::OutOfRange {
                index,
                count: self.frames.len(),
            }),
        }
    }
}
