use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {target}: {reason}")]
    Open { target: String, reason: String },
    #[error("no video stream found in {0}")]
    NoVideoStream(String),
}

/// Produces raw frames with only the original image populated.
///
/// Implementations handle codec and device details; the pipeline only sees
/// [`Frame`]s.
pub trait FrameSource {
    /// Opens the underlying file or device. Failure is fatal at startup.
    fn initialize(&mut self) -> Result<(), SourceError>;

    /// Returns the next frame, or `None` at end of stream or on device failure.
    fn next_frame(&mut self) -> Option<Frame>;
}
