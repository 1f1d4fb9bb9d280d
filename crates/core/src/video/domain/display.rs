use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to write frame {index}: {reason}")]
    Write { index: usize, reason: String },
}

/// Sink for annotated frames at the end of the pipeline.
pub trait Display {
    /// Renders a frame with its boxes and track ids when the overlay is on.
    fn show_frame(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    fn toggle_overlay(&mut self);
}
