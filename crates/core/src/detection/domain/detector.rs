use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Tensor;
use crate::shared::image::ImageSize;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

/// Maps a detector-ready tensor to bounding boxes.
///
/// Returned boxes are already filtered by confidence and rescaled into the
/// coordinate space described by `original_size`. Implementations may keep
/// per-session state, hence `&mut self`.
pub trait Detector: Send {
    fn detect(
        &mut self,
        tensor: &Tensor,
        original_size: ImageSize,
    ) -> Result<Vec<BoundingBox>, DetectionError>;
}
