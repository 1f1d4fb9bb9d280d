use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use thiserror::Error;

use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::handoff_queue::HandoffQueue;
use crate::pipeline::stage_stats::StageStats;
use crate::shared::frame::{Frame, Tensor};
use crate::shared::image::{Image, ImageSize};

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("frame {0} has an empty image")]
    EmptyImage(usize),
    #[error("frame {0} pixel buffer does not match its dimensions")]
    InvalidBuffer(usize),
}

/// Worker that turns raw frames into detector-ready frames.
///
/// Stateless across frames: each frame gets a resized copy of its original
/// image plus an NCHW tensor built from that copy.
pub struct PreprocessStage {
    input: HandoffQueue<Frame>,
    output: HandoffQueue<Frame>,
    input_size: ImageSize,
    cancel: CancellationToken,
    stats: StageStats,
}

impl PreprocessStage {
    pub fn new(
        input: HandoffQueue<Frame>,
        output: HandoffQueue<Frame>,
        input_size: ImageSize,
        cancel: CancellationToken,
        stats: StageStats,
    ) -> Self {
        Self {
            input,
            output,
            input_size,
            cancel,
            stats,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("preprocess".into())
            .spawn(move || self.run())
    }

    /// Blocks on the input queue until a sentinel arrives or the pipeline is
    /// cancelled.
    pub fn run(self) {
        while !self.cancel.is_cancelled() {
            let Some(frame) = self.input.pop() else {
                break;
            };
            if frame.is_sentinel() {
                log::debug!("Preprocess stage received shutdown sentinel");
                break;
            }

            let index = frame.index();
            let target = self.input_size;
            match catch_unwind(AssertUnwindSafe(move || preprocess(frame, target))) {
                Ok(Ok(frame)) => {
                    self.stats.record_processed();
                    self.output.push(frame);
                }
                Ok(Err(e)) => {
                    log::error!("Dropping frame: {e}");
                    self.stats.record_dropped();
                }
                Err(_) => {
                    log::error!("Preprocessing panicked on frame {index}; dropping it");
                    self.stats.record_dropped();
                }
            }
        }
        log::debug!("Preprocess stage stopped");
    }
}

/// Populates the processed image and tensor of a raw frame.
pub fn preprocess(mut frame: Frame, input_size: ImageSize) -> Result<Frame, PreprocessError> {
    let index = frame.index();
    let original = match frame.original() {
        Some(image) if !image.is_empty() => image,
        _ => return Err(PreprocessError::EmptyImage(index)),
    };

    let processed = resize(original, input_size).ok_or(PreprocessError::InvalidBuffer(index))?;
    let tensor = to_tensor(&processed);

    frame.set_processed(processed);
    frame.set_tensor(tensor);
    Ok(frame)
}

/// Bilinear resize to `size`; returns `None` if the buffer is malformed.
fn resize(image: &Image, size: ImageSize) -> Option<Image> {
    if image.size() == size {
        return Some(image.clone());
    }
    let src = image::RgbImage::from_raw(image.width(), image.height(), image.data().to_vec())?;
    let resized = image::imageops::resize(
        &src,
        size.width,
        size.height,
        image::imageops::FilterType::Triangle,
    );
    Some(Image::new(resized.into_raw(), size.width, size.height))
}

/// HWC u8 → NCHW f32 scaled to `[0, 1]`.
fn to_tensor(image: &Image) -> Tensor {
    let src = image.as_ndarray();
    let h = image.height() as usize;
    let w = image.width() as usize;
    Tensor::from_shape_fn((1, 3, h, w), |(_, c, y, x)| src[[y, x, c]] as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn raw_frame(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Frame {
        Frame::new(Image::filled(width, height, rgb), index)
    }

    #[test]
    fn test_preprocess_resizes_and_builds_tensor() {
        let frame = raw_frame(64, 48, [255, 0, 51], 0);
        let out = preprocess(frame, ImageSize::new(32, 16)).unwrap();

        let processed = out.processed().unwrap();
        assert_eq!(processed.size(), ImageSize::new(32, 16));
        assert_eq!(out.original().unwrap().size(), ImageSize::new(64, 48));

        let tensor = out.tensor().unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 32]);
        assert_relative_eq!(tensor[[0, 0, 5, 5]], 1.0, epsilon = 1e-2);
        assert_relative_eq!(tensor[[0, 1, 5, 5]], 0.0, epsilon = 1e-2);
        assert_relative_eq!(tensor[[0, 2, 5, 5]], 0.2, epsilon = 1e-2);
    }

    #[test]
    fn test_preprocess_same_size_skips_resize() {
        let frame = raw_frame(8, 8, [10, 20, 30], 0);
        let out = preprocess(frame, ImageSize::new(8, 8)).unwrap();
        assert_eq!(out.processed(), out.original());
    }

    #[test]
    fn test_tensor_values_within_unit_range() {
        let mut data = Vec::new();
        for i in 0..(16 * 16) {
            data.extend_from_slice(&[(i % 256) as u8, 255, 0]);
        }
        let frame = Frame::new(Image::new(data, 16, 16), 0);
        let out = preprocess(frame, ImageSize::new(8, 8)).unwrap();
        assert!(out
            .tensor()
            .unwrap()
            .iter()
            .all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let frame = Frame::new(Image::empty(), 4);
        assert_eq!(
            preprocess(frame, ImageSize::new(8, 8)).unwrap_err(),
            PreprocessError::EmptyImage(4)
        );
    }

    fn start_stage() -> (
        HandoffQueue<Frame>,
        HandoffQueue<Frame>,
        StageStats,
        JoinHandle<()>,
    ) {
        let input = HandoffQueue::new();
        let output = HandoffQueue::new();
        let stats = StageStats::new();
        let stage = PreprocessStage::new(
            input.clone(),
            output.clone(),
            ImageSize::new(8, 8),
            CancellationToken::new(),
            stats.clone(),
        );
        let handle = stage.spawn().unwrap();
        (input, output, stats, handle)
    }

    #[test]
    fn test_stage_drops_empty_frames_and_keeps_running() {
        let (input, output, stats, handle) = start_stage();

        input.push(raw_frame(16, 16, [1, 2, 3], 0));
        input.push(Frame::new(Image::empty(), 1));
        input.push(raw_frame(16, 16, [1, 2, 3], 2));
        input.push(Frame::sentinel());
        handle.join().unwrap();

        let indices: Vec<usize> = std::iter::from_fn(|| output.try_pop())
            .map(|f| f.index())
            .collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.dropped(), 1);
    }

    #[test]
    fn test_stage_does_not_forward_sentinel() {
        let (input, output, _stats, handle) = start_stage();
        input.push(Frame::sentinel());
        handle.join().unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_sentinel_unblocks_idle_stage() {
        let (input, _output, _stats, handle) = start_stage();
        std::thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());

        input.push(Frame::sentinel());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        handle.join().unwrap();
    }
}
