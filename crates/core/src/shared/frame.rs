use super::bounding_box::BoundingBox;
use super::image::Image;

/// Detector input: NCHW float32, `[1, 3, height, width]`.
pub type Tensor = ndarray::Array4<f32>;

pub type TrackId = u32;

/// Unit of work moved through the pipeline.
///
/// A frame has exactly one owner at a time; pushing it into a queue moves it.
/// `detections` and `track_ids` are parallel once the tracking stage is done
/// with the frame.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    index: usize,
    original: Option<Image>,
    processed: Option<Image>,
    tensor: Option<Tensor>,
    detections: Vec<BoundingBox>,
    track_ids: Vec<Option<TrackId>>,
}

impl Frame {
    pub fn new(original: Image, index: usize) -> Self {
        Self {
            index,
            original: Some(original),
            ..Self::default()
        }
    }

    /// In-band shutdown signal: a frame carrying no image data at all.
    pub fn sentinel() -> Self {
        Self::default()
    }

    pub fn is_sentinel(&self) -> bool {
        self.original.is_none() && self.processed.is_none()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn original(&self) -> Option<&Image> {
        self.original.as_ref()
    }

    pub fn processed(&self) -> Option<&Image> {
        self.processed.as_ref()
    }

    pub fn set_processed(&mut self, image: Image) {
        self.processed = Some(image);
    }

    pub fn tensor(&self) -> Option<&Tensor> {
        self.tensor.as_ref()
    }

    pub fn set_tensor(&mut self, tensor: Tensor) {
        self.tensor = Some(tensor);
    }

    /// Releases the tensor once detection no longer needs it.
    pub fn take_tensor(&mut self) -> Option<Tensor> {
        self.tensor.take()
    }

    pub fn detections(&self) -> &[BoundingBox] {
        &self.detections
    }

    pub fn track_ids(&self) -> &[Option<TrackId>] {
        &self.track_ids
    }

    /// Replaces detections and their track ids together.
    ///
    /// Panics if the two sequences differ in length.
    pub fn set_tracked(&mut self, detections: Vec<BoundingBox>, track_ids: Vec<Option<TrackId>>) {
        assert_eq!(
            detections.len(),
            track_ids.len(),
            "every detection needs a track id slot"
        );
        self.detections = detections;
        self.track_ids = track_ids;
    }

    pub fn clear_detections(&mut self) {
        self.detections.clear();
        self.track_ids.clear();
    }

    /// `(box, track id)` pairs in detection order.
    pub fn tracked(&self) -> impl Iterator<Item = (&BoundingBox, Option<TrackId>)> {
        self.detections.iter().zip(self.track_ids.iter().copied())
    }
}
