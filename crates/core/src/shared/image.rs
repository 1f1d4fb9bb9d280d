use ndarray::{ArrayView3, ArrayViewMut3};

/// Pixel dimensions of an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Tightly packed RGB24 pixels in row-major order.
///
/// Format conversion happens at I/O boundaries only; the pipeline treats the
/// bytes as opaque apart from resizing and overlay drawing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Image {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

pub const CHANNELS: usize = 3;

impl Image {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
        }
    }

    /// A zero-sized image, as produced by a source that failed to decode.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.size().is_empty() || self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Image data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Image data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, CHANNELS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let image = Image::new(data.clone(), 2, 2);
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 2);
        assert_eq!(image.size(), ImageSize::new(2, 2));
        assert_eq!(image.data(), &data[..]);
        assert!(!image.is_empty());
    }

    #[test]
    fn test_empty_image() {
        let image = Image::empty();
        assert!(image.is_empty());
        assert!(image.size().is_empty());
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * 3")]
    fn test_mismatched_data_length_panics_in_debug() {
        Image::new(vec![0u8; 10], 2, 2);
    }

    #[test]
    fn test_filled_repeats_pixel() {
        let image = Image::filled(3, 2, [1, 2, 3]);
        assert_eq!(image.data().len(), 18);
        assert_eq!(&image.data()[15..18], &[1, 2, 3]);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        // 2x2 RGB: set pixel (row=1, col=0) to red
        let mut data = vec![0u8; 12];
        data[6] = 255;
        let image = Image::new(data, 2, 2);
        let arr = image.as_ndarray();
        assert_eq!(arr.shape(), &[2, 2, 3]);
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 0);
    }

    #[test]
    fn test_as_ndarray_mut_modification() {
        let mut image = Image::new(vec![0u8; 12], 2, 2);
        {
            let mut arr = image.as_ndarray_mut();
            arr[[0, 1, 2]] = 128;
        }
        assert_eq!(image.as_ndarray()[[0, 1, 2]], 128);
    }
}
