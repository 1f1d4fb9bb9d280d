use super::image::ImageSize;

/// Axis-aligned rectangle in image pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from `(x1, y1, x2, y2)` corners, rounding to pixels.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let left = x1.min(x2).round() as i32;
        let top = y1.min(y2).round() as i32;
        let right = x1.max(x2).round() as i32;
        let bottom = y1.max(y2).round() as i32;
        Self::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
    }

    /// Right edge, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge, saturating at `i32::MAX`.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> f64 {
        self.width.max(0) as f64 * self.height.max(0) as f64
    }

    /// Intersection over union; 0 when the boxes do not overlap.
    /// Edges are computed in `i64`, so boxes at the edge of the `i32` range
    /// compare exactly.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let (ax1, ay1, ax2, ay2) = self.wide_corners();
        let (bx1, by1, bx2, by2) = other.wide_corners();
        let ix1 = ax1.max(bx1);
        let iy1 = ay1.max(by1);
        let ix2 = ax2.min(bx2);
        let iy2 = ay2.min(by2);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        inter / (self.area() + other.area() - inter)
    }

    fn wide_corners(&self) -> (i64, i64, i64, i64) {
        let x = self.x as i64;
        let y = self.y as i64;
        (x, y, x + self.width.max(0) as i64, y + self.height.max(0) as i64)
    }

    /// Clips the box to the image bounds. May produce a zero-area box.
    pub fn clamp_to(&self, size: ImageSize) -> BoundingBox {
        let max_x = size.width as i32;
        let max_y = size.height as i32;
        let x1 = self.x.clamp(0, max_x);
        let y1 = self.y.clamp(0, max_y);
        let x2 = self.right().clamp(0, max_x);
        let y2 = self.bottom().clamp(0, max_y);
        BoundingBox::new(x1, y1, x2 - x1, y2 - y1)
    }
}
