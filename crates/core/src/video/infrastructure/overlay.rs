use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::{Frame, TrackId};
use crate::shared::image::Image;

/// Outline thickness in pixels.
pub const BOX_THICKNESS: i32 = 2;

/// Colour for detections that carry no track id.
const UNTRACKED_COLOR: [u8; 3] = [255, 255, 255];

const PALETTE: [[u8; 3]; 8] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
];

/// Label glyphs are 3x5 cells, each cell drawn `LABEL_SCALE` pixels square.
const GLYPH_WIDTH: i32 = 3;
const GLYPH_HEIGHT: i32 = 5;
const LABEL_SCALE: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];

/// Rows of each digit, top to bottom, high bit on the left.
const DIGITS: [[u8; GLYPH_HEIGHT as usize]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Stable colour per track id.
pub fn track_color(id: Option<TrackId>) -> [u8; 3] {
    match id {
        Some(id) => PALETTE[id as usize % PALETTE.len()],
        None => UNTRACKED_COLOR,
    }
}

/// Copy of the frame's original image with every tracked box outlined and
/// labelled with its track id.
///
/// Returns `None` for frames without an original image.
pub fn render(frame: &Frame) -> Option<Image> {
    let mut image = frame.original()?.clone();
    for (bbox, id) in frame.tracked() {
        let color = track_color(id);
        draw_box(&mut image, bbox, color, BOX_THICKNESS);
        if let Some(id) = id {
            draw_label(&mut image, bbox, &id.to_string(), color);
        }
    }
    Some(image)
}

/// Draws `text` on a `background` tag sitting on the box's top-left corner,
/// above the box when there is room and just inside it otherwise. Only
/// ASCII digits are rendered; other characters leave a blank cell.
pub fn draw_label(image: &mut Image, bbox: &BoundingBox, text: &str, background: [u8; 3]) {
    let clipped = bbox.clamp_to(image.size());
    if clipped.width <= 0 || clipped.height <= 0 {
        return;
    }
    let (width, height) = label_size(text);
    let x0 = clipped.x;
    let y0 = if clipped.y >= height {
        clipped.y - height
    } else {
        clipped.y
    };

    fill(image, x0, y0, x0 + width, y0 + height, background);

    let advance = (GLYPH_WIDTH + 1) * LABEL_SCALE;
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = ch.to_digit(10).map(|d| DIGITS[d as usize]) else {
            continue;
        };
        let gx = x0 + LABEL_SCALE + i as i32 * advance;
        let gy = y0 + LABEL_SCALE;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = gx + col * LABEL_SCALE;
                let py = gy + row as i32 * LABEL_SCALE;
                fill(image, px, py, px + LABEL_SCALE, py + LABEL_SCALE, LABEL_TEXT_COLOR);
            }
        }
    }
}

/// Label tag size in pixels, including one cell of padding on every side.
fn label_size(text: &str) -> (i32, i32) {
    let chars = text.chars().count() as i32;
    let width = (chars * (GLYPH_WIDTH + 1) + 1) * LABEL_SCALE;
    let height = (GLYPH_HEIGHT + 2) * LABEL_SCALE;
    (width, height)
}

/// Outlines `bbox` in place, clipped to the image bounds.
pub fn draw_box(image: &mut Image, bbox: &BoundingBox, color: [u8; 3], thickness: i32) {
    let clipped = bbox.clamp_to(image.size());
    if clipped.width <= 0 || clipped.height <= 0 {
        return;
    }
    let (x1, y1) = (clipped.x, clipped.y);
    let (x2, y2) = (clipped.right(), clipped.bottom());
    let t = thickness.max(1);

    fill(image, x1, y1, x2, (y1 + t).min(y2), color);
    fill(image, x1, (y2 - t).max(y1), x2, y2, color);
    fill(image, x1, y1, (x1 + t).min(x2), y2, color);
    fill(image, (x2 - t).max(x1), y1, x2, y2, color);
}

/// Fills the half-open rectangle `[x1, x2) x [y1, y2)`, clipped to the image.
fn fill(image: &mut Image, x1: i32, y1: i32, x2: i32, y2: i32, color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let (x1, x2) = (x1.clamp(0, w), x2.clamp(0, w));
    let (y1, y2) = (y1.clamp(0, h), y2.clamp(0, h));
    let mut pixels = image.as_ndarray_mut();
    for y in y1..y2 {
        for x in x1..x2 {
            for (c, value) in color.iter().enumerate() {
                pixels[[y as usize, x as usize, c]] = *value;
            }
        }
    }
}
