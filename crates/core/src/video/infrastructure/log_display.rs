use crate::shared::frame::Frame;
use crate::video::domain::display::{Display, DisplayError};

use super::fps_counter::FpsCounter;

/// Headless sink that logs one line per frame.
///
/// With the overlay on, the line lists each box with its track id; otherwise
/// only the detection count is logged.
pub struct LogDisplay {
    overlay: bool,
    fps: FpsCounter,
}

impl LogDisplay {
    pub fn new(overlay: bool) -> Self {
        Self {
            overlay,
            fps: FpsCounter::new(),
        }
    }

    pub fn describe(&self, frame: &Frame) -> String {
        let mut line = format!(
            "Frame {}: {} detections",
            frame.index(),
            frame.detections().len()
        );
        if self.overlay {
            for (bbox, id) in frame.tracked() {
                let label = id.map_or_else(|| "?".to_string(), |id| id.to_string());
                line.push_str(&format!(
                    " [#{label} {},{} {}x{}]",
                    bbox.x, bbox.y, bbox.width, bbox.height
                ));
            }
        }
        line
    }
}

impl Default for LogDisplay {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Display for LogDisplay {
    fn show_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let fps = self.fps.tick();
        log::info!("{} ({fps:.1} fps)", self.describe(frame));
        Ok(())
    }

    fn toggle_overlay(&mut self) {
        self.overlay = !self.overlay;
    }
}
