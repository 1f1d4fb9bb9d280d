use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::video::domain::display::{Display, DisplayError};

use super::fps_counter::FpsCounter;
use super::overlay;

/// Log the running frame rate every this many frames.
const FPS_LOG_INTERVAL: usize = 30;

/// Writes each displayed frame to `<dir>/frame_<index>.png` using the `image`
/// crate, with tracked boxes drawn on the original image while the overlay
/// is on.
pub struct ImageSequenceDisplay {
    output_dir: PathBuf,
    overlay: bool,
    fps: FpsCounter,
    written: usize,
}

impl ImageSequenceDisplay {
    /// Creates the output directory if needed.
    pub fn new(output_dir: &Path, overlay: bool) -> std::io::Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            overlay,
            fps: FpsCounter::new(),
            written: 0,
        })
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(format!("frame_{index:06}.png"))
    }

    pub fn overlay_enabled(&self) -> bool {
        self.overlay
    }

    pub fn frames_written(&self) -> usize {
        self.written
    }
}

impl Display for ImageSequenceDisplay {
    fn show_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let index = frame.index();
        let write_error = |reason: String| DisplayError::Write { index, reason };

        let image = if self.overlay {
            overlay::render(frame)
        } else {
            frame.original().cloned()
        }
        .filter(|image| !image.is_empty())
        .ok_or_else(|| write_error("frame has no image".into()))?;

        let (width, height) = (image.width(), image.height());
        let img = image::RgbImage::from_raw(width, height, image.into_data())
            .ok_or_else(|| write_error("pixel buffer does not match its dimensions".into()))?;
        let path = self.frame_path(index);
        img.save(&path)
            .map_err(|e| write_error(format!("{}: {e}", path.display())))?;

        self.written += 1;
        let fps = self.fps.tick();
        if self.written % FPS_LOG_INTERVAL == 0 {
            log::info!("Displayed {} frames ({fps:.1} fps)", self.written);
        }
        Ok(())
    }

    fn toggle_overlay(&mut self) {
        self.overlay = !self.overlay;
        log::info!("Overlay {}", if self.overlay { "on" } else { "off" });
    }
}
