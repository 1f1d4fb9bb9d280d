use std::path::Path;

use crate::shared::config::InputSource;
use crate::shared::frame::Frame;
use crate::shared::image::Image;
use crate::video::domain::frame_source::{FrameSource, SourceError};

/// ffmpeg demuxer used for V4L2 camera devices.
const CAMERA_FORMAT: &str = "video4linux2,v4l2";

/// Pulls frames from a video file or camera through ffmpeg-next.
///
/// Every decoded frame is converted to RGB24 and wrapped in a [`Frame`] with
/// only the original image set.
pub struct FfmpegSource {
    input: InputSource,
    state: Option<DecodeState>,
    next_index: usize,
}

struct DecodeState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    flushing: bool,
    done: bool,
}

impl FfmpegSource {
    pub fn new(input: InputSource) -> Self {
        Self {
            input,
            state: None,
            next_index: 0,
        }
    }

    fn target(&self) -> String {
        match &self.input {
            InputSource::Video(path) => path.display().to_string(),
            InputSource::Camera(device) => device.clone(),
        }
    }

    fn open_error(&self, reason: impl std::fmt::Display) -> SourceError {
        SourceError::Open {
            target: self.target(),
            reason: reason.to_string(),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn initialize(&mut self) -> Result<(), SourceError> {
        ffmpeg_next::init().map_err(|e| self.open_error(e))?;

        let ictx = match &self.input {
            InputSource::Video(path) => ffmpeg_next::format::input(path),
            InputSource::Camera(device) => open_camera(device),
        }
        .map_err(|e| self.open_error(e))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| SourceError::NoVideoStream(self.target()))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| self.open_error(e))?;
        let decoder = codec_ctx.decoder().video().map_err(|e| self.open_error(e))?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| self.open_error(e))?;

        log::info!("Opened {} ({width}x{height})", self.target());
        self.state = Some(DecodeState {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            flushing: false,
            done: false,
        });
        self.next_index = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let state = self.state.as_mut()?;
        let image = match state.next_image() {
            Ok(image) => image?,
            Err(e) => {
                log::error!("Frame source failed: {e}");
                state.done = true;
                return None;
            }
        };
        let frame = Frame::new(image, self.next_index);
        self.next_index += 1;
        Some(frame)
    }
}

impl DecodeState {
    /// `Ok(None)` at end of stream.
    fn next_image(&mut self) -> Result<Option<Image>, ffmpeg_next::Error> {
        if self.done {
            return Ok(None);
        }
        if let Some(image) = self.try_receive()? {
            return Ok(Some(image));
        }
        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                let image = self.try_receive()?;
                self.done = image.is_none();
                return Ok(image);
            };

            if stream.index() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
                continue;
            }
            if let Some(image) = self.try_receive()? {
                return Ok(Some(image));
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Image>, ffmpeg_next::Error> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;

        let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
        Ok(Some(Image::new(pixels, self.width, self.height)))
    }
}

/// Opens a camera device through the V4L2 demuxer when ffmpeg provides one,
/// otherwise lets ffmpeg probe the device path.
fn open_camera(device: &str) -> Result<ffmpeg_next::format::context::Input, ffmpeg_next::Error> {
    ffmpeg_next::device::register_all();

    let v4l2 = ffmpeg_next::device::input::video().find(|fmt| fmt.name() == CAMERA_FORMAT);
    let Some(format) = v4l2 else {
        log::warn!("V4L2 input unavailable; probing {device} directly");
        return ffmpeg_next::format::input(&Path::new(device));
    };

    match ffmpeg_next::format::open_with(&Path::new(device), &format, ffmpeg_next::Dictionary::new())? {
        ffmpeg_next::format::context::Context::Input(ictx) => Ok(ictx),
        ffmpeg_next::format::context::Context::Output(_) => Err(ffmpeg_next::Error::InvalidData),
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed RGB buffer,
/// dropping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
