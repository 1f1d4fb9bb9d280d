pub mod ffmpeg_source;
pub mod fps_counter;
pub mod image_sequence_display;
pub mod log_display;
pub mod overlay;
