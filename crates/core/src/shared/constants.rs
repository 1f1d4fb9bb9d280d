/// Association cutoff: a detection matches a track only above this IoU.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// Frames a track may go unmatched before eviction.
pub const DEFAULT_MAX_FRAMES_TO_SKIP: u32 = 10;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Fallback detector input resolution when neither config nor model says otherwise.
pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;

/// Frames allowed between the source and the display before fetching pauses.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

pub const MODEL_EXTENSION: &str = "onnx";
