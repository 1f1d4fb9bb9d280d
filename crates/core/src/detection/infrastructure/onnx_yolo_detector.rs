/// YOLO-style object detector using ONNX Runtime via `ort`.
///
/// Takes the preprocessed NCHW tensor as-is, runs inference, keeps rows whose
/// best class score clears the confidence threshold, applies NMS and rescales
/// the survivors into original-image coordinates.
use std::path::Path;

use crate::detection::domain::detector::{DetectionError, Detector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Tensor;
use crate::shared::image::ImageSize;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Leading box values per output row: cx, cy, w, h.
const BOX_VALUES: usize = 4;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f32,
}

impl OnnxYoloDetector {
    /// Loads an ONNX model and checks that its declared NCHW input matches
    /// `input_size`. Failure here is fatal for the caller.
    pub fn new(
        model_path: &Path,
        confidence: f32,
        input_size: ImageSize,
    ) -> Result<Self, DetectionError> {
        let session = ort::session::Session::builder()
            .map_err(|e| load_error(model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(model_path, e))?;

        let dims = session.inputs().first().and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                Some(shape.iter().copied().collect::<Vec<i64>>())
            } else {
                None
            }
        });
        match dims {
            Some(dims) => {
                check_input_dims(&dims, input_size).map_err(|e| load_error(model_path, e))?
            }
            None => log::warn!("Model declares no tensor input shape; assuming {input_size:?}"),
        }

        log::info!(
            "Loaded detection model {} ({}x{}, confidence >= {confidence})",
            model_path.display(),
            input_size.width,
            input_size.height
        );
        Ok(Self {
            session,
            confidence,
        })
    }
}

impl Detector for OnnxYoloDetector {
    fn detect(
        &mut self,
        tensor: &Tensor,
        original_size: ImageSize,
    ) -> Result<Vec<BoundingBox>, DetectionError> {
        let (_, _, tensor_h, tensor_w) = tensor.dim();
        let confidence = self.confidence;

        let input = ort::value::Tensor::from_array(tensor.clone())
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(DetectionError::Output("model produced no outputs".into()));
        }
        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Output(e.to_string()))?;

        let shape = output.shape().to_vec();
        let data = output
            .as_slice()
            .ok_or_else(|| DetectionError::Output("output tensor is not contiguous".into()))?;
        let mut raw = decode_output(&shape, data, confidence)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        let scale = Scale::between(ImageSize::new(tensor_w as u32, tensor_h as u32), original_size);
        Ok(kept
            .iter()
            .map(|d| scale.apply(d).clamp_to(original_size))
            .filter(|b| b.area() > 0.0)
            .collect())
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> DetectionError {
    DetectionError::ModelLoad(format!("{}: {e}", path.display()))
}

/// Compares a declared `[N, C, H, W]` input shape against the configured size.
/// Dynamic (non-positive) dimensions accept any size.
fn check_input_dims(dims: &[i64], expected: ImageSize) -> Result<(), String> {
    if dims.len() != 4 {
        return Err(format!("expected an NCHW input, model declares {dims:?}"));
    }
    let fits = |declared: i64, wanted: u32| declared <= 0 || declared == wanted as i64;
    if !fits(dims[2], expected.height) || !fits(dims[3], expected.width) {
        return Err(format!(
            "model input is {}x{} but {}x{} is configured",
            dims[3], dims[2], expected.width, expected.height
        ));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

impl RawDetection {
    fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Parses `[1, features, detections]` or `[1, detections, features]` output,
/// where each row is `cx, cy, w, h, class scores...`.
fn decode_output(
    shape: &[usize],
    data: &[f32],
    confidence: f32,
) -> Result<Vec<RawDetection>, DetectionError> {
    if shape.len() != 3 {
        return Err(DetectionError::Output(format!(
            "unexpected output shape {shape:?}"
        )));
    }
    // Fewer features than detections means the features axis comes first.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= BOX_VALUES {
        return Err(DetectionError::Output(format!(
            "output rows carry no class scores: {shape:?}"
        )));
    }
    if data.len() < num_dets * num_feats {
        return Err(DetectionError::Output(format!(
            "output holds {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        )));
    }

    let value = |det: usize, feat: usize| {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let score = (BOX_VALUES..num_feats)
            .map(|f| value(i, f))
            .fold(f32::NEG_INFINITY, f32::max);
        if score < confidence {
            continue;
        }

        let cx = value(i, 0) as f64;
        let cy = value(i, 1) as f64;
        let w = value(i, 2) as f64;
        let h = value(i, 3) as f64;
        dets.push(RawDetection {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence: score as f64,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && corner_iou(&dets[i].corners(), &dets[j].corners()) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn corner_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Independent x/y ratios from tensor space to original-image space.
#[derive(Clone, Copy, Debug)]
struct Scale {
    x: f64,
    y: f64,
}

impl Scale {
    fn between(from: ImageSize, to: ImageSize) -> Self {
        let ratio = |dst: u32, src: u32| if src == 0 { 1.0 } else { dst as f64 / src as f64 };
        Self {
            x: ratio(to.width, from.width),
            y: ratio(to.height, from.height),
        }
    }

    fn apply(&self, det: &RawDetection) -> BoundingBox {
        BoundingBox::from_corners(
            det.x1 * self.x,
            det.y1 * self.y,
            det.x2 * self.x,
            det.y2 * self.y,
        )
    }
}
