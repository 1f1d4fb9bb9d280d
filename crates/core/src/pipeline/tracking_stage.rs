use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crate::detection::domain::detector::Detector;
use crate::detection::domain::tracker::Tracker;
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::handoff_queue::HandoffQueue;
use crate::pipeline::stage_stats::StageStats;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::{Frame, Tensor};
use crate::shared::image::ImageSize;

/// Worker that runs detection on preprocessed frames and assigns track ids.
///
/// Owns the detector and the tracker outright; nothing else touches the
/// track table, so it needs no locking.
pub struct TrackingStage {
    input: HandoffQueue<Frame>,
    output: HandoffQueue<Frame>,
    detector: Box<dyn Detector>,
    tracker: Tracker,
    cancel: CancellationToken,
    stats: StageStats,
}

impl TrackingStage {
    pub fn new(
        input: HandoffQueue<Frame>,
        output: HandoffQueue<Frame>,
        detector: Box<dyn Detector>,
        tracker: Tracker,
        cancel: CancellationToken,
        stats: StageStats,
    ) -> Self {
        Self {
            input,
            output,
            detector,
            tracker,
            cancel,
            stats,
        }
    }

    /// Runs the stage on its own thread; the tracker is handed back on exit.
    pub fn spawn(self) -> std::io::Result<JoinHandle<Tracker>> {
        std::thread::Builder::new()
            .name("tracking".into())
            .spawn(move || self.run())
    }

    pub fn run(mut self) -> Tracker {
        while !self.cancel.is_cancelled() {
            let Some(frame) = self.input.pop() else {
                break;
            };
            if frame.is_sentinel() {
                log::debug!("Tracking stage received shutdown sentinel");
                break;
            }

            let frame = self.process_frame(frame);
            self.stats.record_processed();
            self.output.push(frame);
        }
        log::debug!(
            "Tracking stage stopped ({} active tracks, {} created)",
            self.tracker.len(),
            self.tracker.created_count()
        );
        self.tracker
    }

    /// Detects, associates and annotates one frame. Never fails: problems
    /// degrade the frame to zero detections.
    pub fn process_frame(&mut self, mut frame: Frame) -> Frame {
        let index = frame.index();
        let (Some(tensor), Some(original_size)) =
            (frame.take_tensor(), frame.original().map(|img| img.size()))
        else {
            log::error!("Frame {index} has no detector input; clearing detections");
            frame.clear_detections();
            self.stats.record_failure();
            return frame;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let detections = self.detect(index, &tensor, original_size);
            self.annotate(&mut frame, detections);
        }));
        if outcome.is_err() {
            log::error!("Tracking panicked on frame {index}; clearing detections");
            frame.clear_detections();
            self.stats.record_failure();
        }
        frame
    }

    /// Detector errors and panics both come back as zero detections, so the
    /// tracker still ages its tracks for this frame.
    fn detect(
        &mut self,
        index: usize,
        tensor: &Tensor,
        original_size: ImageSize,
    ) -> Vec<BoundingBox> {
        let detector = &mut self.detector;
        match catch_unwind(AssertUnwindSafe(|| detector.detect(tensor, original_size))) {
            Ok(Ok(boxes)) => boxes,
            Ok(Err(e)) => {
                log::warn!("Detection failed on frame {index}: {e}");
                self.stats.record_failure();
                Vec::new()
            }
            Err(_) => {
                log::error!("Detector panicked on frame {index}");
                self.stats.record_failure();
                Vec::new()
            }
        }
    }

    fn annotate(&mut self, frame: &mut Frame, detections: Vec<BoundingBox>) {
        let update = self.tracker.update(&detections);
        if !update.created.is_empty() {
            log::debug!("Frame {}: new tracks {:?}", frame.index(), update.created);
        }
        if !update.evicted.is_empty() {
            log::debug!("Frame {}: evicted tracks {:?}", frame.index(), update.evicted);
        }

        let track_ids = update.ids.into_iter().map(Some).collect();
        frame.set_tracked(detections, track_ids);
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}
