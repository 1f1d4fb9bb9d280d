use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::detection::domain::detector::Detector;
use crate::detection::domain::tracker::Tracker;
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::control::{ControlCommand, PipelineControl, RunMode};
use crate::pipeline::handoff_queue::HandoffQueue;
use crate::pipeline::pipeline_report::PipelineReport;
use crate::pipeline::preprocess_stage::PreprocessStage;
use crate::pipeline::stage_stats::StageStats;
use crate::pipeline::tracking_stage::TrackingStage;
use crate::shared::config::{AppConfig, TrackingConfig};
use crate::shared::constants::{DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH, DEFAULT_MAX_IN_FLIGHT};
use crate::shared::frame::Frame;
use crate::shared::image::ImageSize;
use crate::video::domain::display::Display;
use crate::video::domain::frame_source::{FrameSource, SourceError};

/// How long the control loop waits on the display queue when it did not
/// just fetch a frame.
const DISPLAY_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame source failed to initialize: {0}")]
    Source(#[from] SourceError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("{0} thread panicked")]
    StagePanicked(&'static str),
}

/// Settings the orchestrator needs from the wider configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub input_size: ImageSize,
    pub tracking: TrackingConfig,
    /// Upper bound on frames pushed but not yet displayed or dropped.
    pub max_in_flight: usize,
    pub mode: RunMode,
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            input_size: config.model.input_size(),
            tracking: config.tracking,
            max_in_flight: config.pipeline.max_in_flight.max(1),
            mode: if config.pipeline.continuous {
                RunMode::Continuous
            } else {
                RunMode::SingleStep
            },
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            input_size: ImageSize::new(DEFAULT_INPUT_WIDTH, DEFAULT_INPUT_HEIGHT),
            tracking: TrackingConfig::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            mode: RunMode::Continuous,
        }
    }
}

/// Runs `source → preprocess → tracking → display`.
///
/// Two worker threads (preprocess, tracking) are joined by handoff queues;
/// the source and the display are driven from the thread that calls
/// [`run`](Self::run).
///
/// Shutdown is cooperative: the cancellation token is set, a sentinel is
/// pushed into every queue to wake blocked consumers, and both workers are
/// joined. At end of stream the control loop first waits until every frame
/// in flight has been displayed.
pub struct PipelineOrchestrator {
    front: FrontEnd,
    detector: Box<dyn Detector>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

/// The parts of the pipeline that stay on the calling thread.
struct FrontEnd {
    source: Box<dyn FrameSource>,
    display: Box<dyn Display>,
    control: PipelineControl,
}

struct Workers {
    preprocess_queue: HandoffQueue<Frame>,
    tracking_queue: HandoffQueue<Frame>,
    display_queue: HandoffQueue<Frame>,
    preprocess_stats: StageStats,
    tracking_stats: StageStats,
    preprocess_handle: JoinHandle<()>,
    tracking_handle: JoinHandle<Tracker>,
}

#[derive(Default)]
struct Progress {
    pushed: usize,
    displayed: usize,
}

impl Progress {
    fn in_flight(&self, dropped: usize) -> usize {
        self.pushed
            .saturating_sub(self.displayed)
            .saturating_sub(dropped)
    }
}

impl PipelineOrchestrator {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        display: Box<dyn Display>,
        control: PipelineControl,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            front: FrontEnd {
                source,
                display,
                control,
            },
            detector,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle for stopping the pipeline from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Opens the source, runs until end of stream or quit, and joins the
    /// workers.
    pub fn run(self) -> Result<PipelineReport, PipelineError> {
        let Self {
            mut front,
            detector,
            config,
            cancel,
        } = self;

        front.source.initialize()?;
        let start = Instant::now();

        let workers = spawn_workers(detector, &config, &cancel)?;
        let progress = front.control_loop(&workers, &config, &cancel);

        let preprocess_stats = workers.preprocess_stats.clone();
        let tracking_stats = workers.tracking_stats.clone();
        let tracker = workers.shutdown(&cancel)?;

        let report = PipelineReport {
            frames_read: progress.pushed,
            frames_displayed: progress.displayed,
            frames_dropped: preprocess_stats.dropped(),
            detection_failures: tracking_stats.failures(),
            tracks_created: tracker.created_count(),
            active_tracks: tracker.len(),
            elapsed: start.elapsed(),
        };
        log::info!("{}", report.summary_string());
        Ok(report)
    }
}

fn spawn_workers(
    detector: Box<dyn Detector>,
    config: &OrchestratorConfig,
    cancel: &CancellationToken,
) -> Result<Workers, PipelineError> {
    let preprocess_queue = HandoffQueue::new();
    let tracking_queue = HandoffQueue::new();
    let display_queue = HandoffQueue::new();
    let preprocess_stats = StageStats::new();
    let tracking_stats = StageStats::new();

    let preprocess_handle = PreprocessStage::new(
        preprocess_queue.clone(),
        tracking_queue.clone(),
        config.input_size,
        cancel.clone(),
        preprocess_stats.clone(),
    )
    .spawn()?;

    let tracking = TrackingStage::new(
        tracking_queue.clone(),
        display_queue.clone(),
        detector,
        Tracker::new(config.tracking),
        cancel.clone(),
        tracking_stats.clone(),
    );
    let tracking_handle = match tracking.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            cancel.cancel();
            preprocess_queue.push(Frame::sentinel());
            let _ = preprocess_handle.join();
            return Err(e.into());
        }
    };

    log::debug!("Pipeline workers started");
    Ok(Workers {
        preprocess_queue,
        tracking_queue,
        display_queue,
        preprocess_stats,
        tracking_stats,
        preprocess_handle,
        tracking_handle,
    })
}

impl FrontEnd {
    fn control_loop(
        &mut self,
        workers: &Workers,
        config: &OrchestratorConfig,
        cancel: &CancellationToken,
    ) -> Progress {
        let mut progress = Progress::default();
        let mut mode = config.mode;
        // The first frame is fetched without waiting for an advance.
        let mut step_requested = true;
        let mut source_done = false;

        loop {
            for command in self.control.drain() {
                match command {
                    ControlCommand::Advance => step_requested = true,
                    ControlCommand::ToggleMode => {
                        mode = mode.toggled();
                        log::info!("Run mode: {mode:?}");
                    }
                    ControlCommand::ToggleOverlay => self.display.toggle_overlay(),
                    ControlCommand::Quit => {
                        log::info!("Quit requested");
                        cancel.cancel();
                    }
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            if workers.any_finished() {
                log::error!("A pipeline stage exited unexpectedly");
                break;
            }

            let wants_frame = mode == RunMode::Continuous || step_requested;
            let has_room =
                progress.in_flight(workers.preprocess_stats.dropped()) < config.max_in_flight;
            let mut fetched = false;
            if !source_done && wants_frame && has_room {
                match self.source.next_frame() {
                    Some(frame) => {
                        workers.preprocess_queue.push(frame);
                        progress.pushed += 1;
                        step_requested = false;
                        fetched = true;
                    }
                    None => {
                        log::info!("End of stream after {} frames", progress.pushed);
                        source_done = true;
                    }
                }
            }

            if source_done && progress.in_flight(workers.preprocess_stats.dropped()) == 0 {
                break;
            }

            let next = if fetched {
                workers.display_queue.try_pop()
            } else {
                workers.display_queue.pop_timeout(DISPLAY_POLL)
            };
            if let Some(frame) = next {
                if let Err(e) = self.display.show_frame(&frame) {
                    log::error!("{e}");
                }
                progress.displayed += 1;
            }
        }

        progress
    }
}

impl Workers {
    fn any_finished(&self) -> bool {
        self.preprocess_handle.is_finished() || self.tracking_handle.is_finished()
    }

    /// Signals cancellation, wakes every queue with a sentinel and joins both
    /// workers, returning the tracker.
    fn shutdown(self, cancel: &CancellationToken) -> Result<Tracker, PipelineError> {
        cancel.cancel();
        for queue in [
            &self.preprocess_queue,
            &self.tracking_queue,
            &self.display_queue,
        ] {
            queue.push(Frame::sentinel());
        }

        let preprocess = self.preprocess_handle.join();
        let tracking = self.tracking_handle.join();
        log::debug!("Pipeline workers joined");

        if preprocess.is_err() {
            return Err(PipelineError::StagePanicked("preprocess"));
        }
        tracking.map_err(|_| PipelineError::StagePanicked("tracking"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detector::DetectionError;
    use crate::pipeline::control::ControlHandle;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::frame::{Tensor, TrackId};
    use crate::shared::image::Image;
    use crate::video::domain::display::DisplayError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct VecSource {
        frames: VecDeque<Frame>,
        fail_init: bool,
    }

    impl VecSource {
        fn new(count: usize) -> Self {
            Self {
                frames: (0..count).map(test_frame).collect(),
                fail_init: false,
            }
        }
    }

    impl FrameSource for VecSource {
        fn initialize(&mut self) -> Result<(), SourceError> {
            if self.fail_init {
                return Err(SourceError::Open {
                    target: "test".into(),
                    reason: "unavailable".into(),
                });
            }
            Ok(())
        }

        fn next_frame(&mut self) -> Option<Frame> {
            self.frames.pop_front()
        }
    }

    /// Never runs dry.
    struct EndlessSource {
        next: usize,
    }

    impl FrameSource for EndlessSource {
        fn initialize(&mut self) -> Result<(), SourceError> {
            Ok(())
        }

        fn next_frame(&mut self) -> Option<Frame> {
            let frame = test_frame(self.next);
            self.next += 1;
            Some(frame)
        }
    }

    type Shown = Arc<Mutex<Vec<(usize, Vec<Option<TrackId>>)>>>;

    #[derive(Default)]
    struct RecordingDisplay {
        shown: Shown,
        overlay_toggles: Arc<Mutex<usize>>,
    }

    impl Display for RecordingDisplay {
        fn show_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
            self.shown
                .lock()
                .unwrap()
                .push((frame.index(), frame.track_ids().to_vec()));
            Ok(())
        }

        fn toggle_overlay(&mut self) {
            *self.overlay_toggles.lock().unwrap() += 1;
        }
    }

    /// Replays one detection list per call, then nothing.
    struct ScriptedDetector {
        script: VecDeque<Vec<BoundingBox>>,
    }

    impl Detector for ScriptedDetector {
        fn detect(
            &mut self,
            _tensor: &Tensor,
            _original_size: ImageSize,
        ) -> Result<Vec<BoundingBox>, DetectionError> {
            Ok(self.script.pop_front().unwrap_or_default())
        }
    }

    fn test_frame(index: usize) -> Frame {
        Frame::new(Image::filled(16, 12, [40, 80, 120]), index)
    }

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            input_size: ImageSize::new(8, 8),
            max_in_flight: 4,
            ..Default::default()
        }
    }

    fn orchestrator(
        source: Box<dyn FrameSource>,
        script: Vec<Vec<BoundingBox>>,
        display: RecordingDisplay,
        config: OrchestratorConfig,
    ) -> (PipelineOrchestrator, ControlHandle) {
        let (handle, control) = PipelineControl::channel();
        let detector = ScriptedDetector {
            script: script.into(),
        };
        let orchestrator =
            PipelineOrchestrator::new(source, Box::new(detector), Box::new(display), control, config);
        (orchestrator, handle)
    }

    fn wait_for(shown: &Shown, count: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if shown.lock().unwrap().len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_all_frames_displayed_in_order_at_end_of_stream() {
        let display = RecordingDisplay::default();
        let shown = display.shown.clone();
        let (orchestrator, _handle) =
            orchestrator(Box::new(VecSource::new(20)), Vec::new(), display, test_config());

        let report = orchestrator.run().unwrap();

        let indices: Vec<usize> = shown.lock().unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
        assert_eq!(report.frames_read, 20);
        assert_eq!(report.frames_displayed, 20);
        assert_eq!(report.frames_lost(), 0);
    }

    #[test]
    fn test_track_persists_then_evicted_after_empty_frames() {
        let target = BoundingBox::new(4, 4, 6, 6);
        let mut script = vec![vec![target]; 3];
        script.extend(std::iter::repeat(Vec::new()).take(11));

        let display = RecordingDisplay::default();
        let shown = display.shown.clone();
        let (orchestrator, _handle) =
            orchestrator(Box::new(VecSource::new(14)), script, display, test_config());

        let report = orchestrator.run().unwrap();

        let shown = shown.lock().unwrap();
        for (_, ids) in shown.iter().take(3) {
            assert_eq!(ids, &vec![Some(1)]);
        }
        assert!(shown.iter().skip(3).all(|(_, ids)| ids.is_empty()));
        assert_eq!(report.tracks_created, 1);
        assert_eq!(report.active_tracks, 0);
    }

    #[test]
    fn test_empty_frame_dropped_without_stalling_drain() {
        let mut source = VecSource::new(0);
        source.frames.push_back(test_frame(0));
        source.frames.push_back(Frame::new(Image::empty(), 1));
        source.frames.push_back(test_frame(2));

        let display = RecordingDisplay::default();
        let shown = display.shown.clone();
        let (orchestrator, _handle) =
            orchestrator(Box::new(source), Vec::new(), display, test_config());

        let report = orchestrator.run().unwrap();

        let indices: Vec<usize> = shown.lock().unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(report.frames_dropped, 1);
        assert_eq!(report.frames_lost(), 0);
    }

    #[test]
    fn test_single_step_fetches_one_frame_per_advance() {
        let display = RecordingDisplay::default();
        let shown = display.shown.clone();
        let config = OrchestratorConfig {
            mode: RunMode::SingleStep,
            ..test_config()
        };
        let (orchestrator, handle) =
            orchestrator(Box::new(VecSource::new(3)), Vec::new(), display, config);

        let driver = {
            let shown = shown.clone();
            std::thread::spawn(move || {
                assert!(wait_for(&shown, 1));
                std::thread::sleep(Duration::from_millis(50));
                assert_eq!(shown.lock().unwrap().len(), 1);

                handle.send(ControlCommand::Advance);
                assert!(wait_for(&shown, 2));
                std::thread::sleep(Duration::from_millis(50));
                assert_eq!(shown.lock().unwrap().len(), 2);

                handle.send(ControlCommand::Advance);
                assert!(wait_for(&shown, 3));
                // One more advance discovers the end of the stream.
                handle.send(ControlCommand::Advance);
            })
        };

        let report = orchestrator.run().unwrap();
        driver.join().unwrap();
        assert_eq!(report.frames_displayed, 3);
    }

    #[test]
    fn test_toggle_mode_resumes_continuous_run() {
        let display = RecordingDisplay::default();
        let shown = display.shown.clone();
        let config = OrchestratorConfig {
            mode: RunMode::SingleStep,
            ..test_config()
        };
        let (orchestrator, handle) =
            orchestrator(Box::new(VecSource::new(10)), Vec::new(), display, config);

        let driver = std::thread::spawn(move || {
            assert!(wait_for(&shown, 1));
            handle.send(ControlCommand::ToggleMode);
        });

        let report = orchestrator.run().unwrap();
        driver.join().unwrap();
        assert_eq!(report.frames_displayed, 10);
    }

    #[test]
    fn test_quit_stops_endless_source() {
        let display = RecordingDisplay::default();
        let shown = display.shown.clone();
        let toggles = display.overlay_toggles.clone();
        let (orchestrator, handle) = orchestrator(
            Box::new(EndlessSource { next: 0 }),
            Vec::new(),
            display,
            test_config(),
        );

        let driver = std::thread::spawn(move || {
            assert!(wait_for(&shown, 5));
            handle.send(ControlCommand::ToggleOverlay);
            handle.send(ControlCommand::Quit);
        });

        let report = orchestrator.run().unwrap();
        driver.join().unwrap();
        assert!(report.frames_displayed >= 5);
        assert!(report.frames_read - report.frames_displayed <= test_config().max_in_flight);
        assert_eq!(*toggles.lock().unwrap(), 1);
    }

    #[test]
    fn test_external_cancellation_stops_pipeline() {
        let display = RecordingDisplay::default();
        let shown = display.shown.clone();
        let (orchestrator, _handle) = orchestrator(
            Box::new(EndlessSource { next: 0 }),
            Vec::new(),
            display,
            test_config(),
        );
        let token = orchestrator.cancellation_token();

        let canceller = std::thread::spawn(move || {
            assert!(wait_for(&shown, 3));
            token.cancel();
        });

        assert!(orchestrator.run().is_ok());
        canceller.join().unwrap();
    }

    #[test]
    fn test_source_init_failure_is_fatal() {
        let mut source = VecSource::new(3);
        source.fail_init = true;
        let (orchestrator, _handle) = orchestrator(
            Box::new(source),
            Vec::new(),
            RecordingDisplay::default(),
            test_config(),
        );

        assert!(matches!(orchestrator.run(), Err(PipelineError::Source(_))));
    }

    #[test]
    fn test_config_from_app_config() {
        let mut app = AppConfig::default();
        app.pipeline.continuous = false;
        app.pipeline.max_in_flight = 3;
        let config = OrchestratorConfig::from_app_config(&app);
        assert_eq!(config.mode, RunMode::SingleStep);
        assert_eq!(config.max_in_flight, 3);
        assert_eq!(config.input_size, app.model.input_size());
    }
}
