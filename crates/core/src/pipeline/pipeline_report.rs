use std::time::Duration;

/// End-of-run summary returned by the orchestrator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineReport {
    pub frames_read: usize,
    pub frames_displayed: usize,
    /// Frames discarded by preprocessing (empty or malformed images).
    pub frames_dropped: usize,
    /// Frames that reached tracking but degraded to zero detections.
    pub detection_failures: usize,
    pub tracks_created: usize,
    pub active_tracks: usize,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn throughput_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames_displayed as f64 / secs
        } else {
            0.0
        }
    }

    /// Frames pushed into the pipeline that never reached the display,
    /// either dropped or abandoned by an early quit.
    pub fn frames_lost(&self) -> usize {
        self.frames_read
            .saturating_sub(self.frames_displayed)
            .saturating_sub(self.frames_dropped)
    }

    pub fn summary_string(&self) -> String {
        let mut lines = vec![format!(
            "Pipeline summary ({} frames, {:.1}s total):",
            self.frames_displayed,
            self.elapsed.as_secs_f64()
        )];
        lines.push(format!("  Frames read      : {}", self.frames_read));
        lines.push(format!("  Frames dropped   : {}", self.frames_dropped));
        if self.frames_lost() > 0 {
            lines.push(format!("  Frames abandoned : {}", self.frames_lost()));
        }
        lines.push(format!("  Detector errors  : {}", self.detection_failures));
        lines.push(format!(
            "  Tracks           : {} created, {} active",
            self.tracks_created, self.active_tracks
        ));
        if self.frames_displayed > 0 && self.elapsed > Duration::ZERO {
            lines.push(format!("  Throughput: {:.1} fps", self.throughput_fps()));
        }
        lines.join("\n")
    }
}
