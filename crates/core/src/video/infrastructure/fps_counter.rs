use std::time::{Duration, Instant};

/// Weight of the newest sample in the running estimate.
const SMOOTHING: f64 = 0.1;

/// Exponentially smoothed frames-per-second estimate.
#[derive(Debug, Default)]
pub struct FpsCounter {
    last: Option<Instant>,
    fps: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    /// Records a frame shown at `now` and returns the updated estimate.
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last {
            let dt = now.saturating_duration_since(last);
            if dt > Duration::ZERO {
                let sample = 1.0 / dt.as_secs_f64();
                self.fps = if self.fps == 0.0 {
                    sample
                } else {
                    self.fps + SMOOTHING * (sample - self.fps)
                };
            }
        }
        self.last = Some(now);
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}
