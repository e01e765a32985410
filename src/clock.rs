use std::time::Instant;

/// Seconds on the shared monotonic clock.
pub type Timestamp = f64;

/// Monotonic clock shared by the tick loop and the audio callback so that
/// beats and input events live in one time domain.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    pub fn now(&self) -> Timestamp {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Format seconds as `MM:SS`.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
