pub mod capture;
pub mod onset;
pub mod playback;
pub mod wav;

pub use capture::AudioCapture;
pub use onset::{OnsetDetector, OnsetState};
pub use playback::{Playback, TrackPlayer};

use crate::clock::Timestamp;

/// Mean absolute amplitude of one audio buffer, stamped on the shared clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    pub energy: f32,
    pub timestamp: Timestamp,
}

/// Mean absolute amplitude of `samples`; 0 for an empty buffer.
pub fn mean_abs_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&x| x.abs()).sum::<f32>() / samples.len() as f32
}

/// Average interleaved frames down to mono.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}
