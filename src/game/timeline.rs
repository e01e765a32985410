use crate::clock::Timestamp;
use crate::error::{GameError, Result};

/// Ideal beat timestamps for one tracking session.
///
/// A beat here is an accent every two quarter notes, so the spacing is
/// `60 / bpm * 2` seconds. The timeline is immutable once generated.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatTimeline {
    beats: Vec<Timestamp>,
    interval: f64,
}

impl BeatTimeline {
    /// Seconds between two consecutive beats at `bpm`.
    pub fn interval_for(bpm: f64) -> Result<f64> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(GameError::InvalidTempo(bpm));
        }
        Ok(60.0 / bpm * 2.0)
    }

    /// Generate `floor(duration / interval) + 1` beats starting at `start`.
    pub fn generate(start: Timestamp, bpm: f64, duration: f64) -> Result<Self> {
        let interval = Self::interval_for(bpm)?;
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(GameError::InvalidDuration(duration));
        }

        let count = (duration / interval).floor() as usize + 1;
        let beats = (0..count).map(|i| start + i as f64 * interval).collect();

        Ok(Self { beats, interval })
    }

    /// Timeline from explicit beat times. Must be strictly increasing.
    pub fn from_beats(beats: Vec<Timestamp>) -> Result<Self> {
        if beats.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GameError::Config("beat times must be strictly increasing".to_string()));
        }
        let interval = match beats.as_slice() {
            [a, b, ..] => b - a,
            _ => 0.0,
        };
        Ok(Self { beats, interval })
    }

    pub fn beats(&self) -> &[Timestamp] {
        &self.beats
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.beats.first().copied()
    }

    /// True when any beat lies within `tolerance` seconds of `timestamp`.
    pub fn is_on_beat(&self, timestamp: Timestamp, tolerance: f64) -> bool {
        self.beats.iter().any(|beat| (timestamp - beat).abs() <= tolerance)
    }
}
