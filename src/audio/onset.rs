use std::collections::VecDeque;
use log::{debug, info, warn};

use super::EnergySample;
use crate::clock::Timestamp;
use crate::config::AudioSettings;
use crate::error::{GameError, Result};

/// Calibrated threshold is this many standard deviations above ambient.
pub const CALIBRATION_SIGMAS: f32 = 8.0;

/// Below `threshold * EARLY_RESET_RATIO` the detector drops back to idle.
pub const EARLY_RESET_RATIO: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetState {
    Idle,
    /// Energy went above threshold; waiting for it to fall back
    Rising,
}

pub type OnsetCallback = Box<dyn FnMut(Timestamp) + Send>;

/// Clap detector over a stream of per-buffer energies.
///
/// An onset is reported on the falling edge: energy rises above the
/// threshold, then the first sample back below it emits an onset stamped
/// with that falling sample's time. Within the refractory window after an
/// onset the state machine is frozen entirely, so a clap's decay tail
/// cannot re-arm it.
pub struct OnsetDetector {
    threshold: f32,
    min_time_between_onsets: f64,
    state: OnsetState,
    last_onset: Option<Timestamp>,
    energy_history: VecDeque<f32>,
    history_size: usize,
    onsets: Vec<Timestamp>,
    callback: Option<OnsetCallback>,
}

impl OnsetDetector {
    pub fn new(threshold: f32, min_time_between_onsets: f64, history_size: usize) -> Self {
        Self {
            threshold,
            min_time_between_onsets,
            state: OnsetState::Idle,
            last_onset: None,
            energy_history: VecDeque::with_capacity(history_size),
            history_size,
            onsets: Vec::new(),
            callback: None,
        }
    }

    pub fn from_settings(settings: &AudioSettings) -> Self {
        Self::new(settings.threshold, settings.min_time_between_claps, settings.history_size)
    }

    /// Register a function invoked with the timestamp of every onset.
    pub fn set_callback(&mut self, callback: OnsetCallback) {
        self.callback = Some(callback);
    }

    /// Feed one energy sample. Returns the onset timestamp if one fired.
    pub fn process(&mut self, sample: EnergySample) -> Option<Timestamp> {
        let EnergySample { energy, timestamp } = sample;

        self.energy_history.push_back(energy);
        if self.energy_history.len() > self.history_size {
            self.energy_history.pop_front();
        }

        let refractory = self
            .last_onset
            .map_or(false, |last| timestamp - last <= self.min_time_between_onsets);
        if refractory {
            return None;
        }

        if energy > self.threshold && self.state == OnsetState::Idle {
            self.state = OnsetState::Rising;
            None
        } else if self.state == OnsetState::Rising && energy < self.threshold {
            self.state = OnsetState::Idle;
            self.register_onset(timestamp);
            Some(timestamp)
        } else {
            if energy < self.threshold * EARLY_RESET_RATIO {
                self.state = OnsetState::Idle;
            }
            None
        }
    }

    fn register_onset(&mut self, timestamp: Timestamp) {
        self.last_onset = Some(timestamp);
        self.onsets.push(timestamp);
        info!("👏 Clap detected! Total: {}", self.onsets.len());

        if let Some(callback) = self.callback.as_mut() {
            callback(timestamp);
        }
    }

    /// Derive a threshold from ambient energies: mean + 8 standard deviations.
    ///
    /// With no samples the current threshold is kept and
    /// [`GameError::CalibrationFailed`] is returned.
    pub fn calibrate(&mut self, ambient: &[f32]) -> Result<f32> {
        let Some(threshold) = calibrated_threshold(ambient) else {
            warn!("Calibration failed. Keeping threshold {:.6}", self.threshold);
            return Err(GameError::CalibrationFailed);
        };

        self.threshold = threshold;
        info!("Calibration complete. Threshold set to: {:.6}", threshold);
        debug!("Ambient noise level: {:.6} over {} buffers", mean(ambient), ambient.len());
        Ok(threshold)
    }

    /// Drop the rising/idle sub-state without forgetting past onsets.
    pub fn rearm(&mut self) {
        self.state = OnsetState::Idle;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn state(&self) -> OnsetState {
        self.state
    }

    pub fn onset_count(&self) -> usize {
        self.onsets.len()
    }

    pub fn onsets(&self) -> &[Timestamp] {
        &self.onsets
    }

    pub fn last_onset(&self) -> Option<Timestamp> {
        self.last_onset
    }

    pub fn energy_history(&self) -> &VecDeque<f32> {
        &self.energy_history
    }

    /// Seconds between consecutive onsets.
    pub fn intervals(&self) -> Vec<f64> {
        self.onsets.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

/// `mean + 8 * stddev` (population deviation), or `None` for no samples.
pub fn calibrated_threshold(ambient: &[f32]) -> Option<f32> {
    if ambient.is_empty() {
        return None;
    }

    let mean = mean(ambient);
    let variance = ambient.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / ambient.len() as f32;

    Some(mean + CALIBRATION_SIGMAS * variance.sqrt())
}
