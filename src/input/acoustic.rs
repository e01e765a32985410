use crossbeam_channel::Receiver;
use std::time::Duration;
use log::{info, warn};

use super::{InputEvent, InputKind, ParticipantId};
use crate::audio::capture::collect_energies;
use crate::audio::{AudioCapture, EnergySample, OnsetDetector};
use crate::clock::{Clock, Timestamp};
use crate::config::AudioSettings;
use crate::error::{GameError, Result};

/// The shared microphone counts as a single participant.
pub const ACOUSTIC_PARTICIPANT: ParticipantId = 1;

/// Acoustic mode: every detected onset becomes an input event.
///
/// The detector runs on the tick thread over energies queued by the capture
/// callback, so it needs no locking. Onsets outside tracking still advance
/// the detector but are not reported, including onsets stamped before
/// tracking began that were still queued when it did.
pub struct AcousticInput {
    capture: Option<AudioCapture>,
    samples: Receiver<EnergySample>,
    detector: OnsetDetector,
    calibration: Duration,
    tracking_since: Option<Timestamp>,
}

impl AcousticInput {
    /// Open the default input device. Fails with [`GameError::Device`].
    pub fn open(settings: &AudioSettings, clock: Clock) -> Result<Self> {
        let capture = AudioCapture::start(settings, clock)?;
        let samples = capture.receiver().clone();
        info!("Acoustic input capturing at {} Hz", capture.sample_rate());

        Ok(Self {
            capture: Some(capture),
            samples,
            detector: OnsetDetector::from_settings(settings),
            calibration: Duration::from_secs_f64(settings.calibration_duration.max(0.0)),
            tracking_since: None,
        })
    }

    /// Acoustic input fed from an arbitrary energy channel (no device).
    pub fn from_channel(samples: Receiver<EnergySample>, detector: OnsetDetector, calibration: Duration) -> Self {
        Self {
            capture: None,
            samples,
            detector,
            calibration,
            tracking_since: None,
        }
    }

    /// Sample ambient energy for the calibration period and derive a new
    /// threshold. Blocks the caller for the whole period.
    pub fn calibrate(&mut self) -> Result<f32> {
        info!(
            "Calibrating microphone for {:.1} seconds. Please remain silent...",
            self.calibration.as_secs_f64()
        );
        let ambient = collect_energies(&self.samples, self.calibration);
        self.detector.calibrate(&ambient)
    }

    pub fn begin(&mut self, now: Timestamp) {
        self.tracking_since = Some(now);
        self.detector.rearm();
        info!("Tracking audio claps! Clap your hands to the beat.");
    }

    pub fn end(&mut self) {
        self.tracking_since = None;
    }

    /// Run the detector over every queued energy sample.
    pub fn poll(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        for sample in self.samples.try_iter() {
            if let Some(timestamp) = self.detector.process(sample) {
                if self.tracking_since.map_or(false, |since| timestamp >= since) {
                    events.push(InputEvent {
                        participant: ACOUSTIC_PARTICIPANT,
                        timestamp,
                        source: InputKind::Acoustic,
                    });
                }
            }
        }
        events
    }

    pub fn detector(&self) -> &OnsetDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut OnsetDetector {
        &mut self.detector
    }

    /// Energy buffers waiting to be processed.
    pub fn pending(&self) -> usize {
        self.samples.len()
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    /// Release the microphone and report what was heard.
    pub fn stop(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };
        capture.stop();

        info!("Detected {} claps.", self.detector.onset_count());
        let intervals = self.detector.intervals();
        if !intervals.is_empty() {
            let rounded: Vec<String> = intervals.iter().map(|i| format!("{:.3}", i)).collect();
            info!("Time intervals between claps (seconds): [{}]", rounded.join(", "));
        }
    }
}

impl Drop for AcousticInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open acoustic input and calibrate it. Calibration failure is reported
/// and the default threshold kept; device failure is returned.
pub fn open_calibrated(settings: &AudioSettings, clock: Clock) -> Result<AcousticInput> {
    let mut input = AcousticInput::open(settings, clock)?;
    match input.calibrate() {
        Ok(_) => {}
        Err(GameError::CalibrationFailed) => {
            warn!("Calibration failed. Using default threshold {:.3}", input.detector().threshold());
        }
        Err(e) => return Err(e),
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(energy: f32, timestamp: f64) -> EnergySample {
        EnergySample { energy, timestamp }
    }

    #[test]
    fn onsets_become_events_only_while_tracking() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut input = AcousticInput::from_channel(receiver, OnsetDetector::new(0.1, 0.5, 30), Duration::ZERO);

        sender.send(sample(0.5, 0.0)).unwrap();
        sender.send(sample(0.01, 0.1)).unwrap();
        assert!(input.poll().is_empty());
        assert_eq!(input.detector().onset_count(), 1);

        input.begin(1.0);
        sender.send(sample(0.5, 1.0)).unwrap();
        sender.send(sample(0.01, 1.1)).unwrap();
        let events = input.poll();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].participant, ACOUSTIC_PARTICIPANT);
        assert_eq!(events[0].timestamp, 1.1);
        assert_eq!(events[0].source, InputKind::Acoustic);
        assert!(!input.is_running());
    }

    #[test]
    fn onsets_queued_before_begin_are_not_reported() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut input = AcousticInput::from_channel(receiver, OnsetDetector::new(0.1, 0.5, 30), Duration::ZERO);

        sender.send(sample(0.5, 0.8)).unwrap();
        sender.send(sample(0.01, 0.9)).unwrap();
        assert_eq!(input.pending(), 2);

        input.begin(1.0);
        assert!(input.poll().is_empty());
        assert_eq!(input.pending(), 0);
        assert_eq!(input.detector().onset_count(), 1);
    }

    #[test]
    fn calibration_without_audio_keeps_threshold() {
        let (sender, receiver) = crossbeam_channel::unbounded::<EnergySample>();
        drop(sender);
        let mut input = AcousticInput::from_channel(receiver, OnsetDetector::new(0.1, 0.5, 30), Duration::from_millis(10));

        assert!(matches!(input.calibrate(), Err(GameError::CalibrationFailed)));
        assert_eq!(input.detector().threshold(), 0.1);
    }
}
