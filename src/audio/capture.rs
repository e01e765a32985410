use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::{Duration, Instant};
use log::{debug, info, warn};

use super::{downmix, mean_abs_energy, EnergySample};
use crate::clock::Clock;
use crate::config::AudioSettings;
use crate::error::{GameError, Result};

/// Live microphone capture producing one [`EnergySample`] per buffer.
///
/// The cpal callback only reduces samples to an energy value and enqueues
/// it; all detection runs on the consumer side. Dropping the capture drops
/// the stream and releases the input device.
pub struct AudioCapture {
    stream: Stream,
    receiver: Receiver<EnergySample>,
    sample_rate: u32,
}

impl AudioCapture {
    pub fn start(settings: &AudioSettings, clock: Clock) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| GameError::Device("No input device available".to_string()))?;

        info!("Using audio device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));

        let supported = Self::choose_config(&device, settings)?;
        info!("Audio config: {:?}", supported);

        let sample_rate = supported.sample_rate().0;
        let (sender, receiver) = crossbeam_channel::bounded(settings.queue_capacity);

        let config: StreamConfig = supported.config();
        let buffer_size = settings.buffer_size;
        let stream = match supported.sample_format() {
            SampleFormat::F32 => Self::create_input_stream::<f32>(&device, &config, buffer_size, clock, sender),
            SampleFormat::I16 => Self::create_input_stream::<i16>(&device, &config, buffer_size, clock, sender),
            SampleFormat::U16 => Self::create_input_stream::<u16>(&device, &config, buffer_size, clock, sender),
            other => Err(GameError::Device(format!("Unsupported sample format: {:?}", other))),
        }?;

        stream
            .play()
            .map_err(|e| GameError::Device(format!("Failed to start input stream: {}", e)))?;
        info!("Audio capture started. Listening for claps...");

        Ok(Self {
            stream,
            receiver,
            sample_rate,
        })
    }

    /// Prefer the configured rate and channel count, else the device default.
    fn choose_config(device: &Device, settings: &AudioSettings) -> Result<SupportedStreamConfig> {
        let wanted = cpal::SampleRate(settings.sample_rate);

        if let Ok(mut ranges) = device.supported_input_configs() {
            let matching = ranges.find(|range| {
                range.channels() == settings.channels
                    && range.min_sample_rate() <= wanted
                    && range.max_sample_rate() >= wanted
            });
            if let Some(range) = matching {
                return Ok(range.with_sample_rate(wanted));
            }
        }

        debug!("Configured input format unavailable, using device default");
        device
            .default_input_config()
            .map_err(|e| GameError::Device(format!("Failed to get default input config: {}", e)))
    }

    fn create_input_stream<T>(
        device: &Device,
        config: &StreamConfig,
        buffer_size: usize,
        clock: Clock,
        sender: Sender<EnergySample>,
    ) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = config.channels as usize;
        let mut pending: Vec<f32> = Vec::with_capacity(buffer_size * 2);

        info!("Creating input stream with {} channels at {} Hz", channels, config.sample_rate.0);

        let stream = device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                    pending.extend(downmix(&samples, channels));

                    while pending.len() >= buffer_size {
                        let energy = mean_abs_energy(&pending[..buffer_size]);
                        pending.drain(..buffer_size);

                        let sample = EnergySample { energy, timestamp: clock.now() };
                        match sender.try_send(sample) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => warn!("Energy queue full, dropping audio buffer"),
                            Err(TrySendError::Disconnected(_)) => return,
                        }
                    }
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| GameError::Device(format!("Failed to open input stream: {}", e)))?;

        Ok(stream)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn receiver(&self) -> &Receiver<EnergySample> {
        &self.receiver
    }

    /// Pause and release the input device.
    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause input stream: {}", e);
        }
        drop(self.stream);
        info!("Audio capture stopped");
    }
}

/// Block for `duration`, collecting the energy of every buffer received.
/// Anything already queued is discarded first.
pub fn collect_energies(receiver: &Receiver<EnergySample>, duration: Duration) -> Vec<f32> {
    for _ in receiver.try_iter() {}

    let deadline = Instant::now() + duration;
    let mut energies = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match receiver.recv_timeout(remaining) {
            Ok(sample) => energies.push(sample.energy),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    energies
}
