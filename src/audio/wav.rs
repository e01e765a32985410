use hound::{SampleFormat, WavReader};
use std::path::Path;
use log::info;

use super::{downmix, mean_abs_energy, EnergySample};
use crate::error::{GameError, Result};

/// Decoded WAV file reduced to per-buffer energies.
#[derive(Debug, Clone)]
pub struct WavEnergies {
    pub sample_rate: u32,
    pub duration: f64,
    pub samples: Vec<EnergySample>,
}

/// Read a WAV file and reduce it to one [`EnergySample`] per `buffer_size`
/// frames, timestamped from the start of the file.
pub fn read_energies<P: AsRef<Path>>(path: P, buffer_size: usize) -> Result<WavEnergies> {
    let mut reader = WavReader::open(&path)?;
    let spec = reader.spec();

    let raw: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let mono = downmix(&raw, spec.channels as usize);
    let duration = mono.len() as f64 / spec.sample_rate as f64;
    info!(
        "Read {:?}: {} Hz, {} channel(s), {:.2}s",
        path.as_ref(),
        spec.sample_rate,
        spec.channels,
        duration
    );

    Ok(WavEnergies {
        sample_rate: spec.sample_rate,
        duration,
        samples: energies(&mono, spec.sample_rate, buffer_size)?,
    })
}

/// Split mono samples into full buffers. A trailing partial buffer is dropped.
pub fn energies(mono: &[f32], sample_rate: u32, buffer_size: usize) -> Result<Vec<EnergySample>> {
    if buffer_size == 0 || sample_rate == 0 {
        return Err(GameError::Config("buffer size and sample rate must be non-zero".to_string()));
    }

    Ok(mono
        .chunks_exact(buffer_size)
        .enumerate()
        .map(|(i, chunk)| EnergySample {
            energy: mean_abs_energy(chunk),
            timestamp: (i * buffer_size) as f64 / sample_rate as f64,
        })
        .collect())
}
