use std::fmt;
use log::info;

use crate::config::{Track, TrackCatalog};
use crate::error::{GameError, Result};

/// Coarse difficulty label for a tempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    pub fn for_bpm(bpm: f64) -> Self {
        if bpm < 80.0 {
            Difficulty::Easy
        } else if bpm < 100.0 {
            Difficulty::Medium
        } else if bpm < 120.0 {
            Difficulty::Hard
        } else {
            Difficulty::Expert
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Expert => "Expert",
        };
        f.write_str(name)
    }
}

/// Direction taken by the tempo ladder after a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoStep {
    Faster,
    Slower,
    Repeat,
}

/// Pick the tempo for the next session.
///
/// The played tempo is snapped to the closest catalog tempo first, since
/// it may not be in a filtered catalog. Scores above `threshold` climb one
/// step, scores at or below it drop one step, and the ends of the ladder
/// repeat.
pub fn next_tempo(tempos: &[f64], current_bpm: f64, on_beat: u32, threshold: u32) -> Option<(f64, TempoStep)> {
    let current_index = tempos
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - current_bpm).abs().total_cmp(&(*b - current_bpm).abs()))
        .map(|(i, _)| i)?;

    if on_beat > threshold && current_index + 1 < tempos.len() {
        Some((tempos[current_index + 1], TempoStep::Faster))
    } else if on_beat <= threshold && current_index > 0 {
        Some((tempos[current_index - 1], TempoStep::Slower))
    } else {
        Some((current_bpm, TempoStep::Repeat))
    }
}

/// Resolve the next track from the catalog given the winner's on-beat count.
pub fn select_next_track<'a>(
    catalog: &'a TrackCatalog,
    current_bpm: f64,
    on_beat: u32,
    threshold: u32,
) -> Result<(&'a Track, TempoStep)> {
    let (bpm, step) = next_tempo(&catalog.sorted_tempos(), current_bpm, on_beat, threshold)
        .ok_or(GameError::TrackNotFound(current_bpm))?;

    let track = catalog.find_by_tempo(bpm).ok_or(GameError::TrackNotFound(bpm))?;

    match step {
        TempoStep::Faster => info!("Great job! Moving to a faster song."),
        TempoStep::Slower => info!("Let's try an easier tempo."),
        TempoStep::Repeat => info!("Let's try this tempo again."),
    }
    info!("Next song: {} ({} BPM)", track.name, track.bpm);

    Ok((track, step))
}
