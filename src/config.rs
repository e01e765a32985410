use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use log::info;

use crate::error::{GameError, Result};

/// A reference track. Immutable once loaded; the name is the catalog key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub bpm: f64,
}

impl Track {
    pub fn new(name: impl Into<String>, bpm: f64) -> Self {
        Self { name: name.into(), bpm }
    }
}

/// Which slice of the catalog a run plays from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoMode {
    /// Every track in the catalog
    Slow,
    /// Only tracks at or above [`MEDIUM_TEMPO_FLOOR`] BPM
    Medium,
}

pub const MEDIUM_TEMPO_FLOOR: f64 = 90.0;

/// Ordered, read-only list of tracks. Catalog order is significant: tempo
/// selection resolves duplicate tempos to the first matching entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCatalog {
    tracks: Vec<Track>,
}

impl TrackCatalog {
    pub fn new(tracks: Vec<Track>) -> Result<Self> {
        if tracks.is_empty() {
            return Err(GameError::Config("track catalog is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for track in &tracks {
            if !(track.bpm.is_finite() && track.bpm > 0.0) {
                return Err(GameError::InvalidTempo(track.bpm));
            }
            if !seen.insert(track.name.as_str()) {
                return Err(GameError::Config(format!("duplicate track name '{}'", track.name)));
            }
        }

        Ok(Self { tracks })
    }

    /// Restrict the catalog to the given tempo mode.
    pub fn filtered(&self, mode: TempoMode) -> Result<Self> {
        match mode {
            TempoMode::Slow => Ok(self.clone()),
            TempoMode::Medium => Self::new(
                self.tracks
                    .iter()
                    .filter(|t| t.bpm >= MEDIUM_TEMPO_FLOOR)
                    .cloned()
                    .collect(),
            ),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn first(&self) -> &Track {
        // Non-empty by construction
        &self.tracks[0]
    }

    pub fn get(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    /// First track in catalog order whose tempo equals `bpm` exactly.
    pub fn find_by_tempo(&self, bpm: f64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.bpm == bpm)
    }

    /// Distinct catalog tempos in ascending order.
    pub fn sorted_tempos(&self) -> Vec<f64> {
        let mut tempos: Vec<f64> = self.tracks.iter().map(|t| t.bpm).collect();
        tempos.sort_by(|a, b| a.total_cmp(b));
        tempos.dedup();
        tempos
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Tracking duration in seconds
    pub duration: f64,
    /// Countdown before tracking starts, in seconds
    pub countdown: f64,
    /// Allowed deviation from a beat, in seconds
    pub tolerance: f64,
    /// On-beat count that must be exceeded to move to a faster tempo
    pub score_threshold: u32,
    /// Tracking loop frequency in Hz
    pub tick_rate: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration: 20.0,
            countdown: 5.0,
            tolerance: 0.2,
            score_threshold: 5,
            tick_rate: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardSettings {
    /// Key names for players 1..=4, in player order
    pub player_keys: Vec<String>,
    /// Minimum seconds between two events from the same player
    pub debounce: f64,
}

impl Default for KeyboardSettings {
    fn default() -> Self {
        Self {
            player_keys: ["space", "up", "down", "left"].iter().map(|k| k.to_string()).collect(),
            debounce: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    /// Mono samples per energy buffer
    pub buffer_size: usize,
    pub channels: u16,
    /// Onset threshold used until calibration replaces it
    pub threshold: f32,
    /// Refractory period between two onsets, in seconds
    pub min_time_between_claps: f64,
    /// Ambient calibration length, in seconds
    pub calibration_duration: f64,
    /// Number of recent energy values kept for display
    pub history_size: usize,
    /// Energy buffers the capture queue holds before dropping
    pub queue_capacity: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 1024,
            channels: 1,
            threshold: 0.1,
            min_time_between_claps: 0.5,
            calibration_duration: 3.0,
            history_size: 30,
            queue_capacity: 256,
        }
    }
}

/// Raw on-disk configuration. Parsed once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Directory holding the track audio files (empty = working directory)
    pub music_dir: String,
    pub tracks: Vec<Track>,
    pub session: SessionSettings,
    pub keyboard: KeyboardSettings,
    pub audio: AudioSettings,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            music_dir: String::new(),
            tracks: vec![
                Track::new("Hotel California", 74.0),
                Track::new("Yellow", 84.0),
                Track::new("Chaiyya Chaiyya", 92.0),
                Track::new("Chasing Cars", 104.0),
                Track::new("Another One Bites The Dust", 110.0),
                Track::new("Dynamite", 116.0),
                Track::new("Beat It", 140.0),
            ],
            session: SessionSettings::default(),
            keyboard: KeyboardSettings::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl GameConfig {
    /// Load configuration from a JSON file; missing fields take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(&path)?;
        let config = Self::from_json_str(&json)?;
        info!("Loaded configuration from {:?} ({} tracks)", path.as_ref(), config.tracks.len());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        TrackCatalog::new(self.tracks.clone())?;

        let s = &self.session;
        if !(s.duration.is_finite() && s.duration > 0.0) {
            return Err(GameError::InvalidDuration(s.duration));
        }
        if !(s.countdown.is_finite() && s.countdown >= 0.0) {
            return Err(GameError::InvalidDuration(s.countdown));
        }
        if !(s.tolerance >= 0.0) {
            return Err(GameError::Config(format!("tolerance must be non-negative, got {}", s.tolerance)));
        }
        if !(s.tick_rate > 0.0) {
            return Err(GameError::Config(format!("tick rate must be positive, got {}", s.tick_rate)));
        }
        if self.keyboard.player_keys.len() < MAX_KEYBOARD_PLAYERS as usize {
            return Err(GameError::Config(format!(
                "need {} player keys, got {}",
                MAX_KEYBOARD_PLAYERS,
                self.keyboard.player_keys.len()
            )));
        }
        if self.audio.buffer_size == 0 || self.audio.queue_capacity == 0 {
            return Err(GameError::Config("audio buffer size and queue capacity must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn catalog(&self, mode: TempoMode) -> Result<TrackCatalog> {
        TrackCatalog::new(self.tracks.clone())?.filtered(mode)
    }

    /// Key bindings for the first `players` keyboard participants.
    pub fn key_bindings(&self, players: u8) -> Result<Vec<(u8, String)>> {
        if !(MIN_KEYBOARD_PLAYERS..=MAX_KEYBOARD_PLAYERS).contains(&players) {
            return Err(GameError::Config(format!(
                "keyboard mode supports {}-{} players, got {}",
                MIN_KEYBOARD_PLAYERS, MAX_KEYBOARD_PLAYERS, players
            )));
        }

        Ok(self
            .keyboard
            .player_keys
            .iter()
            .take(players as usize)
            .enumerate()
            .map(|(i, key)| (i as u8 + 1, key.clone()))
            .collect())
    }
}

pub const MIN_KEYBOARD_PLAYERS: u8 = 2;
pub const MAX_KEYBOARD_PLAYERS: u8 = 4;
