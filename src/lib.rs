pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod input;

pub use clock::{format_clock, Clock, Timestamp};
pub use config::{GameConfig, TempoMode, Track, TrackCatalog};
pub use error::{GameError, Result};
