//! Session logic: beat timelines, scoring, tempo progression and the
//! tick-driven controller that ties them together.

pub mod difficulty;
pub mod scoring;
pub mod session;
pub mod timeline;

pub use difficulty::{next_tempo, select_next_track, Difficulty, TempoStep};
pub use scoring::{ParticipantScore, ScoreSummary, Scoreboard};
pub use session::{GameController, Phase, SessionReport, Tick};
pub use timeline::BeatTimeline;
