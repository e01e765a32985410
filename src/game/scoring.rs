use std::collections::BTreeMap;
use log::{debug, warn};

use super::timeline::BeatTimeline;
use crate::input::{InputEvent, ParticipantId};

/// Running tally for one participant. `on_beat <= total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantScore {
    pub total: u32,
    pub on_beat: u32,
}

/// Derived view of a participant's score for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    pub participant: ParticipantId,
    pub total: u32,
    pub on_beat: u32,
    /// On-beat share of all events, 0-100
    pub accuracy: f64,
    pub missed_beats: u32,
}

/// Per-participant scores for the current session.
///
/// The same scoreboard lives across sessions and is cleared in place when
/// a new session starts tracking.
#[derive(Debug, Clone)]
pub struct Scoreboard {
    scores: BTreeMap<ParticipantId, ParticipantScore>,
    total_beats: u32,
}

impl Scoreboard {
    pub fn new(participants: &[ParticipantId]) -> Self {
        Self {
            scores: participants.iter().map(|&id| (id, ParticipantScore::default())).collect(),
            total_beats: 0,
        }
    }

    pub fn reset(&mut self) {
        for score in self.scores.values_mut() {
            *score = ParticipantScore::default();
        }
        self.total_beats = 0;
    }

    /// Score one input event against `timeline`. Returns whether it was on beat.
    ///
    /// An event matching several beats still counts once. Events from
    /// unknown participants are dropped without touching any score.
    pub fn register(&mut self, event: &InputEvent, timeline: &BeatTimeline, tolerance: f64) -> bool {
        let Some(score) = self.scores.get_mut(&event.participant) else {
            warn!("Ignoring clap from unknown player {}", event.participant);
            return false;
        };

        let on_beat = timeline.is_on_beat(event.timestamp, tolerance);
        score.total += 1;
        if on_beat {
            score.on_beat += 1;
            debug!("Player {}: on beat at {:.3}", event.participant, event.timestamp);
        } else {
            debug!("Player {}: off beat at {:.3}", event.participant, event.timestamp);
        }
        on_beat
    }

    /// Count one ideal beat that has elapsed.
    pub fn register_beat(&mut self) {
        self.total_beats += 1;
    }

    pub fn total_beats(&self) -> u32 {
        self.total_beats
    }

    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.scores.keys().copied()
    }

    pub fn raw(&self, participant: ParticipantId) -> Option<ParticipantScore> {
        self.scores.get(&participant).copied()
    }

    /// Summary for `participant`; zeroed when the participant is unknown.
    pub fn summary(&self, participant: ParticipantId) -> ScoreSummary {
        let score = self.raw(participant).unwrap_or_default();
        let accuracy = if score.total == 0 {
            0.0
        } else {
            score.on_beat as f64 / score.total as f64 * 100.0
        };

        ScoreSummary {
            participant,
            total: score.total,
            on_beat: score.on_beat,
            accuracy,
            missed_beats: self.total_beats.saturating_sub(score.on_beat),
        }
    }

    pub fn summaries(&self) -> Vec<ScoreSummary> {
        self.participants().map(|id| self.summary(id)).collect()
    }

    /// Participant with the strictly highest on-beat count; the lowest id
    /// wins among equals. Tie detection is left to the caller.
    pub fn winner(&self) -> Option<ScoreSummary> {
        let mut best: Option<(ParticipantId, u32)> = None;
        for (&id, score) in &self.scores {
            if best.map_or(true, |(_, on_beat)| score.on_beat > on_beat) {
                best = Some((id, score.on_beat));
            }
        }
        best.map(|(id, _)| self.summary(id))
    }
}
