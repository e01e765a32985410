use std::collections::BTreeMap;
use log::{debug, info};

use super::{InputEvent, InputKind, KeyState, ParticipantId};
use crate::clock::Timestamp;

/// Keyboard mode: one key per participant, polled once per tick.
///
/// A held key fires again once the debounce window has expired, so the
/// fastest a single participant can register is once per `debounce`.
pub struct KeyboardInput {
    bindings: Vec<(ParticipantId, String)>,
    debounce: f64,
    last_press: BTreeMap<ParticipantId, Timestamp>,
    tracking: bool,
}

impl KeyboardInput {
    pub fn new(bindings: Vec<(ParticipantId, String)>, debounce: f64) -> Self {
        Self {
            bindings,
            debounce,
            last_press: BTreeMap::new(),
            tracking: false,
        }
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.bindings.iter().map(|(id, _)| *id).collect()
    }

    pub fn bindings(&self) -> &[(ParticipantId, String)] {
        &self.bindings
    }

    pub fn begin(&mut self) {
        self.tracking = true;
        self.last_press.clear();
        info!("Tracking keyboard inputs for {} players", self.bindings.len());
        for (player, key) in &self.bindings {
            info!("Player {}: press '{}' to clap", player, key);
        }
    }

    pub fn end(&mut self) {
        self.tracking = false;
        info!("Keyboard tracking stopped");
    }

    pub fn poll(&mut self, now: Timestamp, keys: &dyn KeyState) -> Vec<InputEvent> {
        if !self.tracking {
            return Vec::new();
        }

        let mut events = Vec::new();
        for (player, key) in &self.bindings {
            let debounced = self
                .last_press
                .get(player)
                .map_or(true, |last| now - last > self.debounce);

            if debounced && keys.is_held(key) {
                self.last_press.insert(*player, now);
                debug!("Player {} clapped at {:.3}", player, now);
                events.push(InputEvent {
                    participant: *player,
                    timestamp: now,
                    source: InputKind::Keyboard,
                });
            }
        }
        events
    }
}
