pub mod acoustic;
pub mod keyboard;

pub use acoustic::AcousticInput;
pub use keyboard::KeyboardInput;

use crate::clock::Timestamp;

pub type ParticipantId = u8;

/// Where an input event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Keyboard,
    Acoustic,
}

/// One clap attributed to a participant. Consumed once by the scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    /// 1-based participant number
    pub participant: ParticipantId,
    pub timestamp: Timestamp,
    pub source: InputKind,
}

/// Point-in-time "is this key held" query.
pub trait KeyState {
    fn is_held(&self, key: &str) -> bool;
}

/// Key state for sessions without a keyboard.
pub struct NoKeys;

impl KeyState for NoKeys {
    fn is_held(&self, _key: &str) -> bool {
        false
    }
}

/// The one input mode active for a session. Switching modes means
/// building a new `InputSource` (and dropping the old one).
pub enum InputSource {
    Keyboard(KeyboardInput),
    Acoustic(AcousticInput),
}

impl InputSource {
    pub fn kind(&self) -> InputKind {
        match self {
            InputSource::Keyboard(_) => InputKind::Keyboard,
            InputSource::Acoustic(_) => InputKind::Acoustic,
        }
    }

    /// Participant ids this source can produce events for.
    pub fn participants(&self) -> Vec<ParticipantId> {
        match self {
            InputSource::Keyboard(keyboard) => keyboard.participants(),
            InputSource::Acoustic(_) => vec![acoustic::ACOUSTIC_PARTICIPANT],
        }
    }

    /// Called when tracking starts.
    pub fn begin(&mut self, now: Timestamp) {
        match self {
            InputSource::Keyboard(keyboard) => keyboard.begin(),
            InputSource::Acoustic(acoustic) => acoustic.begin(now),
        }
    }

    /// Collect the events produced since the previous tick.
    pub fn poll(&mut self, now: Timestamp, keys: &dyn KeyState) -> Vec<InputEvent> {
        match self {
            InputSource::Keyboard(keyboard) => keyboard.poll(now, keys),
            InputSource::Acoustic(acoustic) => acoustic.poll(),
        }
    }

    /// Called when tracking ends.
    pub fn end(&mut self) {
        match self {
            InputSource::Keyboard(keyboard) => keyboard.end(),
            InputSource::Acoustic(acoustic) => acoustic.end(),
        }
    }

    /// Release any device held by the source.
    pub fn shutdown(&mut self) {
        if let InputSource::Acoustic(acoustic) = self {
            acoustic.stop();
        }
    }
}
