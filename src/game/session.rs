use std::sync::Arc;
use log::{debug, error, info};

use super::difficulty::{select_next_track, Difficulty, TempoStep};
use super::scoring::{ScoreSummary, Scoreboard};
use super::timeline::BeatTimeline;
use crate::audio::Playback;
use crate::clock::Timestamp;
use crate::config::{GameConfig, Track, TrackCatalog};
use crate::error::{GameError, Result};
use crate::input::{InputEvent, InputSource, KeyState, ParticipantId};

/// Observable controller phase. A session ends inside the tick that
/// finalizes it; that tick returns [`Tick::Finished`] and leaves the
/// controller idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CountingDown,
    Tracking,
}

/// One countdown + tracking run for a single track.
#[derive(Debug)]
struct Session {
    phase: Phase,
    track: Track,
    countdown_ends: Timestamp,
    tracking_started: Timestamp,
    timeline: Option<BeatTimeline>,
    next_beat: usize,
}

/// Final result of a session, produced exactly once when it ends.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub track: Track,
    pub summaries: Vec<ScoreSummary>,
    pub total_beats: u32,
    /// First participant with the highest on-beat count
    pub winner: Option<ScoreSummary>,
    /// Every participant sharing the highest on-beat count
    pub leaders: Vec<ParticipantId>,
    pub next_track: Track,
    pub step: TempoStep,
    pub stopped_early: bool,
}

impl SessionReport {
    pub fn is_tie(&self) -> bool {
        self.leaders.len() > 1
    }
}

/// What happened during one call to [`GameController::advance`].
#[derive(Debug, Clone)]
pub enum Tick {
    Idle,
    CountingDown { remaining: f64 },
    Tracking {
        remaining: f64,
        /// Ideal beats that passed during this tick
        beats: u32,
        /// Input events scored this tick, with their on-beat verdict
        judged: Vec<(InputEvent, bool)>,
    },
    /// Stop was requested before tracking began
    Cancelled,
    Finished(SessionReport),
}

/// Drives sessions and picks the next tempo from each outcome.
///
/// Owns the active track, timeline and scoreboard. Time only moves when
/// the caller passes a timestamp to [`advance`](Self::advance), once per tick.
pub struct GameController<P: Playback> {
    config: Arc<GameConfig>,
    catalog: TrackCatalog,
    current: Track,
    input: InputSource,
    player: P,
    scoreboard: Scoreboard,
    session: Option<Session>,
    stop_requested: bool,
}

impl<P: Playback> GameController<P> {
    pub fn new(config: Arc<GameConfig>, catalog: TrackCatalog, input: InputSource, player: P) -> Self {
        let scoreboard = Scoreboard::new(&input.participants());
        let current = catalog.first().clone();

        Self {
            config,
            catalog,
            current,
            input,
            player,
            scoreboard,
            session: None,
            stop_requested: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.session.as_ref().map_or(Phase::Idle, |s| s.phase)
    }

    pub fn current_track(&self) -> &Track {
        &self.current
    }

    /// Choose the track for the next session by name.
    pub fn select_track(&mut self, name: &str) -> Result<()> {
        if self.session.is_some() {
            return Err(GameError::InvalidState("cannot change track during a session".to_string()));
        }
        let track = self
            .catalog
            .get(name)
            .ok_or_else(|| GameError::Config(format!("unknown track '{}'", name)))?;
        self.current = track.clone();
        Ok(())
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn timeline(&self) -> Option<&BeatTimeline> {
        self.session.as_ref().and_then(|s| s.timeline.as_ref())
    }

    pub fn input(&self) -> &InputSource {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputSource {
        &mut self.input
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    /// Load and start the current track and begin the countdown.
    ///
    /// On failure nothing changes: the controller stays idle and the last
    /// session's scores are kept.
    pub fn start(&mut self, now: Timestamp) -> Result<()> {
        if self.session.is_some() {
            return Err(GameError::InvalidState("a session is already running".to_string()));
        }

        let track = self.current.clone();
        BeatTimeline::interval_for(track.bpm)?;

        if let Err(e) = self.player.load(&track) {
            error!("Failed to load song: {}", e);
            return Err(e);
        }
        self.player.play();

        let countdown = self.config.session.countdown;
        info!("Game starting in {} seconds...", countdown);
        info!(
            "Get ready to play: {} at {} BPM ({})",
            track.name,
            track.bpm,
            Difficulty::for_bpm(track.bpm)
        );

        self.stop_requested = false;
        self.session = Some(Session {
            phase: Phase::CountingDown,
            track,
            countdown_ends: now + countdown,
            tracking_started: now,
            timeline: None,
            next_beat: 0,
        });
        Ok(())
    }

    /// Ask the running session to stop; honoured on the next tick.
    pub fn request_stop(&mut self) {
        if self.session.is_some() {
            self.stop_requested = true;
        }
    }

    /// Run one tick at `now`. Every comparison in the tick uses this one timestamp.
    ///
    /// Input is drained on every tick, whatever the phase, so nothing heard
    /// before tracking begins can be scored in the session.
    pub fn advance(&mut self, now: Timestamp, keys: &dyn KeyState) -> Tick {
        match self.phase() {
            Phase::Idle => {
                self.discard_input(now, keys);
                Tick::Idle
            }
            Phase::CountingDown => {
                self.discard_input(now, keys);
                if self.stop_requested {
                    return self.cancel();
                }

                let ends = self.session.as_ref().map_or(now, |s| s.countdown_ends);
                if now < ends {
                    return Tick::CountingDown { remaining: ends - now };
                }

                if let Err(e) = self.begin_tracking(now) {
                    error!("Could not start tracking: {}", e);
                    return self.cancel();
                }
                self.track_tick(now, keys)
            }
            Phase::Tracking => self.track_tick(now, keys),
        }
    }

    fn discard_input(&mut self, now: Timestamp, keys: &dyn KeyState) {
        let dropped = self.input.poll(now, keys).len();
        if dropped > 0 {
            debug!("Discarded {} claps outside tracking", dropped);
        }
    }

    fn begin_tracking(&mut self, now: Timestamp) -> Result<()> {
        let duration = self.config.session.duration;
        let Some(session) = self.session.as_mut() else {
            return Err(GameError::InvalidState("no session to track".to_string()));
        };

        let timeline = BeatTimeline::generate(now, session.track.bpm, duration)?;
        debug!("Generated {} beats every {:.3}s", timeline.len(), timeline.interval());

        session.timeline = Some(timeline);
        session.tracking_started = now;
        session.next_beat = 0;
        session.phase = Phase::Tracking;

        self.scoreboard.reset();
        self.input.begin(now);
        info!("Tracking started! Play along with the beats.");
        Ok(())
    }

    fn track_tick(&mut self, now: Timestamp, keys: &dyn KeyState) -> Tick {
        let duration = self.config.session.duration;
        let tolerance = self.config.session.tolerance;

        let Some(session) = self.session.as_mut() else {
            return Tick::Idle;
        };
        let Some(timeline) = session.timeline.as_ref() else {
            return Tick::Idle;
        };

        let elapsed = now - session.tracking_started;
        let expired = elapsed > duration;
        // Nothing after the end of the window counts, even if this tick overshot it.
        let cutoff = if expired {
            session.tracking_started + duration
        } else {
            now
        };

        // Beats first, then input, both against the same cutoff.
        let mut beats = 0;
        while let Some(&beat) = timeline.beats().get(session.next_beat) {
            if beat > cutoff {
                break;
            }
            if beat > session.tracking_started {
                self.scoreboard.register_beat();
                beats += 1;
                debug!("BEAT!");
            }
            session.next_beat += 1;
        }

        let judged: Vec<(InputEvent, bool)> = self
            .input
            .poll(now, keys)
            .into_iter()
            .filter(|event| event.timestamp <= cutoff)
            .map(|event| {
                let on_beat = self.scoreboard.register(&event, timeline, tolerance);
                if on_beat {
                    info!("Player {}: CORRECT! Good timing!", event.participant);
                } else {
                    info!("Player {}: WRONG! Off beat!", event.participant);
                }
                (event, on_beat)
            })
            .collect();

        if self.stop_requested || expired {
            return Tick::Finished(self.finish());
        }

        Tick::Tracking {
            remaining: (duration - elapsed).max(0.0),
            beats,
            judged,
        }
    }

    fn cancel(&mut self) -> Tick {
        self.session = None;
        self.stop_requested = false;
        self.player.stop();
        self.input.end();
        info!("Session cancelled before tracking began");
        Tick::Cancelled
    }

    fn finish(&mut self) -> SessionReport {
        let stopped_early = std::mem::take(&mut self.stop_requested);
        let track = match self.session.take() {
            Some(session) => session.track,
            None => self.current.clone(),
        };

        self.player.stop();
        self.input.end();

        if stopped_early {
            info!("Game interrupted.");
        }
        info!("===== Game Over! =====");

        let summaries = self.scoreboard.summaries();
        for s in &summaries {
            info!(
                "Player {}: {}/{} claps on beat ({:.1}%), {} beats missed",
                s.participant, s.on_beat, s.total, s.accuracy, s.missed_beats
            );
        }

        let winner = self.scoreboard.winner();
        let leaders = leaders(&summaries);
        if let Some(w) = &winner {
            if leaders.len() > 1 {
                info!("It's a tie between players {:?} with {} claps on beat!", leaders, w.on_beat);
            } else {
                info!("Winner: Player {} with {} claps on beat!", w.participant, w.on_beat);
            }
        }

        let (next_track, step) = match &winner {
            Some(w) => match select_next_track(&self.catalog, track.bpm, w.on_beat, self.config.session.score_threshold) {
                Ok((next, step)) => (next.clone(), step),
                Err(e) => {
                    error!("Tempo selection failed: {}", e);
                    (track.clone(), TempoStep::Repeat)
                }
            },
            None => (track.clone(), TempoStep::Repeat),
        };
        self.current = next_track.clone();

        SessionReport {
            track,
            summaries,
            total_beats: self.scoreboard.total_beats(),
            winner,
            leaders,
            next_track,
            step,
            stopped_early,
        }
    }

    /// Stop any session and release the audio devices held by the input.
    pub fn shutdown(&mut self) {
        if self.session.take().is_some() {
            self.player.stop();
            self.input.end();
        }
        self.input.shutdown();
    }
}

/// All participants whose on-beat count equals the maximum.
pub fn leaders(summaries: &[ScoreSummary]) -> Vec<ParticipantId> {
    let Some(best) = summaries.iter().map(|s| s.on_beat).max() else {
        return Vec::new();
    };
    summaries
        .iter()
        .filter(|s| s.on_beat == best)
        .map(|s| s.participant)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{EnergySample, OnsetDetector};
    use crate::input::{AcousticInput, InputKind, KeyboardInput, NoKeys};
    use crossbeam_channel::Sender;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Default)]
    struct FakePlayer {
        loaded: Vec<String>,
        playing: bool,
        fail_load: bool,
    }

    impl Playback for FakePlayer {
        fn load(&mut self, track: &Track) -> Result<()> {
            if self.fail_load {
                return Err(GameError::Playback(format!("missing {}", track.name)));
            }
            self.loaded.push(track.name.clone());
            Ok(())
        }

        fn play(&mut self) {
            self.playing = true;
        }

        fn stop(&mut self) {
            self.playing = false;
        }
    }

    struct Held(HashSet<&'static str>);

    impl Held {
        fn none() -> Self {
            Held(HashSet::new())
        }

        fn keys(keys: &[&'static str]) -> Self {
            Held(keys.iter().copied().collect())
        }
    }

    impl KeyState for Held {
        fn is_held(&self, key: &str) -> bool {
            self.0.contains(key)
        }
    }

    fn config(threshold: u32) -> Arc<GameConfig> {
        let mut config = GameConfig::default();
        config.tracks = vec![
            Track::new("sixty", 60.0),
            Track::new("eighty", 80.0),
            Track::new("hundred", 100.0),
            Track::new("one-twenty", 120.0),
        ];
        config.session.duration = 4.0;
        config.session.countdown = 1.0;
        config.session.score_threshold = threshold;
        Arc::new(config)
    }

    fn keyboard_game(threshold: u32) -> GameController<FakePlayer> {
        let config = config(threshold);
        let catalog = config.catalog(crate::config::TempoMode::Slow).unwrap();
        let keyboard = KeyboardInput::new(config.key_bindings(2).unwrap(), config.keyboard.debounce);
        let mut game = GameController::new(config, catalog, InputSource::Keyboard(keyboard), FakePlayer::default());
        game.select_track("eighty").unwrap();
        game
    }

    /// 80 BPM from t=1.0 for 4 s: beats at 1.0, 2.5 and 4.0.
    fn play_scripted(game: &mut GameController<FakePlayer>, presses: &[(f64, &[&'static str])]) -> SessionReport {
        game.start(0.0).unwrap();
        assert!(matches!(game.advance(0.5, &Held::none()), Tick::CountingDown { .. }));
        assert!(matches!(game.advance(1.0, &Held::none()), Tick::Tracking { .. }));
        assert_eq!(game.timeline().unwrap().beats(), &[1.0, 2.5, 4.0]);

        for &(t, keys) in presses {
            game.advance(t, &Held::none());
            let tick = game.advance(t + 0.001, &Held::keys(keys));
            assert!(matches!(tick, Tick::Tracking { .. }));
        }

        match game.advance(5.01, &Held::none()) {
            Tick::Finished(report) => report,
            other => panic!("expected finished session, got {:?}", other),
        }
    }

    #[test]
    fn full_session_scores_and_steps_down() {
        let mut game = keyboard_game(5);
        let report = play_scripted(&mut game, &[(2.5, &["space"]), (3.2, &["space"]), (4.0, &["space"])]);

        let p1 = report.summaries[0];
        assert_eq!((p1.participant, p1.total, p1.on_beat), (1, 3, 2));
        assert_eq!(report.total_beats, 2);
        assert_eq!(p1.missed_beats, 0);
        assert_eq!(report.winner.unwrap().participant, 1);
        assert!(!report.is_tie());
        assert_eq!(report.step, TempoStep::Slower);
        assert_eq!(report.next_track.name, "sixty");
        assert_eq!(game.current_track().name, "sixty");
        assert_eq!(game.phase(), Phase::Idle);
        assert!(!game.player().playing);
    }

    #[test]
    fn high_score_steps_up() {
        let mut game = keyboard_game(1);
        let report = play_scripted(&mut game, &[(2.5, &["space"]), (4.0, &["space"])]);
        assert_eq!(report.step, TempoStep::Faster);
        assert_eq!(report.next_track.name, "hundred");
    }

    #[test]
    fn equal_scores_are_reported_as_tie() {
        let mut game = keyboard_game(5);
        let report = play_scripted(&mut game, &[(2.5, &["space", "up"])]);
        assert_eq!(report.leaders, vec![1, 2]);
        assert!(report.is_tie());
        assert_eq!(report.winner.unwrap().participant, 1);
    }

    #[test]
    fn beats_are_counted_as_they_pass() {
        let mut game = keyboard_game(5);
        game.start(0.0).unwrap();
        game.advance(1.0, &Held::none());

        let mut counted = 0;
        for i in 1..=400 {
            if let Tick::Tracking { beats, .. } = game.advance(1.0 + i as f64 / 100.0, &Held::none()) {
                counted += beats;
            }
        }
        assert_eq!(counted, 2);
        assert_eq!(game.scoreboard().total_beats(), 2);
    }

    #[test]
    fn stop_request_ends_session_once() {
        let mut game = keyboard_game(5);
        game.start(0.0).unwrap();
        game.advance(1.0, &Held::none());
        game.advance(2.5, &Held::keys(&["up"]));

        game.request_stop();
        let report = match game.advance(2.6, &Held::none()) {
            Tick::Finished(report) => report,
            other => panic!("expected finished session, got {:?}", other),
        };
        assert!(report.stopped_early);
        assert_eq!(report.winner.unwrap().participant, 2);
        assert!(matches!(game.advance(2.7, &Held::none()), Tick::Idle));
        assert_eq!(game.phase(), Phase::Idle);
    }

    #[test]
    fn stop_during_countdown_cancels_without_scoring() {
        let mut game = keyboard_game(5);
        game.start(0.0).unwrap();
        game.request_stop();
        assert!(matches!(game.advance(0.2, &Held::none()), Tick::Cancelled));
        assert_eq!(game.phase(), Phase::Idle);
        assert_eq!(game.current_track().name, "eighty");
        assert!(!game.player().playing);
    }

    #[test]
    fn failed_load_keeps_previous_scores() {
        let mut game = keyboard_game(5);
        let first = play_scripted(&mut game, &[(2.5, &["space"])]);
        assert_eq!(first.summaries[0].on_beat, 1);

        game.player.fail_load = true;
        assert!(matches!(game.start(10.0), Err(GameError::Playback(_))));
        assert_eq!(game.phase(), Phase::Idle);
        assert_eq!(game.scoreboard().raw(1).unwrap().on_beat, 1);
    }

    #[test]
    fn cannot_start_twice() {
        let mut game = keyboard_game(5);
        game.start(0.0).unwrap();
        assert!(matches!(game.start(0.1), Err(GameError::InvalidState(_))));
        assert!(game.select_track("sixty").is_err());
    }

    #[test]
    fn scores_reset_when_next_session_tracks() {
        let mut game = keyboard_game(5);
        play_scripted(&mut game, &[(2.5, &["space"])]);

        game.start(10.0).unwrap();
        assert_eq!(game.scoreboard().raw(1).unwrap().total, 1);
        game.advance(11.0, &Held::none());
        assert_eq!(game.scoreboard().raw(1).unwrap().total, 0);
    }

    fn push_clap(sender: &Sender<EnergySample>, at: f64) {
        sender.send(EnergySample { energy: 0.6, timestamp: at }).unwrap();
        sender.send(EnergySample { energy: 0.01, timestamp: at + 0.02 }).unwrap();
    }

    fn acoustic_game() -> (GameController<FakePlayer>, Sender<EnergySample>) {
        let config = config(5);
        let catalog = config.catalog(crate::config::TempoMode::Slow).unwrap();
        let (sender, receiver) = crossbeam_channel::unbounded();
        let acoustic = AcousticInput::from_channel(receiver, OnsetDetector::new(0.1, 0.5, 30), Duration::ZERO);

        let mut game = GameController::new(config, catalog, InputSource::Acoustic(acoustic), FakePlayer::default());
        game.select_track("eighty").unwrap();
        (game, sender)
    }

    #[test]
    fn acoustic_claps_score_for_single_participant() {
        let (mut game, sender) = acoustic_game();
        game.start(0.0).unwrap();
        game.advance(1.0, &NoKeys);

        push_clap(&sender, 2.48);
        let tick = game.advance(2.6, &NoKeys);
        match tick {
            Tick::Tracking { judged, beats, .. } => {
                assert_eq!(beats, 1);
                assert_eq!(judged.len(), 1);
                assert_eq!(judged[0].0.source, InputKind::Acoustic);
                assert!(judged[0].1);
            }
            other => panic!("expected tracking tick, got {:?}", other),
        }

        push_clap(&sender, 3.2);
        game.advance(3.3, &NoKeys);

        let score = game.scoreboard().raw(1).unwrap();
        assert_eq!((score.total, score.on_beat), (2, 1));
        assert_eq!(game.scoreboard().participants().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn claps_during_countdown_are_not_scored() {
        let (mut game, sender) = acoustic_game();
        game.start(0.0).unwrap();

        push_clap(&sender, 0.30);
        assert!(matches!(game.advance(0.5, &NoKeys), Tick::CountingDown { .. }));

        // Still queued when the countdown expires.
        push_clap(&sender, 0.90);
        match game.advance(1.0, &NoKeys) {
            Tick::Tracking { judged, .. } => assert!(judged.is_empty()),
            other => panic!("expected tracking tick, got {:?}", other),
        }
        let score = game.scoreboard().raw(1).unwrap();
        assert_eq!((score.total, score.on_beat), (0, 0));

        push_clap(&sender, 2.48);
        game.advance(2.6, &NoKeys);
        let score = game.scoreboard().raw(1).unwrap();
        assert_eq!((score.total, score.on_beat), (1, 1));
    }

    #[test]
    fn idle_ticks_drain_the_energy_queue() {
        let (mut game, sender) = acoustic_game();
        for i in 0..10 {
            sender.send(EnergySample { energy: 0.01, timestamp: i as f64 * 0.02 }).unwrap();
        }

        assert!(matches!(game.advance(0.5, &NoKeys), Tick::Idle));
        match game.input() {
            InputSource::Acoustic(acoustic) => assert_eq!(acoustic.pending(), 0),
            InputSource::Keyboard(_) => panic!("expected acoustic input"),
        }
    }

    #[test]
    fn final_beat_counts_when_last_tick_overshoots() {
        let mut game = keyboard_game(5);
        game.select_track("sixty").unwrap();
        game.start(0.0).unwrap();
        game.advance(1.0, &Held::none());
        assert_eq!(game.timeline().unwrap().beats(), &[1.0, 3.0, 5.0]);

        game.advance(3.0, &Held::none());
        game.advance(4.99, &Held::none());
        let report = match game.advance(5.01, &Held::keys(&["space"])) {
            Tick::Finished(report) => report,
            other => panic!("expected finished session, got {:?}", other),
        };

        assert_eq!(report.total_beats, 2);
        // The press arrived after the window closed.
        assert_eq!(report.summaries[0].total, 0);
        assert_eq!(report.summaries[0].missed_beats, 2);
    }

    #[test]
    fn queued_claps_inside_window_score_on_final_tick() {
        let (mut game, sender) = acoustic_game();
        game.start(0.0).unwrap();
        game.advance(1.0, &NoKeys);
        game.advance(3.9, &NoKeys);

        push_clap(&sender, 3.98);
        push_clap(&sender, 5.10);
        let report = match game.advance(5.3, &NoKeys) {
            Tick::Finished(report) => report,
            other => panic!("expected finished session, got {:?}", other),
        };

        let player = report.summaries[0];
        assert_eq!((player.total, player.on_beat), (1, 1));
        assert_eq!(report.total_beats, 2);
    }

    #[test]
    fn leaders_lists_every_top_score() {
        let mut board = Scoreboard::new(&[1, 2, 3]);
        let timeline = BeatTimeline::from_beats(vec![1.0]).unwrap();
        for p in [1, 3] {
            board.register(
                &InputEvent { participant: p, timestamp: 1.0, source: InputKind::Keyboard },
                &timeline,
                0.2,
            );
        }
        assert_eq!(leaders(&board.summaries()), vec![1, 3]);
        assert!(leaders(&[]).is_empty());
    }
}
