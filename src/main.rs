use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{error, info};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    event::{ElementState, Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowBuilder},
};

use clapbeat::audio::TrackPlayer;
use clapbeat::game::{Difficulty, GameController, Phase, SessionReport, Tick};
use clapbeat::input::{acoustic, InputSource, KeyState, KeyboardInput};
use clapbeat::{format_clock, Clock, GameConfig, TempoMode};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Players tap their assigned keys
    Keyboard,
    /// Claps are picked up by the microphone
    Acoustic,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Tempo {
    Slow,
    Medium,
}

impl From<Tempo> for TempoMode {
    fn from(tempo: Tempo) -> Self {
        match tempo {
            Tempo::Slow => TempoMode::Slow,
            Tempo::Medium => TempoMode::Medium,
        }
    }
}

#[derive(Parser)]
#[command(name = "clapbeat")]
#[command(about = "Clap along to the beat and see who keeps time best")]
struct Args {
    /// Input mode
    #[arg(short, long, value_enum, default_value = "keyboard")]
    mode: Mode,

    /// Number of keyboard players (2-4)
    #[arg(short, long, default_value = "2")]
    players: u8,

    /// Which part of the track list to play from
    #[arg(long, value_enum, default_value = "slow")]
    tempo: Tempo,

    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Start with this track instead of the first one
    #[arg(long)]
    track: Option<String>,
}

/// Keys currently held down in the game window.
#[derive(Default)]
struct HeldKeys {
    held: HashSet<&'static str>,
}

impl HeldKeys {
    fn update(&mut self, code: KeyCode, state: ElementState) {
        let Some(name) = key_name(code) else {
            return;
        };
        match state {
            ElementState::Pressed => {
                self.held.insert(name);
            }
            ElementState::Released => {
                self.held.remove(name);
            }
        }
    }
}

impl KeyState for HeldKeys {
    fn is_held(&self, key: &str) -> bool {
        self.held.contains(key)
    }
}

fn key_name(code: KeyCode) -> Option<&'static str> {
    let name = match code {
        KeyCode::Space => "space",
        KeyCode::ArrowUp => "up",
        KeyCode::ArrowDown => "down",
        KeyCode::ArrowLeft => "left",
        KeyCode::ArrowRight => "right",
        KeyCode::KeyA => "a",
        KeyCode::KeyS => "s",
        KeyCode::KeyD => "d",
        KeyCode::KeyF => "f",
        KeyCode::KeyJ => "j",
        KeyCode::KeyK => "k",
        KeyCode::KeyL => "l",
        _ => return None,
    };
    Some(name)
}

fn load_config(path: Option<&str>) -> Result<GameConfig> {
    let config = match path {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn open_input(args: &Args, config: &GameConfig, clock: Clock) -> Result<InputSource> {
    let source = match args.mode {
        Mode::Keyboard => {
            let bindings = config.key_bindings(args.players)?;
            for (player, key) in &bindings {
                info!("Player {}: press '{}'", player, key);
            }
            InputSource::Keyboard(KeyboardInput::new(bindings, config.keyboard.debounce))
        }
        Mode::Acoustic => InputSource::Acoustic(acoustic::open_calibrated(&config.audio, clock)?),
    };
    Ok(source)
}

fn show_tick(window: &Window, tick: &Tick, game: &GameController<TrackPlayer>) {
    let track = game.current_track();
    let title = match tick {
        Tick::CountingDown { remaining } => format!("Get ready... {}", remaining.ceil() as u32),
        Tick::Tracking { remaining, .. } => format!(
            "{} ({} BPM) - {} left",
            track.name,
            track.bpm,
            format_clock(*remaining)
        ),
        Tick::Finished(report) => {
            announce(report);
            format!("Next: {} ({} BPM) - press Enter", track.name, track.bpm)
        }
        Tick::Cancelled => format!("Next: {} ({} BPM) - press Enter", track.name, track.bpm),
        Tick::Idle => return,
    };
    window.set_title(&title);
}

fn announce(report: &SessionReport) {
    info!(
        "Finished {} with {} beats. Next up: {} at {} BPM ({}, {:?})",
        report.track.name,
        report.total_beats,
        report.next_track.name,
        report.next_track.bpm,
        Difficulty::for_bpm(report.next_track.bpm),
        report.step
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("Starting clapbeat");

    let clock = Clock::new();
    let config = Arc::new(load_config(args.config.as_deref())?);
    let catalog = config.catalog(args.tempo.into())?;
    let input = open_input(&args, &config, clock)?;
    info!("Input mode: {:?}", input.kind());
    let player = TrackPlayer::new(&config.music_dir)?;

    let mut game = GameController::new(Arc::clone(&config), catalog, input, player);
    if let Some(name) = &args.track {
        game.select_track(name)?;
    }

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("clapbeat - press Enter to start")
        .with_inner_size(winit::dpi::LogicalSize::new(640, 200))
        .build(&event_loop)?;

    let tick_period = Duration::from_secs_f64(1.0 / config.session.tick_rate);
    let mut held = HeldKeys::default();
    let mut next_tick = Instant::now();

    info!("Press Enter to start a session, Escape to stop it or to quit.");

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                game.shutdown();
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match (code, event.state) {
                    (KeyCode::Enter, ElementState::Pressed) if !event.repeat => {
                        if game.phase() == Phase::Idle {
                            if let Err(e) = game.start(clock.now()) {
                                error!("Could not start session: {}", e);
                            }
                        }
                    }
                    (KeyCode::Escape, ElementState::Pressed) => {
                        if game.phase() == Phase::Idle {
                            info!("Escape pressed");
                            game.shutdown();
                            elwt.exit();
                        } else {
                            game.request_stop();
                        }
                    }
                    (code, state) => held.update(code, state),
                }
            }
            WindowEvent::Focused(false) => held.held.clear(),
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if now >= next_tick {
                let tick = game.advance(clock.now(), &held);
                show_tick(&window, &tick, &game);
                next_tick = now + tick_period;
            }
            elwt.set_control_flow(ControlFlow::WaitUntil(next_tick));
        }
        _ => {}
    })?;

    Ok(())
}
