use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};

use crate::config::Track;
use crate::error::{GameError, Result};

/// Plays the reference track. The session calls these at phase boundaries.
pub trait Playback {
    /// Prepare `track` for playback without starting it.
    fn load(&mut self, track: &Track) -> Result<()>;

    fn play(&mut self);

    fn stop(&mut self);
}

/// rodio-backed track player. Tracks are looked up as mp3 files by name.
pub struct TrackPlayer {
    #[allow(dead_code)]
    stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Sink>,
    music_dir: PathBuf,
    current: Option<String>,
}

impl TrackPlayer {
    pub fn new<P: AsRef<Path>>(music_dir: P) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| GameError::Device(format!("No audio output available: {}", e)))?;

        Ok(Self {
            stream,
            stream_handle,
            sink: None,
            music_dir: music_dir.as_ref().to_path_buf(),
            current: None,
        })
    }

    fn open_first(&self, track: &Track) -> Result<(PathBuf, Decoder<BufReader<File>>)> {
        for path in candidate_paths(&self.music_dir, &track.name) {
            debug!("Trying to load song from: {:?}", path);
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(_) => continue,
            };
            match Decoder::new(BufReader::new(file)) {
                Ok(decoder) => return Ok((path, decoder)),
                Err(e) => warn!("Failed to decode {:?}: {}", path, e),
            }
        }

        Err(GameError::Playback(format!(
            "could not find a playable file for '{}' in {:?}",
            track.name, self.music_dir
        )))
    }
}

impl Playback for TrackPlayer {
    fn load(&mut self, track: &Track) -> Result<()> {
        let (path, source) = self.open_first(track)?;

        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| GameError::Device(format!("Failed to open output sink: {}", e)))?;
        sink.append(source);
        sink.pause();

        if let Some(previous) = self.sink.replace(sink) {
            previous.stop();
        }
        self.current = Some(track.name.clone());
        info!("Loaded song: {} ({} BPM) from {:?}", track.name, track.bpm, path);
        Ok(())
    }

    fn play(&mut self) {
        match (&self.sink, &self.current) {
            (Some(sink), Some(name)) => {
                sink.play();
                info!("Now playing: {}", name);
            }
            _ => warn!("No song loaded."),
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            info!("Playback stopped.");
        }
    }
}

/// Files tried for `name`, in order: spaces stripped then verbatim, first
/// under `music_dir` and then in the working directory.
pub fn candidate_paths(music_dir: &Path, name: &str) -> Vec<PathBuf> {
    let compact = format!("{}.mp3", name.replace(' ', ""));
    let verbatim = format!("{}.mp3", name);

    vec![
        music_dir.join(&compact),
        music_dir.join(&verbatim),
        PathBuf::from(compact),
        PathBuf::from(verbatim),
    ]
}
