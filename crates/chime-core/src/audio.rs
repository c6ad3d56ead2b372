//! rodio-backed sound output.
//!
//! The output stream is not `Send`, so it lives on a dedicated thread that
//! receives play/stop commands and acknowledges each play.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use rodio::{Decoder, OutputStream, Sink};
use tracing::{debug, warn};

use crate::error::{ChimeError, Result};
use crate::notifier::{PlayMode, SoundPlayer};
use crate::sound::SoundId;

enum Command {
    Play { path: PathBuf, looping: bool },
    Stop,
}

pub struct RodioPlayer {
    commands: mpsc::Sender<Command>,
    acks: mpsc::Receiver<std::result::Result<(), String>>,
}

impl RodioPlayer {
    pub fn spawn(volume: f32) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::channel();
        thread::spawn(move || output_thread(cmd_rx, ack_tx, volume));
        Self {
            commands: cmd_tx,
            acks: ack_rx,
        }
    }
}

impl SoundPlayer for RodioPlayer {
    fn play(&mut self, sound: SoundId, asset: &Path, mode: PlayMode) -> Result<()> {
        self.commands
            .send(Command::Play {
                path: asset.to_path_buf(),
                looping: mode == PlayMode::Loop,
            })
            .map_err(|_| ChimeError::Playback("audio thread is gone".to_string()))?;
        match self.acks.recv() {
            Ok(Ok(())) => {
                debug!(%sound, "rodio playback started");
                Ok(())
            }
            Ok(Err(msg)) => Err(ChimeError::Playback(msg)),
            Err(_) => Err(ChimeError::Playback("audio thread is gone".to_string())),
        }
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Stop);
    }
}

fn output_thread(
    commands: mpsc::Receiver<Command>,
    acks: mpsc::Sender<std::result::Result<(), String>>,
    volume: f32,
) {
    let stream = OutputStream::try_default();
    if let Err(err) = &stream {
        warn!(error = %err, "no audio output device");
    }
    let mut sink: Option<Sink> = None;

    while let Ok(command) = commands.recv() {
        match command {
            Command::Stop => {
                if let Some(current) = sink.take() {
                    current.stop();
                }
            }
            Command::Play { path, looping } => {
                if let Some(current) = sink.take() {
                    current.stop();
                }
                let result = match &stream {
                    Ok((_stream, handle)) => start(handle, &path, looping, volume).map(|s| {
                        sink = Some(s);
                    }),
                    Err(err) => Err(format!("no audio output device: {err}")),
                };
                if acks.send(result).is_err() {
                    return;
                }
            }
        }
    }
}

fn start(
    handle: &rodio::OutputStreamHandle,
    path: &Path,
    looping: bool,
    volume: f32,
) -> std::result::Result<Sink, String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let sink = Sink::try_new(handle).map_err(|e| e.to_string())?;
    sink.set_volume(volume);
    if looping {
        let source = Decoder::new_looped(BufReader::new(file)).map_err(|e| e.to_string())?;
        sink.append(source);
    } else {
        let source = Decoder::new(BufReader::new(file)).map_err(|e| e.to_string())?;
        sink.append(source);
    }
    Ok(sink)
}
