//! Terminal stand-ins for the platform notification side channel.

use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ChimeError, Result};
use crate::notifier::{DesktopAlerts, Permission, PlayMode, SoundPlayer};
use crate::sound::SoundId;

/// Gap between bells while an alarm loops.
pub const BELL_REPEAT: Duration = Duration::from_secs(1);

/// Rings the terminal bell instead of decoding the asset. A looping alarm
/// re-rings every [`BELL_REPEAT`] until stopped.
#[derive(Debug, Default)]
pub struct BellPlayer {
    playing: Option<SoundId>,
    repeat: Option<JoinHandle<()>>,
    rings: Arc<AtomicU64>,
}

impl BellPlayer {
    /// Bells rung so far.
    pub fn rings(&self) -> u64 {
        self.rings.load(Ordering::Relaxed)
    }

    fn cancel_repeat(&mut self) {
        if let Some(handle) = self.repeat.take() {
            handle.abort();
        }
    }
}

fn ring_bell(rings: &AtomicU64) -> io::Result<()> {
    let mut err = io::stderr().lock();
    err.write_all(b"\x07")?;
    err.flush()?;
    rings.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

impl SoundPlayer for BellPlayer {
    fn play(&mut self, sound: SoundId, asset: &Path, mode: PlayMode) -> Result<()> {
        self.cancel_repeat();
        ring_bell(&self.rings).map_err(|e| ChimeError::Playback(e.to_string()))?;
        info!(%sound, asset = %asset.display(), ?mode, "ringing terminal bell");

        if mode == PlayMode::Loop {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let rings = self.rings.clone();
                    self.repeat = Some(runtime.spawn(async move {
                        let start = tokio::time::Instant::now() + BELL_REPEAT;
                        let mut ticks = tokio::time::interval_at(start, BELL_REPEAT);
                        loop {
                            ticks.tick().await;
                            if let Err(err) = ring_bell(&rings) {
                                warn!(error = %err, "terminal bell failed; stopping loop");
                                break;
                            }
                        }
                    }));
                }
                Err(_) => warn!("no async runtime available; bell will not repeat"),
            }
        }

        self.playing = Some(sound);
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel_repeat();
        if let Some(sound) = self.playing.take() {
            debug!(%sound, "bell stopped");
        }
    }
}

impl Drop for BellPlayer {
    fn drop(&mut self) {
        self.cancel_repeat();
    }
}

/// Prints notifications on stderr. Permission is only granted when stderr
/// is attached to a terminal; vibration is never available.
#[derive(Debug, Default)]
pub struct TerminalAlerts;

impl DesktopAlerts for TerminalAlerts {
    fn request_permission(&mut self) -> Permission {
        if io::stderr().is_terminal() {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    fn show(&mut self, title: &str, body: &str) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "\x1b[1m{title}\x1b[0m: {body}")?;
        err.flush()?;
        Ok(())
    }

    fn vibrate(&mut self, pattern: &[u64]) -> bool {
        debug!(?pattern, "vibration not supported on this device");
        false
    }
}
