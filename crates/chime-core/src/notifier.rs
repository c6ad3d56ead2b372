//! Alarm output: looping sound, vibration and system notification.
//!
//! Only one sound plays at a time. Sound stays locked until
//! [`Notifier::unlock_audio`] records a confirmed user gesture; while locked
//! every play attempt fails with [`ChimeError::Playback`] and an alarm
//! falls back to vibration and the visual banner.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::{ChimeError, Result};
use crate::events::{AlarmEvent, EventSender};
use crate::sound::{SoundCatalog, SoundId};
use crate::task::Task;

pub const NOTIFICATION_TITLE: &str = "Task Reminder";
pub const NOTIFICATION_BODY: &str = "It's time! You set an alarm for this time.";

/// Vibration pattern (on/off milliseconds) for a ringing alarm.
pub const ALARM_VIBRATION: &[u64] = &[200, 100, 200, 100, 200];
/// Longer pattern used when sound could not be started.
pub const FALLBACK_VIBRATION: &[u64] = &[500, 100, 500, 100, 500];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Repeat until stopped; used for alarms.
    Loop,
    /// Play once; used for previews.
    Once,
}

pub trait SoundPlayer {
    /// Starts `asset`. Any previous playback has already been stopped.
    fn play(&mut self, sound: SoundId, asset: &Path, mode: PlayMode) -> Result<()>;

    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Platform side channel for notifications and haptics. Everything here is
/// best-effort.
pub trait DesktopAlerts {
    fn request_permission(&mut self) -> Permission;

    fn show(&mut self, title: &str, body: &str) -> anyhow::Result<()>;

    /// Returns whether the device accepted the vibration request.
    fn vibrate(&mut self, pattern: &[u64]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NowPlaying {
    pub sound: SoundId,
    pub mode: PlayMode,
    generation: u64,
}

/// What an alarm delivery managed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub banner: String,
    pub sound: SoundId,
    pub sound_playing: bool,
    pub playback_error: Option<String>,
    pub vibrated: bool,
    pub notified: bool,
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub catalog: SoundCatalog,
    pub preview_for: Duration,
    pub notifications: bool,
}

pub struct Notifier {
    player: Box<dyn SoundPlayer>,
    desktop: Box<dyn DesktopAlerts>,
    settings: NotifierSettings,
    events: EventSender,
    audio_unlocked: bool,
    now_playing: Option<NowPlaying>,
    generation: u64,
}

impl Notifier {
    pub fn new(
        player: Box<dyn SoundPlayer>,
        desktop: Box<dyn DesktopAlerts>,
        settings: NotifierSettings,
        events: EventSender,
    ) -> Self {
        Self {
            player,
            desktop,
            settings,
            events,
            audio_unlocked: false,
            now_playing: None,
            generation: 0,
        }
    }

    /// Records the user gesture that permits sound output.
    pub fn unlock_audio(&mut self) {
        if !self.audio_unlocked {
            info!("audio unlocked");
            self.audio_unlocked = true;
        }
    }

    pub fn audio_unlocked(&self) -> bool {
        self.audio_unlocked
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing
    }

    #[instrument(skip(self))]
    pub fn play(&mut self, sound: SoundId, mode: PlayMode) -> Result<()> {
        self.stop();
        if !self.audio_unlocked {
            return Err(ChimeError::Playback(
                "sound is locked until audio is enabled".to_string(),
            ));
        }

        let asset = self.settings.catalog.asset_path(sound);
        self.player.play(sound, &asset, mode)?;
        self.generation += 1;
        self.now_playing = Some(NowPlaying {
            sound,
            mode,
            generation: self.generation,
        });
        debug!(asset = %asset.display(), "sound started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(playing) = self.now_playing.take() {
            debug!(sound = %playing.sound, "sound stopped");
            self.player.stop();
        }
    }

    /// Plays `sound` once and cuts it off after the preview duration,
    /// however long the clip is.
    #[instrument(skip(self))]
    pub fn preview(&mut self, sound: SoundId) -> Result<()> {
        self.play(sound, PlayMode::Once)?;

        let generation = self.generation;
        let events = self.events.clone();
        let preview_for = self.settings.preview_for;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(preview_for).await;
                    let _ = events.send(AlarmEvent::PreviewElapsed { generation });
                });
            }
            Err(_) => warn!("no async runtime available; preview will not auto-stop"),
        }
        Ok(())
    }

    /// Stops the preview started as `generation`, unless something else has
    /// started playing since.
    pub fn preview_elapsed(&mut self, generation: u64) -> bool {
        match self.now_playing {
            Some(playing) if playing.generation == generation && playing.mode == PlayMode::Once => {
                self.stop();
                true
            }
            _ => false,
        }
    }

    /// Sounds the alarm for `task` on every available channel.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn ring(&mut self, task: &Task) -> DeliveryReport {
        let sound = task.sound_or_default();
        let banner = format!("⏰ ALARM: {}", task.text);

        let mut vibrated = self.desktop.vibrate(ALARM_VIBRATION);
        let playback_error = match self.play(sound, PlayMode::Loop) {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "alarm sound unavailable; falling back to vibration");
                vibrated = self.desktop.vibrate(FALLBACK_VIBRATION) || vibrated;
                Some(err.to_string())
            }
        };

        let notified = self.notify();

        DeliveryReport {
            banner,
            sound,
            sound_playing: playback_error.is_none(),
            playback_error,
            vibrated,
            notified,
        }
    }

    fn notify(&mut self) -> bool {
        if !self.settings.notifications {
            return false;
        }
        if self.desktop.request_permission() != Permission::Granted {
            debug!("notification permission denied; banner only");
            return false;
        }
        match self.desktop.show(NOTIFICATION_TITLE, NOTIFICATION_BODY) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "system notification failed");
                false
            }
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.stop();
    }
}
