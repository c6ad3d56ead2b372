//! Recording fakes for the sound and notification side channels.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::error::{ChimeError, Result};
use crate::notifier::{DesktopAlerts, Permission, PlayMode, SoundPlayer};
use crate::sound::SoundId;

#[derive(Debug, Default)]
pub struct OutputLog {
    pub playing: Option<(SoundId, PlayMode)>,
    pub plays: Vec<(SoundId, PlayMode)>,
    pub stops: usize,
    pub vibrations: Vec<Vec<u64>>,
    pub notifications: Vec<(String, String)>,
}

pub type SharedLog = Rc<RefCell<OutputLog>>;

pub struct RecordingPlayer {
    pub log: SharedLog,
    pub fail: bool,
}

impl SoundPlayer for RecordingPlayer {
    fn play(&mut self, sound: SoundId, _asset: &Path, mode: PlayMode) -> Result<()> {
        if self.fail {
            return Err(ChimeError::Playback("device busy".to_string()));
        }
        let mut log = self.log.borrow_mut();
        log.playing = Some((sound, mode));
        log.plays.push((sound, mode));
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.log.borrow_mut();
        log.playing = None;
        log.stops += 1;
    }
}

pub struct RecordingAlerts {
    pub log: SharedLog,
    pub permission: Permission,
    pub can_vibrate: bool,
}

impl DesktopAlerts for RecordingAlerts {
    fn request_permission(&mut self) -> Permission {
        self.permission
    }

    fn show(&mut self, title: &str, body: &str) -> anyhow::Result<()> {
        self.log
            .borrow_mut()
            .notifications
            .push((title.to_string(), body.to_string()));
        Ok(())
    }

    fn vibrate(&mut self, pattern: &[u64]) -> bool {
        if self.can_vibrate {
            self.log.borrow_mut().vibrations.push(pattern.to_vec());
        }
        self.can_vibrate
    }
}

pub fn recording_pair(
    permission: Permission,
) -> (SharedLog, Box<RecordingPlayer>, Box<RecordingAlerts>) {
    let log = SharedLog::default();
    let player = Box::new(RecordingPlayer {
        log: log.clone(),
        fail: false,
    });
    let alerts = Box::new(RecordingAlerts {
        log: log.clone(),
        permission,
        can_vibrate: true,
    });
    (log, player, alerts)
}
