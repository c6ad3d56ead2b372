//! Owned application state: store, scheduler, ringing slot and notifier,
//! driven from one event loop.
//!
//! Every operation that changes or removes a task's alarm cancels the armed
//! timer first and re-arms afterwards, so there is never more than one timer
//! per task.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::{Config, resolve_sound_dir};
use crate::delivery::AlarmDelivery;
use crate::error::{ChimeError, Result};
use crate::events::{AlarmEvent, EventReceiver, event_channel};
use crate::notifier::{DeliveryReport, DesktopAlerts, Notifier, NotifierSettings, SoundPlayer};
use crate::scheduler::AlarmScheduler;
use crate::sound::{SoundCatalog, SoundId};
use crate::store::TaskStore;
use crate::task::{Task, TaskId, TaskPatch};

pub const DEFAULT_SNOOZE_MINUTES: i64 = 5;
/// Longest accepted snooze, one week.
pub const MAX_SNOOZE_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub default_sound: SoundId,
    pub snooze_minutes: i64,
    pub notifier: NotifierSettings,
}

impl AppSettings {
    pub fn with_sound_dir(sound_dir: &Path) -> Self {
        Self {
            default_sound: SoundId::default(),
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            notifier: NotifierSettings {
                catalog: SoundCatalog::new(sound_dir),
                preview_for: Duration::from_secs(2),
                notifications: true,
            },
        }
    }

    pub fn from_config(cfg: &Config, data_dir: &Path) -> anyhow::Result<Self> {
        let mut settings = Self::with_sound_dir(&resolve_sound_dir(cfg, data_dir));
        if let Some(raw) = cfg.get("sound.default") {
            settings.default_sound = raw.parse().context("invalid sound.default")?;
        }
        if let Some(minutes) = cfg.get_parsed::<i64>("snooze.minutes")?
            && minutes > 0
        {
            if minutes > MAX_SNOOZE_MINUTES {
                anyhow::bail!(
                    "invalid value for snooze.minutes: {minutes} (at most {MAX_SNOOZE_MINUTES})"
                );
            }
            settings.snooze_minutes = minutes;
        }
        if let Some(secs) = cfg.get_parsed::<f64>("preview.seconds")?
            && secs > 0.0
        {
            settings.notifier.preview_for = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid value for preview.seconds: {secs}"))?;
        }
        if let Some(enabled) = cfg.get_bool("notifications") {
            settings.notifier.notifications = enabled;
        }
        Ok(settings)
    }
}

/// Input for [`AlarmApp::add_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub text: String,
    pub alarm_at: Option<DateTime<Utc>>,
    pub sound_id: Option<SoundId>,
}

pub struct AlarmApp {
    store: TaskStore,
    scheduler: AlarmScheduler,
    delivery: AlarmDelivery,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    events: EventReceiver,
    settings: AppSettings,
}

impl AlarmApp {
    pub fn new(
        store: TaskStore,
        player: Box<dyn SoundPlayer>,
        desktop: Box<dyn DesktopAlerts>,
        clock: Arc<dyn Clock>,
        settings: AppSettings,
    ) -> Self {
        let (tx, rx) = event_channel();
        let notifier = Notifier::new(player, desktop, settings.notifier.clone(), tx.clone());
        Self {
            store,
            scheduler: AlarmScheduler::new(tx, clock.clone()),
            delivery: AlarmDelivery::new(),
            notifier,
            clock,
            events: rx,
            settings,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn scheduler(&self) -> &AlarmScheduler {
        &self.scheduler
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn active_alarm(&self) -> Option<&Task> {
        self.delivery.active()
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        self.store.take_warnings()
    }

    pub fn unlock_audio(&mut self) {
        self.notifier.unlock_audio();
    }

    /// Arms every loaded task whose alarm is still ahead.
    #[instrument(skip(self))]
    pub fn restore_alarms(&mut self) -> usize {
        let armed = self
            .store
            .iter()
            .filter(|task| self.scheduler.schedule(task))
            .count();
        info!(armed, "restored alarms");
        armed
    }

    #[instrument(skip(self, new), fields(text = %new.text))]
    pub fn add_task(&mut self, new: NewTask) -> Result<TaskId> {
        let now = self.now();
        if let Some(at) = new.alarm_at {
            crate::datetime::require_future(at, now)?;
        }

        let id = self.store.next_id(now);
        let sound_id = new
            .sound_id
            .or_else(|| new.alarm_at.map(|_| self.settings.default_sound));
        let task = Task::new(id, new.text, now).with_alarm(new.alarm_at, sound_id);
        let task = self.store.add(task)?.clone();
        self.scheduler.schedule(&task);
        Ok(id)
    }

    /// Applies `patch`. A new alarm time must lie in the future; the old
    /// timer is cancelled before the store changes and the task is re-armed
    /// afterwards. Setting an alarm on a task without a sound picks the
    /// configured default sound.
    #[instrument(skip(self, patch))]
    pub fn edit_task(&mut self, id: TaskId, mut patch: TaskPatch) -> Result<&Task> {
        let Some(current) = self.store.get(id) else {
            return Err(ChimeError::validation(format!("no task with id {id}")));
        };
        if let Some(Some(at)) = patch.alarm_at {
            crate::datetime::require_future(at, self.now())?;
            let sound_after = patch.sound_id.unwrap_or(current.sound_id);
            if sound_after.is_none() {
                patch.sound_id = Some(Some(self.settings.default_sound));
            }
        }
        if let Some(text) = &patch.text
            && text.trim().is_empty()
        {
            return Err(ChimeError::validation("Task text cannot be empty!"));
        }

        self.scheduler.cancel(id);
        self.delivery.clear_if(id, &mut self.notifier);
        let task = self.store.update(id, &patch)?.clone();
        self.scheduler.schedule(&task);
        self.store.get(id).ok_or_else(|| ChimeError::validation(format!("no task with id {id}")))
    }

    /// Flips completion. Completing disarms; reopening re-arms if the alarm
    /// is still ahead.
    #[instrument(skip(self))]
    pub fn toggle_task(&mut self, id: TaskId) -> Result<bool> {
        if self.store.get(id).is_none() {
            return Err(ChimeError::validation(format!("no task with id {id}")));
        }
        self.scheduler.cancel(id);
        self.delivery.clear_if(id, &mut self.notifier);
        let completed = self.store.toggle(id)?;
        if let Some(task) = self.store.get(id) {
            self.scheduler.schedule(task);
        }
        Ok(completed)
    }

    #[instrument(skip(self))]
    pub fn delete_task(&mut self, id: TaskId) -> Option<Task> {
        self.scheduler.cancel(id);
        self.delivery.clear_if(id, &mut self.notifier);
        self.store.remove(id)
    }

    /// Re-arms the ringing alarm `minutes` from now (the configured default
    /// when absent or not positive). Returns the new alarm time, or `None`
    /// when nothing is ringing. Snoozes longer than [`MAX_SNOOZE_MINUTES`]
    /// are rejected and leave the alarm ringing.
    #[instrument(skip(self))]
    pub fn snooze(&mut self, minutes: Option<i64>) -> Result<Option<DateTime<Utc>>> {
        let Some(active_id) = self.delivery.active().map(|t| t.id) else {
            return Ok(None);
        };
        let minutes = minutes
            .filter(|m| *m > 0)
            .unwrap_or(self.settings.snooze_minutes);
        let alarm_at = chrono::Duration::try_minutes(minutes)
            .filter(|_| minutes <= MAX_SNOOZE_MINUTES)
            .and_then(|delay| self.now().checked_add_signed(delay))
            .ok_or_else(|| {
                ChimeError::validation(format!(
                    "Snooze must be between 1 and {MAX_SNOOZE_MINUTES} minutes."
                ))
            })?;

        match self.store.update(active_id, &TaskPatch::alarm(Some(alarm_at))) {
            Ok(task) => {
                let task = task.clone();
                self.scheduler.schedule(&task);
            }
            Err(err) => warn!(error = %err, "snoozed task disappeared"),
        }
        self.delivery.clear(&mut self.notifier);
        info!(task_id = %active_id, minutes, %alarm_at, "alarm snoozed");
        Ok(Some(alarm_at))
    }

    /// Silences the ringing alarm without touching its alarm time.
    #[instrument(skip(self))]
    pub fn dismiss(&mut self) -> Option<Task> {
        self.delivery.clear(&mut self.notifier)
    }

    pub fn test_sound(&mut self, sound: SoundId) -> Result<()> {
        self.notifier.preview(sound)
    }

    pub fn stop_sound(&mut self) {
        self.notifier.stop();
    }

    pub async fn recv_event(&mut self) -> Option<AlarmEvent> {
        self.events.recv().await
    }

    /// Processes one timer event. Returns the delivery report when an alarm
    /// actually rang.
    #[instrument(skip(self))]
    pub fn handle_event(&mut self, event: AlarmEvent) -> Option<DeliveryReport> {
        match event {
            AlarmEvent::Fired {
                task_id,
                generation,
            } => {
                if !self.scheduler.acknowledge(task_id, generation) {
                    return None;
                }
                let task = match self.store.get(task_id) {
                    Some(task) if !task.completed => task.clone(),
                    _ => {
                        debug!(%task_id, "task gone or completed; dropping alarm");
                        return None;
                    }
                };
                Some(self.delivery.deliver(task, &mut self.notifier))
            }
            AlarmEvent::PreviewElapsed { generation } => {
                self.notifier.preview_elapsed(generation);
                None
            }
        }
    }

    /// Waits for the next alarm that actually rings.
    pub async fn next_delivery(&mut self) -> Option<DeliveryReport> {
        loop {
            let event = self.recv_event().await?;
            if let Some(report) = self.handle_event(event) {
                return Some(report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::TokioClock;
    use crate::datastore::MemoryKvStore;
    use crate::notifier::{FALLBACK_VIBRATION, Permission, PlayMode};
    use crate::testing::{SharedLog, recording_pair};

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid origin")
    }

    fn app_with(store: TaskStore, permission: Permission) -> (AlarmApp, SharedLog) {
        let (log, player, alerts) = recording_pair(permission);
        let app = AlarmApp::new(
            store,
            player,
            alerts,
            Arc::new(TokioClock::starting_at(origin())),
            AppSettings::with_sound_dir(Path::new("/sounds")),
        );
        (app, log)
    }

    fn app() -> (AlarmApp, SharedLog) {
        app_with(TaskStore::new(Box::new(MemoryKvStore::new())), Permission::Granted)
    }

    fn in_secs(secs: i64) -> Option<DateTime<Utc>> {
        Some(origin() + chrono::Duration::seconds(secs))
    }

    async fn no_delivery_within(app: &mut AlarmApp, secs: u64) -> bool {
        tokio::time::timeout(Duration::from_secs(secs), app.next_delivery())
            .await
            .is_err()
    }

    #[tokio::test(start_paused = true)]
    async fn buy_milk_rings_then_snoozes() {
        let (mut app, log) = app();
        app.unlock_audio();
        let started = tokio::time::Instant::now();

        let id = app
            .add_task(NewTask {
                text: "Buy milk".into(),
                alarm_at: in_secs(1),
                sound_id: Some(SoundId::Sound1),
            })
            .expect("add");

        let report = app.next_delivery().await.expect("delivery");
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(report.banner, "⏰ ALARM: Buy milk");
        assert!(report.sound_playing);
        assert!(report.notified);
        assert_eq!(app.active_alarm().map(|t| t.id), Some(id));
        assert_eq!(log.borrow().playing, Some((SoundId::Sound1, PlayMode::Loop)));

        let snoozed_to = app
            .snooze(Some(5))
            .expect("snooze")
            .expect("was ringing");
        assert_eq!(snoozed_to, origin() + chrono::Duration::seconds(1) + chrono::Duration::minutes(5));
        assert!(app.active_alarm().is_none());
        assert_eq!(log.borrow().playing, None);
        assert_eq!(app.store().get(id).and_then(|t| t.alarm_at), Some(snoozed_to));
        assert_eq!(app.scheduler().armed_at(id), Some(snoozed_to));

        let report = app.next_delivery().await.expect("second delivery");
        assert_eq!(started.elapsed(), Duration::from_secs(1 + 300));
        assert_eq!(report.sound, SoundId::Sound1);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_pending_task_prevents_delivery() {
        let (mut app, _log) = app();
        let id = app
            .add_task(NewTask {
                text: "call plumber".into(),
                alarm_at: in_secs(3),
                sound_id: None,
            })
            .expect("add");

        assert!(app.delete_task(id).is_some());
        assert!(!app.scheduler().is_armed(id));
        assert!(no_delivery_within(&mut app, 60).await);
    }

    #[tokio::test(start_paused = true)]
    async fn completing_task_prevents_delivery_and_reopening_rearms() {
        let (mut app, _log) = app();
        let id = app
            .add_task(NewTask {
                text: "stand up".into(),
                alarm_at: in_secs(10),
                sound_id: None,
            })
            .expect("add");

        assert!(app.toggle_task(id).expect("complete"));
        assert!(!app.scheduler().is_armed(id));
        assert!(no_delivery_within(&mut app, 5).await);

        assert!(!app.toggle_task(id).expect("reopen"));
        assert!(app.scheduler().is_armed(id));
        let report = app.next_delivery().await.expect("delivery");
        assert_eq!(report.banner, "⏰ ALARM: stand up");
    }

    #[tokio::test(start_paused = true)]
    async fn editing_alarm_replaces_timer() {
        let (mut app, _log) = app();
        let started = tokio::time::Instant::now();
        let id = app
            .add_task(NewTask {
                text: "tea".into(),
                alarm_at: in_secs(10),
                sound_id: None,
            })
            .expect("add");

        app.edit_task(id, TaskPatch::alarm(in_secs(2))).expect("edit");
        assert_eq!(app.scheduler().armed_count(), 1);

        app.next_delivery().await.expect("delivery");
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        app.dismiss();
        assert!(no_delivery_within(&mut app, 30).await);
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_added_by_edit_uses_configured_default_sound() {
        let (log, player, alerts) = recording_pair(Permission::Granted);
        let mut settings = AppSettings::with_sound_dir(Path::new("/sounds"));
        settings.default_sound = SoundId::Sound4;
        let mut app = AlarmApp::new(
            TaskStore::new(Box::new(MemoryKvStore::new())),
            player,
            alerts,
            Arc::new(TokioClock::starting_at(origin())),
            settings,
        );
        app.unlock_audio();

        let id = app
            .add_task(NewTask {
                text: "water plants".into(),
                ..NewTask::default()
            })
            .expect("add");
        assert_eq!(app.store().get(id).and_then(|t| t.sound_id), None);

        let task = app.edit_task(id, TaskPatch::alarm(in_secs(1))).expect("edit");
        assert_eq!(task.sound_id, Some(SoundId::Sound4));

        let report = app.next_delivery().await.expect("delivery");
        assert_eq!(report.sound, SoundId::Sound4);
        assert_eq!(log.borrow().playing, Some((SoundId::Sound4, PlayMode::Loop)));
    }

    #[tokio::test(start_paused = true)]
    async fn snooze_beyond_limit_is_rejected_and_keeps_ringing() {
        let (mut app, log) = app();
        app.unlock_audio();
        let id = app
            .add_task(NewTask {
                text: "Buy milk".into(),
                alarm_at: in_secs(1),
                sound_id: None,
            })
            .expect("add");
        app.next_delivery().await.expect("delivery");

        let err = app.snooze(Some(1_000_000_000_000)).expect_err("too long");
        assert!(err.is_validation());
        let err = app.snooze(Some(i64::MAX)).expect_err("overflow");
        assert!(err.is_validation());
        assert_eq!(app.active_alarm().map(|t| t.id), Some(id));
        assert!(log.borrow().playing.is_some());
        assert_eq!(app.store().get(id).and_then(|t| t.alarm_at), in_secs(1));

        let week = app
            .snooze(Some(MAX_SNOOZE_MINUTES))
            .expect("snooze")
            .expect("was ringing");
        assert_eq!(
            week,
            origin() + chrono::Duration::seconds(1) + chrono::Duration::days(7)
        );
    }

    #[test]
    fn out_of_range_timing_settings_are_config_errors() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("snooze.minutes".to_string(), "99999999999".to_string())]);
        assert!(AppSettings::from_config(&cfg, Path::new("/data")).is_err());

        for secs in ["inf", "1e30"] {
            let mut cfg = Config::default();
            cfg.apply_overrides([("preview.seconds".to_string(), secs.to_string())]);
            assert!(AppSettings::from_config(&cfg, Path::new("/data")).is_err());
        }

        let mut cfg = Config::default();
        cfg.apply_overrides([
            ("snooze.minutes".to_string(), "10".to_string()),
            ("preview.seconds".to_string(), "1.5".to_string()),
        ]);
        let settings = AppSettings::from_config(&cfg, Path::new("/data")).expect("settings");
        assert_eq!(settings.snooze_minutes, 10);
        assert_eq!(settings.notifier.preview_for, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn editing_to_past_alarm_is_rejected_without_change() {
        let (mut app, _log) = app();
        let id = app
            .add_task(NewTask {
                text: "tea".into(),
                alarm_at: in_secs(10),
                sound_id: None,
            })
            .expect("add");

        let err = app
            .edit_task(id, TaskPatch::alarm(in_secs(-1)))
            .expect_err("past alarm");
        assert!(err.is_validation());
        assert_eq!(app.store().get(id).and_then(|t| t.alarm_at), in_secs(10));
        assert!(app.scheduler().is_armed(id));
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_keeps_alarm_time_and_arms_nothing() {
        let (mut app, log) = app();
        app.unlock_audio();
        let id = app
            .add_task(NewTask {
                text: "pills".into(),
                alarm_at: in_secs(1),
                sound_id: Some(SoundId::Sound5),
            })
            .expect("add");
        app.next_delivery().await.expect("delivery");

        let dismissed = app.dismiss().expect("was ringing");
        assert_eq!(dismissed.id, id);
        assert!(app.active_alarm().is_none());
        assert_eq!(log.borrow().playing, None);
        assert_eq!(app.store().get(id).and_then(|t| t.alarm_at), in_secs(1));
        assert_eq!(app.scheduler().armed_count(), 0);
        assert!(app.dismiss().is_none());
        assert!(app.snooze(Some(5)).expect("snooze").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn past_alarm_on_add_is_rejected() {
        let (mut app, _log) = app();
        let err = app
            .add_task(NewTask {
                text: "too late".into(),
                alarm_at: in_secs(0),
                sound_id: None,
            })
            .expect_err("past alarm");
        assert!(err.is_validation());
        assert!(app.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn locked_audio_falls_back_to_vibration_and_banner() {
        let (mut app, log) = app_with(
            TaskStore::new(Box::new(MemoryKvStore::new())),
            Permission::Denied,
        );
        app.add_task(NewTask {
            text: "silent".into(),
            alarm_at: in_secs(1),
            sound_id: None,
        })
        .expect("add");

        let report = app.next_delivery().await.expect("delivery");
        assert!(!report.sound_playing);
        assert!(report.playback_error.is_some());
        assert!(report.vibrated);
        assert!(!report.notified);
        assert_eq!(report.sound, SoundId::Sound1);
        assert!(log.borrow().vibrations.iter().any(|p| p == FALLBACK_VIBRATION));
        assert!(app.active_alarm().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn preview_stops_after_cutoff() {
        let (mut app, log) = app();
        assert!(app.test_sound(SoundId::Sound2).is_err());

        app.unlock_audio();
        app.test_sound(SoundId::Sound2).expect("preview");
        assert_eq!(log.borrow().playing, Some((SoundId::Sound2, PlayMode::Once)));

        assert!(no_delivery_within(&mut app, 1).await);
        assert!(log.borrow().playing.is_some());
        assert!(no_delivery_within(&mut app, 2).await);
        assert_eq!(log.borrow().playing, None);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_arms_only_future_open_alarms() {
        let kv = MemoryKvStore::new();
        let mut seed = TaskStore::new(Box::new(kv));
        seed.add(Task::new(TaskId(1), "future".into(), origin()).with_alarm(in_secs(60), None))
            .expect("add");
        seed.add(Task::new(TaskId(2), "past".into(), origin()).with_alarm(in_secs(-60), None))
            .expect("add");
        let mut done = Task::new(TaskId(3), "done".into(), origin()).with_alarm(in_secs(60), None);
        done.completed = true;
        seed.add(done).expect("add");

        let (mut app, _log) = app_with(seed, Permission::Granted);
        assert_eq!(app.restore_alarms(), 1);
        assert!(app.scheduler().is_armed(TaskId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fire_is_dropped() {
        let (mut app, _log) = app();
        let id = app
            .add_task(NewTask {
                text: "x".into(),
                alarm_at: in_secs(5),
                sound_id: None,
            })
            .expect("add");
        let stale = AlarmEvent::Fired {
            task_id: id,
            generation: 0,
        };
        assert!(app.handle_event(stale).is_none());
        assert!(app.active_alarm().is_none());
        assert!(app.scheduler().is_armed(id));
    }
}
