use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChimeError;
use crate::sound::SoundId;

/// Task identifier, derived from the creation time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Next id after `last`, based on `now`. Two tasks created within the
    /// same millisecond still get distinct, increasing ids.
    pub fn next(now: DateTime<Utc>, last: Option<TaskId>) -> Self {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        match last {
            Some(TaskId(prev)) if prev >= millis => TaskId(prev + 1),
            _ => TaskId(millis),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| ChimeError::validation(format!("invalid task id: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub alarm_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sound_id: Option<SoundId>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            completed: false,
            alarm_at: None,
            sound_id: None,
            created_at: now,
        }
    }

    pub fn with_alarm(mut self, alarm_at: Option<DateTime<Utc>>, sound_id: Option<SoundId>) -> Self {
        self.alarm_at = alarm_at;
        self.sound_id = sound_id;
        self
    }

    /// Whether a timer should be armed for this task at `now`.
    pub fn alarm_pending(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.alarm_at.is_some_and(|at| at > now)
    }

    pub fn sound_or_default(&self) -> SoundId {
        self.sound_id.unwrap_or_default()
    }
}

/// Partial update applied by [`crate::store::TaskStore::update`].
///
/// `alarm_at` and `sound_id` are doubly optional: `None` leaves the field
/// alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub alarm_at: Option<Option<DateTime<Utc>>>,
    pub sound_id: Option<Option<SoundId>>,
}

impl TaskPatch {
    pub fn alarm(alarm_at: Option<DateTime<Utc>>) -> Self {
        Self {
            alarm_at: Some(alarm_at),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.completed.is_none()
            && self.alarm_at.is_none()
            && self.sound_id.is_none()
    }

    pub(crate) fn apply(&self, task: &mut Task) {
        if let Some(text) = &self.text {
            task.text = text.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(alarm_at) = self.alarm_at {
            task.alarm_at = alarm_at;
        }
        if let Some(sound_id) = self.sound_id {
            task.sound_id = sound_id;
        }
    }
}
