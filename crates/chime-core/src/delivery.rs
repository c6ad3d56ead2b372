use tracing::{debug, info};

use crate::notifier::{DeliveryReport, Notifier};
use crate::task::{Task, TaskId};

/// The single "currently ringing" slot.
#[derive(Debug, Default)]
pub struct AlarmDelivery {
    active: Option<Task>,
}

impl AlarmDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Task> {
        self.active.as_ref()
    }

    pub fn is_ringing(&self, id: TaskId) -> bool {
        self.active.as_ref().is_some_and(|t| t.id == id)
    }

    /// Makes `task` the ringing alarm, replacing any previous one.
    pub fn deliver(&mut self, task: Task, notifier: &mut Notifier) -> DeliveryReport {
        info!(task_id = %task.id, text = %task.text, "alarm ringing");
        let report = notifier.ring(&task);
        self.active = Some(task);
        report
    }

    /// Clears the slot and silences the alarm, returning what was ringing.
    pub fn clear(&mut self, notifier: &mut Notifier) -> Option<Task> {
        let task = self.active.take()?;
        notifier.stop();
        debug!(task_id = %task.id, "alarm cleared");
        Some(task)
    }

    /// Clears the slot only if `id` is the ringing task.
    pub fn clear_if(&mut self, id: TaskId, notifier: &mut Notifier) -> bool {
        if self.is_ringing(id) {
            self.clear(notifier);
            true
        } else {
            false
        }
    }
}
