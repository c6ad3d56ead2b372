//! Per-task alarm timers.
//!
//! Each armed alarm is a tokio task that sleeps until the alarm time and
//! then posts [`AlarmEvent::Fired`]. The scheduler keeps exactly one entry
//! per task id; arming again aborts the previous timer first. Every entry
//! carries a generation so a fire that raced with a re-arm is recognised as
//! stale by [`AlarmScheduler::acknowledge`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::events::{AlarmEvent, EventSender};
use crate::task::{Task, TaskId};

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    alarm_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

pub struct AlarmScheduler {
    timers: HashMap<TaskId, ArmedTimer>,
    next_generation: u64,
    events: EventSender,
    clock: Arc<dyn Clock>,
}

impl AlarmScheduler {
    pub fn new(events: EventSender, clock: Arc<dyn Clock>) -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 0,
            events,
            clock,
        }
    }

    /// Arms the alarm for `task`. Does nothing (and returns `false`) when
    /// the task has no alarm, is completed, or its alarm is not in the
    /// future.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn schedule(&mut self, task: &Task) -> bool {
        let now = self.clock.now();
        let Some(alarm_at) = task.alarm_at.filter(|_| task.alarm_pending(now)) else {
            debug!(alarm_at = ?task.alarm_at, completed = task.completed, "nothing to arm");
            return false;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available; alarm not armed");
            return false;
        };

        self.cancel(task.id);

        let delay = (alarm_at - now).to_std().unwrap_or_default();
        self.next_generation += 1;
        let generation = self.next_generation;
        let task_id = task.id;
        let events = self.events.clone();

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if events
                .send(AlarmEvent::Fired {
                    task_id,
                    generation,
                })
                .is_err()
            {
                debug!(%task_id, "event loop gone; dropping fire");
            }
        });

        debug!(delay_ms = delay.as_millis() as u64, generation, "alarm armed");
        self.timers.insert(
            task_id,
            ArmedTimer {
                generation,
                alarm_at,
                handle,
            },
        );
        true
    }

    /// Disarms the alarm for `task_id`. Idempotent.
    #[instrument(skip(self))]
    pub fn cancel(&mut self, task_id: TaskId) -> bool {
        match self.timers.remove(&task_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!(generation = timer.generation, "alarm cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    /// Claims a fire event. Returns `false` if the timer that produced it has
    /// since been cancelled or replaced.
    pub fn acknowledge(&mut self, task_id: TaskId, generation: u64) -> bool {
        match self.timers.get(&task_id) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(&task_id);
                true
            }
            _ => {
                debug!(%task_id, generation, "stale alarm fire");
                false
            }
        }
    }

    pub fn is_armed(&self, task_id: TaskId) -> bool {
        self.timers.contains_key(&task_id)
    }

    pub fn armed_at(&self, task_id: TaskId) -> Option<DateTime<Utc>> {
        self.timers.get(&task_id).map(|t| t.alarm_at)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for AlarmScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
