//! Events posted by timers back to the owning event loop.

use tokio::sync::mpsc;

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmEvent {
    /// An armed alarm timer elapsed.
    Fired { task_id: TaskId, generation: u64 },

    /// The bounded test-sound preview reached its cut-off.
    PreviewElapsed { generation: u64 },
}

pub type EventSender = mpsc::UnboundedSender<AlarmEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AlarmEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
