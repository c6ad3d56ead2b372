use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::datastore::KeyValueStore;
use crate::error::{ChimeError, Result};
use crate::filter::TaskFilter;
use crate::task::{Task, TaskId, TaskPatch};

/// Key under which the whole task list is stored.
pub const TASKS_KEY: &str = "tasks";

/// Ordered in-memory task list backed by a single persisted blob.
///
/// Tasks are kept newest-first. Every mutation persists immediately; a
/// failed write leaves memory authoritative and queues a warning that the
/// front end drains with [`TaskStore::take_warnings`].
pub struct TaskStore {
    tasks: Vec<Task>,
    kv: Box<dyn KeyValueStore>,
    key: String,
    warnings: Vec<String>,
}

impl TaskStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> Self {
        Self {
            tasks: Vec::new(),
            kv,
            key: TASKS_KEY.to_string(),
            warnings: Vec::new(),
        }
    }

    /// Opens the store and loads whatever is persisted.
    pub fn open(kv: Box<dyn KeyValueStore>) -> Self {
        let mut store = Self::new(kv);
        store.load_from_persistence();
        store
    }

    /// Replaces the in-memory list with the persisted one. A missing blob
    /// yields an empty list; an unreadable or corrupt one resets to empty.
    #[tracing::instrument(skip(self))]
    pub fn load_from_persistence(&mut self) {
        let raw = match self.kv.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no persisted tasks");
                self.tasks.clear();
                return;
            }
            Err(err) => {
                let err = format!("{err:#}");
                warn!(error = %err, "failed to read persisted tasks; starting empty");
                self.warnings.push(format!(
                    "Error loading tasks! Starting with an empty list ({err})."
                ));
                self.tasks.clear();
                return;
            }
        };

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => {
                info!(count = tasks.len(), "loaded tasks");
                self.tasks = tasks;
            }
            Err(err) => {
                warn!(error = %err, "persisted tasks are corrupt; starting empty");
                self.tasks.clear();
            }
        }
    }

    #[tracing::instrument(skip(self), fields(count = self.tasks.len()))]
    pub fn persist(&mut self) -> Result<()> {
        let payload = serde_json::to_string(&self.tasks)
            .map_err(|err| ChimeError::Persistence(err.to_string()))?;
        self.kv
            .set(&self.key, &payload)
            .map_err(|err| ChimeError::Persistence(format!("{err:#}")))
    }

    fn persist_or_warn(&mut self) {
        if let Err(err) = self.persist() {
            warn!(error = %err, "keeping in-memory tasks after failed save");
            self.warnings.push(format!(
                "Error saving tasks! Changes are kept for this session only ({err})."
            ));
        }
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn next_id(&self, now: DateTime<Utc>) -> TaskId {
        TaskId::next(now, self.tasks.iter().map(|t| t.id).max())
    }

    /// Inserts `task` at the front. Rejects empty text and duplicate ids.
    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn add(&mut self, mut task: Task) -> Result<&Task> {
        task.text = task.text.trim().to_string();
        if task.text.is_empty() {
            return Err(ChimeError::validation("Please enter a task!"));
        }
        if self.get(task.id).is_some() {
            return Err(ChimeError::validation(format!("task {} already exists", task.id)));
        }

        self.tasks.insert(0, task);
        self.persist_or_warn();
        debug!(count = self.tasks.len(), "task added");
        Ok(&self.tasks[0])
    }

    #[tracing::instrument(skip(self, patch), fields(task_id = %id))]
    pub fn update(&mut self, id: TaskId, patch: &TaskPatch) -> Result<&Task> {
        if let Some(text) = &patch.text
            && text.trim().is_empty()
        {
            return Err(ChimeError::validation("Task text cannot be empty!"));
        }
        let idx = self.position(id)?;

        let mut patch = patch.clone();
        if let Some(text) = patch.text.as_mut() {
            *text = text.trim().to_string();
        }
        patch.apply(&mut self.tasks[idx]);
        self.persist_or_warn();
        Ok(&self.tasks[idx])
    }

    /// Flips `completed` and returns the new value.
    pub fn toggle(&mut self, id: TaskId) -> Result<bool> {
        let completed = !self.get(id).ok_or_else(|| unknown(id))?.completed;
        self.update(
            id,
            &TaskPatch {
                completed: Some(completed),
                ..TaskPatch::default()
            },
        )?;
        Ok(completed)
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let idx = self.position(id).ok()?;
        let removed = self.tasks.remove(idx);
        self.persist_or_warn();
        Some(removed)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn list(&self, filter: TaskFilter) -> Vec<&Task> {
        self.tasks.iter().filter(|t| filter.matches(t)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn position(&self, id: TaskId) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| unknown(id))
    }
}

fn unknown(id: TaskId) -> ChimeError {
    ChimeError::validation(format!("no task with id {id}"))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::datastore::MemoryKvStore;
    use crate::sound::SoundId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn store() -> TaskStore {
        TaskStore::new(Box::new(MemoryKvStore::new()))
    }

    #[test]
    fn keeps_newest_task_first() {
        let mut store = store();
        let first = store.next_id(now());
        store.add(Task::new(first, "first".into(), now())).expect("add");
        let second = store.next_id(now());
        store.add(Task::new(second, "second".into(), now())).expect("add");

        let texts: Vec<&str> = store
            .list(TaskFilter::All)
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(texts, vec!["second", "first"]);
    }

    #[test]
    fn rejects_blank_text_without_mutating() {
        let mut store = store();
        let err = store
            .add(Task::new(TaskId(1), "   ".into(), now()))
            .expect_err("blank text");
        assert!(err.is_validation());
        assert!(store.is_empty());
    }

    #[test]
    fn update_trims_text_and_rejects_blank() {
        let mut store = store();
        store.add(Task::new(TaskId(1), "draft".into(), now())).expect("add");

        let patch = TaskPatch {
            text: Some("  final  ".into()),
            sound_id: Some(Some(SoundId::Sound3)),
            ..TaskPatch::default()
        };
        let task = store.update(TaskId(1), &patch).expect("update");
        assert_eq!(task.text, "final");
        assert_eq!(task.sound_id, Some(SoundId::Sound3));

        let blank = TaskPatch {
            text: Some(" ".into()),
            ..TaskPatch::default()
        };
        assert!(store.update(TaskId(1), &blank).is_err());
        assert_eq!(store.get(TaskId(1)).map(|t| t.text.as_str()), Some("final"));
    }

    #[test]
    fn write_failure_keeps_memory_and_warns() {
        let mut kv = MemoryKvStore::new();
        kv.fail_writes = true;
        let mut store = TaskStore::new(Box::new(kv));

        store.add(Task::new(TaskId(1), "offline".into(), now())).expect("add");
        assert_eq!(store.len(), 1);
        let warnings = store.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Error saving tasks!"));
        assert!(store.take_warnings().is_empty());
    }

    #[test]
    fn corrupt_blob_resets_to_empty() {
        let kv = MemoryKvStore::new().with_entry(TASKS_KEY, "{not json");
        let store = TaskStore::open(Box::new(kv));
        assert!(store.is_empty());
    }

    #[test]
    fn read_failure_starts_empty_and_warns() {
        let mut kv = MemoryKvStore::new().with_entry(TASKS_KEY, "[]");
        kv.fail_reads = true;
        let mut store = TaskStore::open(Box::new(kv));

        assert!(store.is_empty());
        let warnings = store.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Error loading tasks!"));
    }

    #[test]
    fn toggle_and_filters() {
        let mut store = store();
        store
            .add(
                Task::new(TaskId(1), "alarmed".into(), now())
                    .with_alarm(Some(now() + Duration::hours(1)), None),
            )
            .expect("add");
        store.add(Task::new(TaskId(2), "plain".into(), now())).expect("add");

        assert!(store.toggle(TaskId(2)).expect("toggle"));
        assert_eq!(store.list(TaskFilter::Completed).len(), 1);
        assert_eq!(store.list(TaskFilter::Active).len(), 1);
        assert_eq!(store.list(TaskFilter::HasAlarm)[0].id, TaskId(1));
        assert!(!store.toggle(TaskId(2)).expect("toggle back"));
    }

    #[test]
    fn remove_missing_id_is_none() {
        let mut store = store();
        assert!(store.remove(TaskId(42)).is_none());
    }
}
