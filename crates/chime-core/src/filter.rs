use std::fmt;
use std::str::FromStr;

use crate::error::ChimeError;
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default
)]
pub enum TaskFilter {
  #[default]
  All,
  Active,
  Completed,
  HasAlarm
}

impl TaskFilter {
  pub fn matches(
    self,
    task: &Task
  ) -> bool {
    match self {
      | TaskFilter::All => true,
      | TaskFilter::Active => {
        !task.completed
      }
      | TaskFilter::Completed => {
        task.completed
      }
      | TaskFilter::HasAlarm => {
        task.alarm_at.is_some()
      }
    }
  }

  /// Message shown when nothing
  /// matches.
  pub fn empty_message(
    self
  ) -> &'static str {
    match self {
      | TaskFilter::All => {
        "No tasks yet. Add your first \
         task!"
      }
      | TaskFilter::Active => {
        "No active tasks!"
      }
      | TaskFilter::Completed => {
        "No completed tasks yet. Keep \
         going!"
      }
      | TaskFilter::HasAlarm => {
        "No tasks with alarms. Set a \
         reminder!"
      }
    }
  }
}

impl fmt::Display for TaskFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let name = match self {
      | TaskFilter::All => "all",
      | TaskFilter::Active => "active",
      | TaskFilter::Completed => {
        "completed"
      }
      | TaskFilter::HasAlarm => "alarm"
    };
    f.write_str(name)
  }
}

impl FromStr for TaskFilter {
  type Err = ChimeError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "all" => Ok(TaskFilter::All),
      | "active" | "pending" => {
        Ok(TaskFilter::Active)
      }
      | "completed" | "done" => {
        Ok(TaskFilter::Completed)
      }
      | "alarm" | "alarms" => {
        Ok(TaskFilter::HasAlarm)
      }
      | other => {
        Err(ChimeError::validation(
          format!(
            "unknown filter '{other}' \
             (expected all, active, \
             completed or alarm)"
          )
        ))
      }
    }
  }
}
