use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::{
  info,
  instrument
};

use super::flush_warnings;
use crate::app::{
  AlarmApp,
  NewTask
};
use crate::cli::{
  AlarmArgs,
  Command
};
use crate::config::Config;
use crate::datetime::{
  Zone,
  alarm_from_picker,
  parse_alarm_expr
};
use crate::error::{
  ChimeError,
  Result
};
use crate::filter::TaskFilter;
use crate::render::Renderer;
use crate::sound::SoundId;
use crate::task::{
  TaskId,
  TaskPatch
};

/// Runs one of the commands that only
/// touch the task list.
pub(super) fn run(
  app: &mut AlarmApp,
  cfg: &Config,
  renderer: &mut Renderer,
  command: Command
) -> anyhow::Result<()> {
  let result = match command {
    | Command::Add {
      text,
      alarm,
      sound
    } => cmd_add(
      app, renderer, text, &alarm,
      sound
    ),
    | Command::Edit {
      id,
      text,
      alarm,
      clear_alarm,
      sound
    } => cmd_edit(
      app,
      renderer,
      id,
      text,
      &alarm,
      clear_alarm,
      sound
    ),
    | Command::Done {
      id
    } => cmd_done(app, renderer, id),
    | Command::Delete {
      id
    } => {
      cmd_delete(app, renderer, id)
    }
    | Command::List {
      filter
    } => {
      cmd_list(app, renderer, filter)
    }
    | Command::Sounds => {
      cmd_sounds(app, renderer)
    }
    | Command::Show => {
      cmd_show(cfg, renderer)
    }
    | Command::Watch {
      ..
    }
    | Command::TestSound {
      ..
    } => {
      Err(anyhow!(
        "command not available here"
      ))
    }
  };

  flush_warnings(app, renderer)?;
  result
}

/// Turns `--at` or the `--date`/`--time`
/// pair into an alarm instant. Absent
/// input means no alarm.
pub fn resolve_alarm(
  alarm: &AlarmArgs,
  now: DateTime<Utc>,
  zone: Zone
) -> Result<Option<DateTime<Utc>>> {
  match &alarm.at {
    | Some(expr) => {
      parse_alarm_expr(expr, now, zone)
        .map(Some)
    }
    | None => {
      alarm_from_picker(
        alarm.date.as_deref(),
        alarm.time.as_deref(),
        zone
      )
    }
  }
}

#[instrument(skip(
  app, renderer, text, alarm
))]
fn cmd_add(
  app: &mut AlarmApp,
  renderer: &mut Renderer,
  text: Vec<String>,
  alarm: &AlarmArgs,
  sound: Option<SoundId>
) -> anyhow::Result<()> {
  info!("command add");

  let zone = renderer.zone();
  let alarm_at =
    resolve_alarm(alarm, app.now(), zone)?;
  let id = app.add_task(NewTask {
    text: text.join(" "),
    alarm_at,
    sound_id: sound
  })?;

  renderer.print_notice(&format!(
    "Created task {id}."
  ))?;
  if let Some(task) = app.store().get(id)
    && let Some(at) = task.alarm_at
  {
    renderer.print_notice(&format!(
      "Alarm set for {} ({}).",
      zone.format(at),
      task.sound_or_default().label()
    ))?;
  }
  Ok(())
}

#[instrument(skip(
  app, renderer, text, alarm
))]
fn cmd_edit(
  app: &mut AlarmApp,
  renderer: &mut Renderer,
  id: TaskId,
  text: Option<String>,
  alarm: &AlarmArgs,
  clear_alarm: bool,
  sound: Option<SoundId>
) -> anyhow::Result<()> {
  info!("command edit");

  let mut patch = TaskPatch {
    text,
    sound_id: sound.map(Some),
    ..TaskPatch::default()
  };
  if clear_alarm {
    patch.alarm_at = Some(None);
    patch.sound_id = Some(None);
  } else if !alarm.is_empty() {
    let at = resolve_alarm(
      alarm,
      app.now(),
      renderer.zone()
    )?;
    patch.alarm_at = Some(at);
  }

  if patch.is_empty() {
    return Err(
      ChimeError::validation(
        "Nothing to change."
      )
      .into()
    );
  }

  app.edit_task(id, patch)?;
  renderer.print_notice(&format!(
    "Modified task {id}."
  ))?;
  Ok(())
}

#[instrument(skip(app, renderer))]
fn cmd_done(
  app: &mut AlarmApp,
  renderer: &mut Renderer,
  id: TaskId
) -> anyhow::Result<()> {
  let completed = app.toggle_task(id)?;
  let msg = if completed {
    format!("Completed task {id}.")
  } else {
    format!("Reopened task {id}.")
  };
  renderer.print_notice(&msg)?;
  Ok(())
}

#[instrument(skip(app, renderer))]
fn cmd_delete(
  app: &mut AlarmApp,
  renderer: &mut Renderer,
  id: TaskId
) -> anyhow::Result<()> {
  let task =
    app.delete_task(id).ok_or_else(|| {
      ChimeError::validation(format!(
        "no task with id {id}"
      ))
    })?;
  renderer.print_notice(&format!(
    "Deleted task {id} '{}'.",
    task.text
  ))?;
  Ok(())
}

fn cmd_list(
  app: &AlarmApp,
  renderer: &mut Renderer,
  filter: TaskFilter
) -> anyhow::Result<()> {
  let now = app.now();
  let tasks = app.store().list(filter);
  renderer
    .print_task_table(&tasks, filter, now)
}

fn cmd_sounds(
  app: &AlarmApp,
  renderer: &mut Renderer
) -> anyhow::Result<()> {
  renderer.print_sound_catalog(
    app.settings().default_sound
  )
}

fn cmd_show(
  cfg: &Config,
  renderer: &mut Renderer
) -> anyhow::Result<()> {
  for path in &cfg.loaded_files {
    renderer.print_notice(&format!(
      "# loaded {}",
      path.display()
    ))?;
  }
  for (key, value) in cfg.iter() {
    renderer.print_notice(&format!(
      "{key}={value}"
    ))?;
  }
  Ok(())
}
