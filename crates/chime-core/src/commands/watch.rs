//! Foreground alarm loop and sound preview.
//!
//! Timer events and prompt lines are multiplexed on one task, so every
//! mutation of the app happens here.

use std::io::{self, Write};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tracing::{debug, info, instrument};

use super::task_ops;
use crate::app::AlarmApp;
use crate::cli::{Command, PromptCommand, PromptLine};
use crate::config::Config;
use crate::events::AlarmEvent;
use crate::render::Renderer;
use crate::sound::SoundId;

enum Step {
    Event(Option<AlarmEvent>),
    Line(Option<String>),
    Interrupt,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[instrument(skip(runtime, app, cfg, renderer))]
pub(super) fn cmd_watch(
    runtime: &Runtime,
    app: &mut AlarmApp,
    cfg: &Config,
    renderer: &mut Renderer,
    muted: bool,
) -> anyhow::Result<()> {
    if !muted {
        app.unlock_audio();
    }
    super::flush_warnings(app, renderer)?;
    let armed = app.restore_alarms();
    renderer.print_notice(&format!(
        "Watching {armed} alarm(s). Type snooze, dismiss, quit or any chime command."
    ))?;
    if !app.notifier().audio_unlocked() {
        renderer.print_notice("Sound is muted; type unmute to enable it.")?;
    }

    runtime.block_on(watch_loop(app, cfg, renderer))?;

    app.dismiss();
    app.stop_sound();
    info!("watch finished");
    Ok(())
}

async fn watch_loop(
    app: &mut AlarmApp,
    cfg: &Config,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    prompt()?;

    loop {
        let step = tokio::select! {
            event = app.recv_event() => Step::Event(event),
            line = lines.next_line(), if stdin_open => {
                Step::Line(line.context("failed to read prompt input")?)
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                Step::Interrupt
            }
        };

        match step {
            Step::Event(None) | Step::Interrupt => break,
            Step::Event(Some(event)) => {
                if let Some(report) = app.handle_event(event) {
                    renderer.print_delivery(&report)?;
                    prompt()?;
                }
            }
            Step::Line(None) => {
                debug!("stdin closed; watching without a prompt");
                stdin_open = false;
            }
            Step::Line(Some(line)) => {
                if handle_line(app, cfg, renderer, &line)? == Flow::Quit {
                    break;
                }
                prompt()?;
            }
        }
    }

    Ok(())
}

fn handle_line(
    app: &mut AlarmApp,
    cfg: &Config,
    renderer: &mut Renderer,
    line: &str,
) -> anyhow::Result<Flow> {
    if line.trim().is_empty() {
        return Ok(Flow::Continue);
    }
    let parsed = match PromptLine::parse_line(line) {
        Ok(parsed) => parsed,
        Err(err) => {
            renderer.print_warning(&format!("{err:#}"))?;
            return Ok(Flow::Continue);
        }
    };

    match parsed.command {
        PromptCommand::Snooze { minutes } => match app.snooze(minutes) {
            Ok(Some(at)) => {
                let msg = format!("Snoozed until {}.", renderer.zone().format(at));
                renderer.print_notice(&msg)?;
            }
            Ok(None) => renderer.print_notice("No alarm is ringing.")?,
            Err(err) => renderer.print_warning(&format!("error: {err}"))?,
        },
        PromptCommand::Dismiss => match app.dismiss() {
            Some(task) => renderer.print_notice(&format!("Dismissed '{}'.", task.text))?,
            None => renderer.print_notice("No alarm is ringing.")?,
        },
        PromptCommand::Stop => app.stop_sound(),
        PromptCommand::Unmute => {
            app.unlock_audio();
            renderer.print_notice("Sound enabled.")?;
        }
        PromptCommand::Quit => return Ok(Flow::Quit),
        PromptCommand::Task(Command::Watch { .. }) => {
            renderer.print_notice("Already watching.")?;
        }
        PromptCommand::Task(Command::TestSound { sound }) => {
            app.unlock_audio();
            if let Err(err) = app.test_sound(sound) {
                renderer.print_warning(&format!("error: {err}"))?;
            }
        }
        PromptCommand::Task(command) => {
            if let Err(err) = task_ops::run(app, cfg, renderer, command) {
                renderer.print_warning(&format!("error: {err:#}"))?;
            }
        }
    }

    super::flush_warnings(app, renderer)?;
    Ok(Flow::Continue)
}

fn prompt() -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "chime> ")?;
    out.flush()?;
    Ok(())
}

/// Plays a bounded preview and waits for the cut-off.
#[instrument(skip(runtime, app, renderer))]
pub(super) fn cmd_test_sound(
    runtime: &Runtime,
    app: &mut AlarmApp,
    renderer: &mut Renderer,
    sound: SoundId,
) -> anyhow::Result<()> {
    app.unlock_audio();
    app.test_sound(sound)?;
    renderer.print_notice(&format!("Playing {} ({sound}).", sound.label()))?;

    runtime.block_on(async {
        while app.notifier().now_playing().is_some() {
            let Some(event) = app.recv_event().await else {
                break;
            };
            app.handle_event(event);
        }
    });
    Ok(())
}
