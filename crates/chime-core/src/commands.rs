use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, instrument};

use crate::app::{AlarmApp, AppSettings};
use crate::cli::Command;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::datastore::FileKvStore;
use crate::notifier::SoundPlayer;
use crate::render::Renderer;
use crate::store::TaskStore;
use crate::terminal::TerminalAlerts;

mod task_ops;
mod watch;

pub use task_ops::resolve_alarm;

#[instrument(skip(kv, cfg, renderer, command), fields(data_dir = %data_dir.display()))]
pub fn dispatch(
    kv: FileKvStore,
    cfg: &Config,
    data_dir: &Path,
    mut renderer: Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let guard = runtime.enter();

    let mut app = build_app(kv, cfg, data_dir)?;
    debug!(?command, tasks = app.store().len(), "dispatching command");

    let result = match command {
        Command::Watch { muted } => watch::cmd_watch(&runtime, &mut app, cfg, &mut renderer, muted),
        Command::TestSound { sound } => {
            watch::cmd_test_sound(&runtime, &mut app, &mut renderer, sound)
        }
        other => task_ops::run(&mut app, cfg, &mut renderer, other),
    };

    // The stdin reader of `watch` sits on a blocking thread.
    drop(app);
    drop(guard);
    runtime.shutdown_background();
    result
}

fn build_app(kv: FileKvStore, cfg: &Config, data_dir: &Path) -> anyhow::Result<AlarmApp> {
    let settings = AppSettings::from_config(cfg, data_dir)?;
    let store = TaskStore::open(Box::new(kv));

    Ok(AlarmApp::new(
        store,
        sound_player(cfg)?,
        Box::new(TerminalAlerts),
        Arc::new(SystemClock),
        settings,
    ))
}

#[cfg(feature = "audio")]
fn sound_player(cfg: &Config) -> anyhow::Result<Box<dyn SoundPlayer>> {
    let volume = cfg.get_parsed::<f32>("audio.volume")?.unwrap_or(1.0);
    Ok(Box::new(crate::audio::RodioPlayer::spawn(volume)))
}

#[cfg(not(feature = "audio"))]
fn sound_player(_cfg: &Config) -> anyhow::Result<Box<dyn SoundPlayer>> {
    Ok(Box::new(crate::terminal::BellPlayer::default()))
}

/// Prints any save warnings the store queued during the last operation.
fn flush_warnings(app: &mut AlarmApp, renderer: &mut Renderer) -> anyhow::Result<()> {
    for warning in app.take_warnings() {
        renderer.print_warning(&warning)?;
    }
    Ok(())
}
