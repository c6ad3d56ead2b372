use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::TaskFilter;
use crate::sound::SoundId;
use crate::task::TaskId;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chime",
    version,
    about = "chime: a to-do list with alarms",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "chimerc")]
    pub chimerc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Alarm time, either as one expression or as a date/time pair.
#[derive(Args, Debug, Clone, Default)]
pub struct AlarmArgs {
    /// Alarm time: +10m, +2h, 15:30, 3:30pm, 2026-03-01T09:00, RFC 3339
    #[arg(long, conflicts_with_all = ["date", "time"])]
    pub at: Option<String>,

    /// Alarm date (YYYY-MM-DD); needs --time
    #[arg(long)]
    pub date: Option<String>,

    /// Alarm time of day (HH:MM); needs --date
    #[arg(long)]
    pub time: Option<String>,
}

impl AlarmArgs {
    pub fn is_empty(&self) -> bool {
        self.at.is_none() && self.date.is_none() && self.time.is_none()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a task
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        #[command(flatten)]
        alarm: AlarmArgs,

        /// Alarm sound (sound1..sound5)
        #[arg(long)]
        sound: Option<SoundId>,
    },

    /// Change a task's text, alarm or sound
    Edit {
        id: TaskId,

        #[arg(long)]
        text: Option<String>,

        #[command(flatten)]
        alarm: AlarmArgs,

        /// Remove the alarm
        #[arg(long, conflicts_with_all = ["at", "date", "time"])]
        clear_alarm: bool,

        #[arg(long, conflicts_with = "clear_alarm")]
        sound: Option<SoundId>,
    },

    /// Toggle a task between open and completed
    Done { id: TaskId },

    /// Delete a task and its alarm
    Delete { id: TaskId },

    /// List tasks, newest first
    List {
        #[arg(short, long, default_value_t = TaskFilter::All)]
        filter: TaskFilter,
    },

    /// List the alarm sound catalog
    Sounds,

    /// Play a short preview of a sound
    TestSound { sound: SoundId },

    /// Wait for alarms in the foreground, with an interactive prompt
    Watch {
        /// Keep sound locked; alarms only vibrate and notify
        #[arg(long)]
        muted: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Default for Command {
    fn default() -> Self {
        Command::List {
            filter: TaskFilter::All,
        }
    }
}

/// Commands accepted at the `watch` prompt.
#[derive(Subcommand, Debug, Clone)]
pub enum PromptCommand {
    /// Re-ring the current alarm after some minutes
    Snooze { minutes: Option<i64> },

    /// Silence the current alarm
    Dismiss,

    /// Stop any sound that is playing
    Stop,

    /// Allow alarms to play sound
    #[command(alias = "enable-sound")]
    Unmute,

    /// Leave watch mode
    #[command(alias = "exit")]
    Quit,

    #[command(flatten)]
    Task(Command),
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "watch",
    no_binary_name = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
pub struct PromptLine {
    #[command(subcommand)]
    pub command: PromptCommand,
}

impl PromptLine {
    /// Splits a prompt line shell-style and parses it.
    pub fn parse_line(line: &str) -> anyhow::Result<Self> {
        let words = shlex::split(line).ok_or_else(|| anyhow!("unbalanced quotes"))?;
        Self::try_parse_from(words).map_err(|err| anyhow!(err.render().to_string()))
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                rest.split_once(':')
                    .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulls_positional_rc_overrides() {
        let raw: Vec<OsString> = ["chime", "rc.snooze.minutes:10", "list", "rc.color=off"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(pre.cleaned_args, vec![OsString::from("chime"), OsString::from("list")]);
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.snooze.minutes".to_string(), "10".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn parses_add_with_picker_pair() {
        let cli = GlobalCli::try_parse_from([
            "chime", "add", "Buy", "milk", "--date", "2026-03-01", "--time", "08:00", "--sound",
            "sound2",
        ])
        .expect("parse");
        let Some(Command::Add { text, alarm, sound }) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(text.join(" "), "Buy milk");
        assert_eq!(alarm.date.as_deref(), Some("2026-03-01"));
        assert_eq!(sound, Some(SoundId::Sound2));
    }

    #[test]
    fn at_conflicts_with_picker() {
        assert!(
            GlobalCli::try_parse_from(["chime", "add", "x", "--at", "+5m", "--date", "2026-03-01"])
                .is_err()
        );
    }

    #[test]
    fn clear_alarm_conflicts_with_sound() {
        assert!(
            GlobalCli::try_parse_from(["chime", "edit", "1", "--clear-alarm", "--sound", "sound2"])
                .is_err()
        );
        let cli = GlobalCli::try_parse_from(["chime", "edit", "1", "--clear-alarm"])
            .expect("parse");
        assert!(matches!(cli.command, Some(Command::Edit { clear_alarm: true, sound: None, .. })));
    }

    #[test]
    fn prompt_accepts_snooze_and_task_commands() {
        let line = PromptLine::parse_line("snooze 10").expect("snooze");
        assert!(matches!(line.command, PromptCommand::Snooze { minutes: Some(10) }));

        let line = PromptLine::parse_line("add 'water the plants' --at +1h").expect("add");
        let PromptCommand::Task(Command::Add { text, alarm, .. }) = line.command else {
            panic!("expected add");
        };
        assert_eq!(text, vec!["water the plants".to_string()]);
        assert_eq!(alarm.at.as_deref(), Some("+1h"));

        assert!(PromptLine::parse_line("fly away").is_err());
    }
}
