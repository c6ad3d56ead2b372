use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::Zone;
use crate::filter::TaskFilter;
use crate::notifier::DeliveryReport;
use crate::sound::SoundId;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    zone: Zone,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };
        let zone = Zone::parse(cfg.get("timezone").as_deref())?;

        Ok(Self { color, zone })
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        filter: TaskFilter,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "{}", filter.empty_message())?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Alarm".to_string(),
            "Sound".to_string(),
            "Task".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let alarm = match task.alarm_at {
                Some(at) => {
                    let text = self.zone.format(at);
                    if task.alarm_pending(now) {
                        self.paint(&text, "33")
                    } else {
                        self.paint(&text, "2")
                    }
                }
                None => String::new(),
            };
            let done = if task.completed { "✓" } else { "" }.to_string();
            let sound = if task.alarm_at.is_some() {
                task.sound_or_default().label().to_string()
            } else {
                String::new()
            };
            let text = if task.completed {
                self.paint(&task.text, "9")
            } else {
                task.text.clone()
            };

            rows.push(vec![task.id.to_string(), done, alarm, sound, text]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_sound_catalog(&mut self, default: SoundId) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["Sound".to_string(), "Name".to_string(), "File".to_string()];
        let rows = SoundId::ALL
            .into_iter()
            .map(|id| {
                let key = if id == default {
                    self.paint(&format!("{id}*"), "33")
                } else {
                    id.to_string()
                };
                vec![key, id.label().to_string(), id.file_name().to_string()]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_delivery(&mut self, report: &DeliveryReport) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(&report.banner, "1;31"))?;
        writeln!(out, "It's time! You set an alarm for this time.")?;
        if let Some(err) = &report.playback_error {
            writeln!(out, "{}", self.paint(&format!("(sound unavailable: {err})"), "2"))?;
        }
        writeln!(out, "snooze [minutes] | dismiss")?;
        out.flush()?;
        Ok(())
    }

    pub fn print_notice(&mut self, msg: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{msg}")?;
        Ok(())
    }

    pub fn print_warning(&mut self, msg: &str) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{}", self.paint(msg, "33"))?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
