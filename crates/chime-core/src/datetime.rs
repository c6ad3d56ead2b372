use chrono::{
  DateTime,
  Duration,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::{
  ChimeError,
  Result
};

/// Zone in which alarm times are typed
/// and displayed.
#[derive(Debug, Clone, Copy)]
pub enum Zone {
  Local,
  Named(Tz)
}

impl Zone {
  pub fn parse(
    raw: Option<&str>
  ) -> anyhow::Result<Self> {
    let Some(raw) = raw
      .map(str::trim)
      .filter(|s| !s.is_empty())
    else {
      return Ok(Zone::Local);
    };
    if raw.eq_ignore_ascii_case("local")
    {
      return Ok(Zone::Local);
    }
    match raw.parse::<Tz>() {
      | Ok(tz) => {
        tracing::info!(
          timezone = %raw,
          "configured timezone"
        );
        Ok(Zone::Named(tz))
      }
      | Err(err) => {
        Err(anyhow::anyhow!(
          "invalid timezone '{raw}': \
           {err}"
        ))
      }
    }
  }

  fn local_naive(
    self,
    now: DateTime<Utc>
  ) -> NaiveDateTime {
    match self {
      | Zone::Local => {
        now
          .with_timezone(&Local)
          .naive_local()
      }
      | Zone::Named(tz) => {
        now
          .with_timezone(&tz)
          .naive_local()
      }
    }
  }

  fn to_utc(
    self,
    naive: NaiveDateTime,
    context: &str
  ) -> Result<DateTime<Utc>> {
    match self {
      | Zone::Local => {
        resolve_local(
          Local.from_local_datetime(
            &naive
          ),
          context
        )
      }
      | Zone::Named(tz) => {
        resolve_local(
          tz.from_local_datetime(&naive),
          context
        )
      }
    }
  }

  #[must_use]
  pub fn format(
    self,
    dt: DateTime<Utc>
  ) -> String {
    const FMT: &str = "%Y-%m-%d %H:%M";
    match self {
      | Zone::Local => {
        dt.with_timezone(&Local)
          .format(FMT)
          .to_string()
      }
      | Zone::Named(tz) => {
        dt.with_timezone(&tz)
          .format(FMT)
          .to_string()
      }
    }
  }
}

fn resolve_local<Z: TimeZone>(
  result: LocalResult<DateTime<Z>>,
  context: &str
) -> Result<DateTime<Utc>> {
  match result {
    | LocalResult::Single(dt) => {
      Ok(dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let first =
        first.with_timezone(&Utc);
      let second =
        second.with_timezone(&Utc);
      tracing::warn!(
        context,
        %first,
        %second,
        "ambiguous local datetime; using earliest"
      );
      Ok(first.min(second))
    }
    | LocalResult::None => {
      Err(ChimeError::validation(
        format!(
          "local time does not exist \
           in the configured \
           timezone: {context}"
        )
      ))
    }
  }
}

/// Parses an alarm time expression
/// relative to `now`.
#[tracing::instrument(skip(now, zone), fields(input = input))]
pub fn parse_alarm_expr(
  input: &str,
  now: DateTime<Utc>,
  zone: Zone
) -> Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  if lower == "now" {
    return Ok(now);
  }

  if let Some(offset) =
    parse_relative(&lower)
  {
    return Ok(now + offset);
  }

  if let Some(time) =
    parse_clock_time(token)
  {
    let local_now =
      zone.local_naive(now);
    let mut candidate =
      local_now.date().and_time(time);
    if candidate <= local_now {
      candidate += Duration::days(1);
    }
    return zone
      .to_utc(candidate, "clock-time");
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S"
  ] {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return zone
        .to_utc(naive, "date-time");
    }
  }

  Err(ChimeError::validation(format!(
    "unrecognized alarm time \
     '{input}' (try +10m, +2h, 15:30, \
     3:30pm, 2026-03-01T09:00 or \
     RFC 3339)"
  )))
}

/// Combines the date-picker pair. Both
/// absent means no alarm; exactly one
/// present is rejected.
pub fn alarm_from_picker(
  date: Option<&str>,
  time: Option<&str>,
  zone: Zone
) -> Result<Option<DateTime<Utc>>> {
  let date = date
    .map(str::trim)
    .filter(|s| !s.is_empty());
  let time = time
    .map(str::trim)
    .filter(|s| !s.is_empty());

  let (date, time) = match (date, time)
  {
    | (None, None) => return Ok(None),
    | (Some(d), Some(t)) => (d, t),
    | _ => {
      return Err(
        ChimeError::validation(
          "Please select both date and \
           time!"
        )
      );
    }
  };

  let day = NaiveDate::parse_from_str(
    date, "%Y-%m-%d"
  )
  .map_err(|_| {
    ChimeError::validation(format!(
      "invalid date '{date}' \
       (expected YYYY-MM-DD)"
    ))
  })?;
  let clock = parse_clock_time(time)
    .ok_or_else(|| {
      ChimeError::validation(format!(
        "invalid time '{time}' \
         (expected HH:MM)"
      ))
    })?;

  zone
    .to_utc(
      day.and_time(clock),
      "date-picker"
    )
    .map(Some)
}

/// Rejects alarm times that are not
/// strictly in the future.
pub fn require_future(
  at: DateTime<Utc>,
  now: DateTime<Utc>
) -> Result<DateTime<Utc>> {
  if at <= now {
    return Err(ChimeError::validation(
      "Please select a future date and \
       time!"
    ));
  }
  Ok(at)
}

fn parse_relative(
  token: &str
) -> Option<Duration> {
  let re = Regex::new(
    r"^(?:in\s*)?\+?(?P<n>\d{1,6})\s*(?P<unit>s|sec|secs|m|min|mins|h|hr|hrs|d|day|days)$",
  )
  .ok()?;
  let caps = re.captures(token)?;
  let n = caps
    .name("n")?
    .as_str()
    .parse::<i64>()
    .ok()?;
  match caps.name("unit")?.as_str() {
    | "s" | "sec" | "secs" => {
      Some(Duration::seconds(n))
    }
    | "m" | "min" | "mins" => {
      Some(Duration::minutes(n))
    }
    | "h" | "hr" | "hrs" => {
      Some(Duration::hours(n))
    }
    | _ => Some(Duration::days(n))
  }
}

fn parse_clock_time(
  token: &str
) -> Option<NaiveTime> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;

  let hour = match captures
    .name("ampm")
    .map(|m| m.as_str().to_ascii_lowercase())
  {
    | Some(ampm) => {
      if raw_hour == 0 || raw_hour > 12 {
        return None;
      }
      match (ampm.as_str(), raw_hour) {
        | ("am", 12) => 0,
        | ("am", h) => h,
        | ("pm", 12) => 12,
        | (_, h) => h + 12
      }
    }
    | None => raw_hour
  };

  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
}
