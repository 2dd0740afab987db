use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "frontdesk-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "FRONTDESK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "FRONTDESK_TIME_CONFIG";
const DEFAULT_DISPLAY_TIMEZONE: &str =
  "UTC";

/// Naive layouts accepted for stored
/// appointment times. These are read as
/// wall-clock time in the display zone.
const NAIVE_TIMESTAMP_FORMATS: [&str;
  4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Resolves the zone appointments are
/// displayed in.
///
/// Order: `FRONTDESK_TIMEZONE`, the
/// `timezone` config key, the
/// `frontdesk-time.toml` file, then UTC.
pub fn resolve_display_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_DISPLAY_TIMEZONE,
    "default"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "resolved display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn today_in_timezone(
  timezone: Tz
) -> NaiveDate {
  Utc::now()
    .with_timezone(&timezone)
    .date_naive()
}

#[must_use]
pub fn now_in_timezone(
  timezone: Tz
) -> NaiveDateTime {
  Utc::now()
    .with_timezone(&timezone)
    .naive_local()
}

/// Reads a stored timestamp as wall-clock
/// time in `timezone`. Values carrying an
/// offset are converted; naive values are
/// taken as already local. Anything else
/// yields `None`.
#[must_use]
pub fn parse_timestamp(
  raw: &str,
  timezone: Tz
) -> Option<NaiveDateTime> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(with_offset) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Some(
      with_offset
        .with_timezone(&timezone)
        .naive_local()
    );
  }

  NAIVE_TIMESTAMP_FORMATS
    .iter()
    .find_map(|format| {
      NaiveDateTime::parse_from_str(
        trimmed, format
      )
      .ok()
    })
}

/// Parses a calendar date argument:
/// `YYYY-MM-DD`, `today`, `tomorrow` or
/// `yesterday`.
pub fn parse_date_arg(
  raw: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = raw.trim();
  match token
    .to_ascii_lowercase()
    .as_str()
  {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(add_days(today, 1));
    }
    | "yesterday" => {
      return Ok(add_days(today, -1));
    }
    | _ => {}
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .map_err(|err| {
    anyhow!(
      "invalid date '{token}': \
       expected YYYY-MM-DD ({err})"
    )
  })
}

pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  Duration::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .unwrap_or(date)
}

/// Moves `date` by whole months. The
/// resulting day is `anchor_day` clamped
/// into the target month.
pub fn shift_months(
  date: NaiveDate,
  months: i64,
  anchor_day: u32
) -> NaiveDate {
  let Some(total) =
    i64::from(date.year())
      .checked_mul(12)
      .and_then(|base| {
        base.checked_add(i64::from(
          date.month0()
        ))
      })
      .and_then(|base| {
        base.checked_add(months)
      })
  else {
    return date;
  };
  let Ok(year) =
    i32::try_from(total.div_euclid(12))
  else {
    return date;
  };
  let month =
    total.rem_euclid(12) as u32 + 1;

  let day = anchor_day
    .max(1)
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

/// Sunday on or before `day`.
pub fn start_of_week(
  day: NaiveDate
) -> NaiveDate {
  let offset = day
    .weekday()
    .num_days_from_sunday();
  add_days(day, -i64::from(offset))
}

#[cfg(test)]
mod tests {
  use chrono::{
    Timelike,
    Weekday
  };

  use super::*;

  fn ymd(
    year: i32,
    month: u32,
    day: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(
      year, month, day
    )
    .expect("valid date")
  }

  #[test]
  fn parses_naive_local_timestamps() {
    let parsed = parse_timestamp(
      "2024-03-25T09:15",
      chrono_tz::UTC
    )
    .expect("timestamp");
    assert_eq!(parsed.date(), ymd(2024, 3, 25));
    assert_eq!(parsed.hour(), 9);
    assert_eq!(parsed.minute(), 15);

    assert!(
      parse_timestamp(
        "2024-03-25 14:00:00",
        chrono_tz::UTC
      )
      .is_some()
    );
    assert!(
      parse_timestamp(
        "2024-01-25T09:00:00.000",
        chrono_tz::UTC
      )
      .is_some()
    );
  }

  #[test]
  fn converts_offset_timestamps_into_display_zone()
  {
    let parsed = parse_timestamp(
      "2024-03-25T14:00:00Z",
      chrono_tz::America::New_York
    )
    .expect("timestamp");
    assert_eq!(parsed.hour(), 10);
    assert_eq!(parsed.date(), ymd(2024, 3, 25));
  }

  #[test]
  fn rejects_garbage_timestamps() {
    assert!(
      parse_timestamp(
        "not a time",
        chrono_tz::UTC
      )
      .is_none()
    );
    assert!(
      parse_timestamp("", chrono_tz::UTC)
        .is_none()
    );
    assert!(
      parse_timestamp(
        "2024-02-30T09:00",
        chrono_tz::UTC
      )
      .is_none()
    );
  }

  #[test]
  fn shift_months_rolls_over_years() {
    assert_eq!(
      shift_months(ymd(2024, 12, 15), 1, 15),
      ymd(2025, 1, 15)
    );
    assert_eq!(
      shift_months(ymd(2025, 1, 15), -1, 15),
      ymd(2024, 12, 15)
    );
    assert_eq!(
      shift_months(ymd(2024, 3, 1), -27, 1),
      ymd(2021, 12, 1)
    );
  }

  #[test]
  fn shift_months_clamps_to_anchor() {
    let feb = shift_months(
      ymd(2024, 1, 31),
      1,
      31
    );
    assert_eq!(feb, ymd(2024, 2, 29));
    assert_eq!(
      shift_months(feb, 1, 31),
      ymd(2024, 3, 31)
    );
  }

  #[test]
  fn arithmetic_at_the_limits_keeps_the_date() {
    let date = ymd(2024, 3, 25);
    for amount in [i64::MAX, i64::MIN] {
      assert_eq!(add_days(date, amount), date);
      assert_eq!(
        shift_months(date, amount, 25),
        date
      );
    }
    assert_eq!(
      add_days(NaiveDate::MAX, 1),
      NaiveDate::MAX
    );
  }

  #[test]
  fn month_lengths() {
    assert_eq!(days_in_month(2024, 2), 29);
    assert_eq!(days_in_month(2023, 2), 28);
    assert_eq!(days_in_month(2024, 12), 31);
    assert_eq!(days_in_month(2024, 4), 30);
  }

  #[test]
  fn week_starts_on_sunday() {
    let start =
      start_of_week(ymd(2024, 3, 27));
    assert_eq!(start, ymd(2024, 3, 24));
    assert_eq!(start.weekday(), Weekday::Sun);
    assert_eq!(
      start_of_week(ymd(2024, 3, 24)),
      ymd(2024, 3, 24)
    );
  }

  #[test]
  fn parses_relative_date_args() {
    let today = ymd(2024, 3, 25);
    assert_eq!(
      parse_date_arg("today", today)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_date_arg("Tomorrow", today)
        .expect("tomorrow"),
      ymd(2024, 3, 26)
    );
    assert_eq!(
      parse_date_arg("2023-12-31", today)
        .expect("explicit"),
      ymd(2023, 12, 31)
    );
    assert!(
      parse_date_arg("31/12/2023", today)
        .is_err()
    );
  }
}
