use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::calendar::{
  CalendarSettings,
  CursorSync,
  HourRange,
  ViewMode
};
use crate::datetime::resolve_display_timezone;

const RC_ENV_VAR: &str = "FRONTDESKRC";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("color", "on"),
      ("calendar.view", "month"),
      ("calendar.hour_start", "8"),
      ("calendar.hour_end", "19"),
      ("calendar.month_preview", "2"),
      ("calendar.follow_selection", "off")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading frontdeskrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no frontdeskrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// Typed value for `key`, or `default`
  /// when the key is missing or does not
  /// parse.
  fn get_parsed_or<T>(
    &self,
    key: &str,
    default: T
  ) -> T
  where
    T: FromStr
  {
    let Some(raw) = self.map.get(key)
    else {
      return default;
    };
    match raw.trim().parse::<T>() {
      | Ok(value) => value,
      | Err(_) => {
        warn!(
          key,
          value = %raw,
          "unparsable config value; using default"
        );
        default
      }
    }
  }

  /// Calendar settings with out-of-range
  /// values pulled back into bounds.
  pub fn calendar_settings(
    &self
  ) -> CalendarSettings {
    let defaults =
      CalendarSettings::default();

    let view = self
      .get("calendar.view")
      .and_then(|raw| {
        ViewMode::from_key(raw.trim())
      })
      .unwrap_or(defaults.view);

    let hours = HourRange::new(
      self.get_parsed_or(
        "calendar.hour_start",
        defaults.hours.start()
      ),
      self.get_parsed_or(
        "calendar.hour_end",
        defaults.hours.end()
      )
    );

    let mut month_preview = self
      .get_parsed_or(
        "calendar.month_preview",
        defaults.month_preview
      );
    if month_preview == 0 {
      month_preview =
        defaults.month_preview;
    }

    let cursor_sync = if self
      .get_bool(
        "calendar.follow_selection"
      )
      .unwrap_or(false)
    {
      CursorSync::FollowSelection
    } else {
      CursorSync::Manual
    };

    let timezone =
      resolve_display_timezone(
        self.get("timezone").as_deref()
      );

    let settings = CalendarSettings {
      view,
      hours,
      month_preview,
      cursor_sync,
      timezone
    };
    debug!(?settings, "resolved calendar settings");
    settings
  }

  pub fn color_enabled(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get("color")
      .unwrap_or_else(|| {
        "on".to_string()
      });
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      | "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      | other => Err(anyhow!(
        "invalid color setting: {other}"
      ))
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include already loaded; skipping");
          continue;
        }

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping frontdeskrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".frontdeskrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".frontdesk"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn defaults_describe_business_hours() {
    let settings =
      Config::default().calendar_settings();
    assert_eq!(settings.view, ViewMode::Month);
    assert_eq!(settings.hours.start(), 8);
    assert_eq!(settings.hours.end(), 19);
    assert_eq!(settings.month_preview, 2);
    assert_eq!(
      settings.cursor_sync,
      CursorSync::Manual
    );
  }

  #[test]
  fn overrides_strip_rc_prefix_and_win() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.calendar.view".to_string(),
        "week".to_string()
      ),
      (
        "calendar.follow_selection"
          .to_string(),
        "yes".to_string()
      )
    ]);

    let settings = cfg.calendar_settings();
    assert_eq!(settings.view, ViewMode::Week);
    assert_eq!(
      settings.cursor_sync,
      CursorSync::FollowSelection
    );
  }

  #[test]
  fn out_of_range_hours_are_sanitized() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "calendar.hour_start".to_string(),
        "30".to_string()
      ),
      (
        "calendar.hour_end".to_string(),
        "banana".to_string()
      ),
      (
        "calendar.month_preview"
          .to_string(),
        "0".to_string()
      )
    ]);

    let settings = cfg.calendar_settings();
    assert_eq!(settings.hours.start(), 23);
    assert_eq!(settings.hours.end(), 23);
    assert_eq!(settings.month_preview, 2);
  }

  #[test]
  fn loads_rc_file_with_includes() {
    let temp = tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    let mut extra_file =
      fs::File::create(&extra)
        .expect("create include");
    writeln!(
      extra_file,
      "calendar.hour_end = 17"
    )
    .expect("write include");

    let main = temp.path().join("main.rc");
    let mut main_file =
      fs::File::create(&main)
        .expect("create rc");
    writeln!(
      main_file,
      "# front desk\ncalendar.hour_start = 7 # early clinic\ninclude extra.rc\ncolor = off"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&main))
      .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);

    let settings = cfg.calendar_settings();
    assert_eq!(settings.hours.start(), 7);
    assert_eq!(settings.hours.end(), 17);
    assert!(
      !cfg.color_enabled().expect("color")
    );
  }

  #[test]
  fn data_dir_prefers_override_then_config_key() {
    let temp = tempdir().expect("tempdir");
    let mut cfg = Config::default();
    assert!(cfg.get("data.location").is_none());

    let configured = temp.path().join("configured");
    cfg.apply_overrides([(
      "data.location".to_string(),
      configured.display().to_string()
    )]);
    assert_eq!(
      resolve_data_dir(&cfg, None)
        .expect("configured dir"),
      configured
    );
    assert!(configured.is_dir());

    let explicit = temp.path().join("explicit");
    assert_eq!(
      resolve_data_dir(&cfg, Some(&explicit))
        .expect("explicit dir"),
      explicit
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(&rc, "calendar.view month\n")
      .expect("write rc");
    assert!(Config::load(Some(&rc)).is_err());
  }
}
