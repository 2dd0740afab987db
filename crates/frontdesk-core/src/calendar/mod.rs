//! Calendar component: grid construction,
//! appointment binding and navigation for
//! month, week and day views.

pub mod binder;
pub mod grid;
pub mod navigation;
pub mod view;

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use anyhow::anyhow;
use chrono_tz::Tz;

pub use binder::{
  AppointmentBinder,
  DayPreview
};
pub use grid::{
  CalendarCell,
  CalendarGrid,
  build_day_grid,
  build_month_grid,
  build_week_grid
};
pub use navigation::{
  Cursor,
  NavigationController,
  period_label
};
pub use view::{
  CalendarEvents,
  CalendarView,
  ClickOutcome,
  ClickTarget
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
pub enum ViewMode {
  Month,
  Week,
  Day
}

impl ViewMode {
  pub fn all() -> [Self; 3] {
    [Self::Month, Self::Week, Self::Day]
  }

  pub fn as_key(self) -> &'static str {
    match self {
      | Self::Month => "month",
      | Self::Week => "week",
      | Self::Day => "day"
    }
  }

  pub fn from_key(
    key: &str
  ) -> Option<Self> {
    match key
      .to_ascii_lowercase()
      .as_str()
    {
      | "month" => Some(Self::Month),
      | "week" => Some(Self::Week),
      | "day" => Some(Self::Day),
      | _ => None
    }
  }
}

impl fmt::Display for ViewMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_key())
  }
}

impl FromStr for ViewMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    Self::from_key(s.trim()).ok_or_else(
      || {
        anyhow!(
          "invalid view '{s}': use \
           month, week or day"
        )
      }
    )
  }
}

/// Inclusive hour rows shown by week and
/// day views.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct HourRange {
  start: u32,
  end:   u32
}

impl HourRange {
  pub const BUSINESS: HourRange =
    HourRange { start: 8, end: 19 };

  /// Clamps both ends to `0..=23` and
  /// raises `end` to `start` if needed.
  pub fn new(
    start: u32,
    end: u32
  ) -> Self {
    let start = start.min(23);
    let end = end.min(23).max(start);
    Self { start, end }
  }

  pub fn start(&self) -> u32 {
    self.start
  }

  pub fn end(&self) -> u32 {
    self.end
  }

  pub fn hours(
    &self
  ) -> RangeInclusive<u32> {
    self.start..=self.end
  }

  pub fn contains(
    &self,
    hour: u32
  ) -> bool {
    self.hours().contains(&hour)
  }

  pub fn rows(&self) -> usize {
    (self.end - self.start + 1) as usize
  }
}

impl Default for HourRange {
  fn default() -> Self {
    Self::BUSINESS
  }
}

/// Whether a change of the host's
/// selected date moves the cursor.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq,
)]
pub enum CursorSync {
  /// The cursor is seeded from the
  /// selection once and then only moves
  /// through navigation.
  #[default]
  Manual,
  FollowSelection
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarSettings {
  pub view:          ViewMode,
  pub hours:         HourRange,
  pub month_preview: usize,
  pub cursor_sync:   CursorSync,
  pub timezone:      Tz
}

impl Default for CalendarSettings {
  fn default() -> Self {
    Self {
      view:          ViewMode::Month,
      hours:         HourRange::BUSINESS,
      month_preview: 2,
      cursor_sync:   CursorSync::Manual,
      timezone:      chrono_tz::UTC
    }
  }
}
