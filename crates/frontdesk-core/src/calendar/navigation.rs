use chrono::{
  Datelike,
  NaiveDate
};

use super::ViewMode;
use crate::datetime::{
  add_days,
  first_day_of_month,
  last_day_of_month,
  shift_months,
  start_of_week
};

/// The navigation position.
///
/// `anchor_day` is the day-of-month the
/// cursor had before month steps clamped
/// it, so that stepping back restores it
/// (Jan 31 -> Feb 29 -> Jan 31).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct Cursor {
  date:       NaiveDate,
  anchor_day: u32
}

impl Cursor {
  pub fn new(date: NaiveDate) -> Self {
    Self {
      date,
      anchor_day: date.day()
    }
  }

  pub fn date(&self) -> NaiveDate {
    self.date
  }

  /// Moves `step` units of `view`;
  /// negative steps go back.
  #[must_use]
  pub fn shifted(
    self,
    view: ViewMode,
    step: i64
  ) -> Self {
    match view {
      | ViewMode::Month => Self {
        date:       shift_months(
          self.date,
          step,
          self.anchor_day
        ),
        anchor_day: self.anchor_day
      },
      | ViewMode::Week => Self::new(
        add_days(
          self.date,
          step.saturating_mul(7)
        )
      ),
      | ViewMode::Day => Self::new(
        add_days(self.date, step)
      )
    }
  }
}

#[derive(Debug, Clone)]
pub struct NavigationController {
  cursor: Cursor,
  view:   ViewMode
}

impl NavigationController {
  pub fn new(
    view: ViewMode,
    start: NaiveDate
  ) -> Self {
    Self {
      cursor: Cursor::new(start),
      view
    }
  }

  pub fn view(&self) -> ViewMode {
    self.view
  }

  pub fn date(&self) -> NaiveDate {
    self.cursor.date()
  }

  pub fn set_view(
    &mut self,
    view: ViewMode
  ) {
    self.view = view;
  }

  pub fn next(&mut self) -> NaiveDate {
    self.step(1)
  }

  pub fn prev(&mut self) -> NaiveDate {
    self.step(-1)
  }

  pub fn step(
    &mut self,
    step: i64
  ) -> NaiveDate {
    let before = self.cursor.date();
    self.cursor =
      self.cursor.shifted(self.view, step);
    tracing::trace!(
      view = %self.view,
      step,
      from = %before,
      to = %self.cursor.date(),
      "calendar cursor moved"
    );
    self.cursor.date()
  }

  pub fn today(
    &mut self,
    today: NaiveDate
  ) -> NaiveDate {
    self.jump_to(today)
  }

  pub fn jump_to(
    &mut self,
    date: NaiveDate
  ) -> NaiveDate {
    self.cursor = Cursor::new(date);
    date
  }

  pub fn label(&self) -> String {
    period_label(
      self.view,
      self.cursor.date()
    )
  }
}

/// Heading for the framed period.
///
/// The week form prints the year once,
/// after the end date, even when the
/// start falls in the previous year.
pub fn period_label(
  view: ViewMode,
  focus: NaiveDate
) -> String {
  match view {
    | ViewMode::Month => {
      focus.format("%B %Y").to_string()
    }
    | ViewMode::Week => {
      let start = start_of_week(focus);
      let end = add_days(start, 6);
      format!(
        "{} - {}",
        start.format("%b %-d"),
        end.format("%b %-d, %Y")
      )
    }
    | ViewMode::Day => focus
      .format("%A, %B %-d, %Y")
      .to_string()
  }
}

/// First and last day of the framed
/// period, inclusive.
pub fn period_bounds(
  view: ViewMode,
  focus: NaiveDate
) -> (NaiveDate, NaiveDate) {
  match view {
    | ViewMode::Month => (
      first_day_of_month(
        focus.year(),
        focus.month()
      ),
      last_day_of_month(
        focus.year(),
        focus.month()
      )
    ),
    | ViewMode::Week => {
      let start = start_of_week(focus);
      (start, add_days(start, 6))
    }
    | ViewMode::Day => (focus, focus)
  }
}
