use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};

use super::binder::{
  AppointmentBinder,
  DayPreview
};
use super::{
  HourRange,
  ViewMode
};
use crate::appointment::Appointment;
use crate::datetime::{
  add_days,
  first_day_of_month,
  start_of_week
};

pub const MONTH_GRID_DAYS: usize = 42;
pub const WEEK_GRID_DAYS: usize = 7;

/// Six full Sunday-first weeks covering
/// the month of `reference`.
pub fn build_month_grid(
  reference: NaiveDate
) -> [NaiveDate; MONTH_GRID_DAYS] {
  let first = first_day_of_month(
    reference.year(),
    reference.month()
  );
  let grid_start = start_of_week(first);
  std::array::from_fn(|offset| {
    add_days(grid_start, offset as i64)
  })
}

/// Sunday through Saturday of the week
/// holding `reference`.
pub fn build_week_grid(
  reference: NaiveDate
) -> [NaiveDate; WEEK_GRID_DAYS] {
  let start = start_of_week(reference);
  std::array::from_fn(|offset| {
    add_days(start, offset as i64)
  })
}

pub fn build_day_grid(
  reference: NaiveDate
) -> [NaiveDate; 1] {
  [reference]
}

pub fn grid_days(
  view: ViewMode,
  reference: NaiveDate
) -> Vec<NaiveDate> {
  match view {
    | ViewMode::Month => {
      build_month_grid(reference).to_vec()
    }
    | ViewMode::Week => {
      build_week_grid(reference).to_vec()
    }
    | ViewMode::Day => {
      build_day_grid(reference).to_vec()
    }
  }
}

/// Month cells outside the framed month
/// are leading/trailing days; week and
/// day grids only hold framed days.
pub fn is_current_period(
  view: ViewMode,
  reference: NaiveDate,
  date: NaiveDate
) -> bool {
  match view {
    | ViewMode::Month => {
      date.year() == reference.year()
        && date.month()
          == reference.month()
    }
    | ViewMode::Week | ViewMode::Day => {
      true
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCell {
  pub date:              NaiveDate,
  /// Hour row for week/day views.
  pub hour:              Option<u32>,
  pub is_current_period: bool,
  pub is_today:          bool,
  pub is_selected:       bool,
  pub appointments:      Vec<Appointment>
}

impl CalendarCell {
  /// Moment a click on this cell seeds a
  /// new appointment with.
  pub fn slot_start(
    &self
  ) -> NaiveDateTime {
    let time = self
      .hour
      .and_then(|hour| {
        NaiveTime::from_hms_opt(hour, 0, 0)
      })
      .unwrap_or(NaiveTime::MIN);
    self.date.and_time(time)
  }

  pub fn preview(
    &self,
    limit: usize
  ) -> DayPreview<'_> {
    DayPreview::new(
      &self.appointments,
      limit
    )
  }
}

/// One render pass of the calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarGrid {
  pub view:          ViewMode,
  pub label:         String,
  pub days:          Vec<NaiveDate>,
  /// Empty for month view.
  pub hours:         Vec<u32>,
  /// Month: one per day. Week/day:
  /// row-major by hour, then day.
  pub cells:         Vec<CalendarCell>,
  pub month_preview: usize,
  pub unplaceable:   usize,
  pub outside_hours: usize
}

impl CalendarGrid {
  pub fn appointment_count(
    &self
  ) -> usize {
    self
      .cells
      .iter()
      .map(|cell| cell.appointments.len())
      .sum()
  }

  /// Appointments a click can reach in
  /// `cell`: the preview in month view,
  /// everything otherwise.
  pub fn clickable_appointments<'g>(
    &'g self,
    cell: &'g CalendarCell
  ) -> &'g [Appointment] {
    match self.view {
      | ViewMode::Month => {
        cell
          .preview(self.month_preview)
          .shown
      }
      | ViewMode::Week | ViewMode::Day => {
        &cell.appointments
      }
    }
  }

  /// Cells of one hour row (week/day).
  pub fn hour_row(
    &self,
    hour: u32
  ) -> impl Iterator<Item = &CalendarCell>
  {
    self
      .cells
      .iter()
      .filter(move |cell| {
        cell.hour == Some(hour)
      })
  }

  /// Cells of one week row (month).
  pub fn week_rows(
    &self
  ) -> impl Iterator<Item = &[CalendarCell]>
  {
    self.cells.chunks(WEEK_GRID_DAYS)
  }
}

pub(crate) struct GridInputs<'b, 'a> {
  pub view:          ViewMode,
  pub reference:     NaiveDate,
  pub selected:      NaiveDate,
  pub today:         NaiveDate,
  pub hours:         HourRange,
  pub month_preview: usize,
  pub label:         String,
  pub binder:        &'b AppointmentBinder<'a>
}

pub(crate) fn build_grid(
  inputs: GridInputs<'_, '_>
) -> CalendarGrid {
  let GridInputs {
    view,
    reference,
    selected,
    today,
    hours,
    month_preview,
    label,
    binder
  } = inputs;

  let days = grid_days(view, reference);
  let cell_for = |date: NaiveDate,
                  hour: Option<u32>,
                  bound: Vec<&Appointment>| {
    CalendarCell {
      date,
      hour,
      is_current_period:
        is_current_period(
          view, reference, date
        ),
      is_today: date == today,
      is_selected: date == selected,
      appointments: bound
        .into_iter()
        .cloned()
        .collect()
    }
  };

  let (cells, hour_rows, outside_hours) =
    match view {
      | ViewMode::Month => {
        let cells = days
          .iter()
          .map(|&date| {
            cell_for(
              date,
              None,
              binder.for_day(date)
            )
          })
          .collect::<Vec<_>>();
        (cells, Vec::new(), 0)
      }
      | ViewMode::Week | ViewMode::Day => {
        let mut cells = Vec::with_capacity(
          days.len() * hours.rows()
        );
        for hour in hours.hours() {
          for &date in &days {
            cells.push(cell_for(
              date,
              Some(hour),
              binder.for_hour(date, hour)
            ));
          }
        }
        let outside =
          binder.outside_hours(&days, hours);
        (
          cells,
          hours.hours().collect(),
          outside
        )
      }
    };

  CalendarGrid {
    view,
    label,
    days,
    hours: hour_rows,
    cells,
    month_preview,
    unplaceable: binder.unplaceable(),
    outside_hours
  }
}
