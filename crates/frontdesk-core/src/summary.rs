use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime
};
use chrono_tz::Tz;

use crate::appointment::{
  Appointment,
  AppointmentStatus
};
use crate::calendar::ViewMode;
use crate::calendar::navigation::period_bounds;
use crate::datetime::shift_months;

pub const UPCOMING_LIMIT: usize = 5;

/// Status counts for one framed period.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq,
)]
pub struct PeriodStats {
  pub scheduled: usize,
  pub completed: usize,
  pub cancelled: usize
}

impl PeriodStats {
  fn push(
    &mut self,
    status: AppointmentStatus
  ) {
    match status {
      | AppointmentStatus::Scheduled => {
        self.scheduled += 1
      }
      | AppointmentStatus::Completed => {
        self.completed += 1
      }
      | AppointmentStatus::Cancelled => {
        self.cancelled += 1
      }
    }
  }

  pub fn total(&self) -> usize {
    self.scheduled
      + self.completed
      + self.cancelled
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
  pub today:           PeriodStats,
  pub this_week:       PeriodStats,
  pub next_month:      PeriodStats,
  pub upcoming:        Vec<Appointment>,
  pub unplaceable:     usize
}

fn starts_within(
  appointment: &Appointment,
  timezone: Tz,
  (first, last): (NaiveDate, NaiveDate)
) -> Option<AppointmentStatus> {
  let day = appointment
    .span(timezone)?
    .0
    .date();
  (day >= first && day <= last)
    .then_some(appointment.status)
}

/// Status counts for the period `view`
/// frames around `focus`.
pub fn summarize_period(
  appointments: &[Appointment],
  view: ViewMode,
  focus: NaiveDate,
  timezone: Tz
) -> PeriodStats {
  let bounds = period_bounds(view, focus);
  let mut stats = PeriodStats::default();
  for status in
    appointments.iter().filter_map(|a| {
      starts_within(a, timezone, bounds)
    })
  {
    stats.push(status);
  }
  stats
}

/// Front-desk headline numbers relative to
/// `now` in the display zone.
#[tracing::instrument(skip(appointments))]
pub fn summarize_dashboard(
  appointments: &[Appointment],
  now: NaiveDateTime,
  timezone: Tz
) -> DashboardSummary {
  let today = now.date();
  let next_month_focus = shift_months(
    NaiveDate::from_ymd_opt(
      today.year(),
      today.month(),
      1
    )
    .unwrap_or(today),
    1,
    1
  );

  let mut upcoming = appointments
    .iter()
    .filter(|appointment| {
      appointment.status
        == AppointmentStatus::Scheduled
    })
    .filter_map(|appointment| {
      let (start, _) =
        appointment.span(timezone)?;
      (start > now)
        .then_some((start, appointment))
    })
    .collect::<Vec<_>>();
  upcoming.sort_by_key(|(start, _)| *start);

  let unplaceable = appointments
    .iter()
    .filter(|appointment| {
      appointment.span(timezone).is_none()
    })
    .count();

  let summary = DashboardSummary {
    today: summarize_period(
      appointments,
      ViewMode::Day,
      today,
      timezone
    ),
    this_week: summarize_period(
      appointments,
      ViewMode::Week,
      today,
      timezone
    ),
    next_month: summarize_period(
      appointments,
      ViewMode::Month,
      next_month_focus,
      timezone
    ),
    upcoming: upcoming
      .into_iter()
      .take(UPCOMING_LIMIT)
      .map(|(_, appointment)| {
        appointment.clone()
      })
      .collect(),
    unplaceable
  };

  tracing::debug!(
    today = summary.today.total(),
    week = summary.this_week.total(),
    next_month = summary.next_month.total(),
    upcoming = summary.upcoming.len(),
    "dashboard summarized"
  );
  summary
}
