use chrono::{
  NaiveDate,
  NaiveDateTime,
  Timelike
};
use chrono_tz::Tz;

use super::HourRange;
use crate::appointment::Appointment;

#[derive(Debug, Clone, Copy)]
struct Placed<'a> {
  start:       NaiveDateTime,
  appointment: &'a Appointment
}

/// Resolves an appointment collection
/// once and answers per-cell lookups.
///
/// Records whose start or end cannot be
/// read, or whose end is not after the
/// start, are kept out of every cell and
/// only counted.
#[derive(Debug, Clone)]
pub struct AppointmentBinder<'a> {
  placed:      Vec<Placed<'a>>,
  unplaceable: usize
}

impl<'a> AppointmentBinder<'a> {
  pub fn new(
    appointments: &'a [Appointment],
    timezone: Tz
  ) -> Self {
    let mut unplaceable = 0_usize;
    let mut placed = Vec::with_capacity(
      appointments.len()
    );

    for appointment in appointments {
      match appointment.span(timezone) {
        | Some((start, _)) => {
          placed.push(Placed {
            start,
            appointment
          })
        }
        | None => {
          unplaceable += 1;
          tracing::debug!(
            id = %appointment.id,
            start = ?appointment.start_time,
            end = ?appointment.end_time,
            "appointment has no usable time span"
          );
        }
      }
    }

    // Stable: equal starts keep
    // collection order.
    placed.sort_by_key(|entry| entry.start);

    Self {
      placed,
      unplaceable
    }
  }

  pub fn unplaceable(&self) -> usize {
    self.unplaceable
  }

  pub fn placed(&self) -> usize {
    self.placed.len()
  }

  /// Appointments starting on `date`,
  /// time of day ignored.
  pub fn for_day(
    &self,
    date: NaiveDate
  ) -> Vec<&'a Appointment> {
    self
      .placed
      .iter()
      .filter(|entry| {
        entry.start.date() == date
      })
      .map(|entry| entry.appointment)
      .collect()
  }

  /// Appointments starting on `date`
  /// within `hour`.
  pub fn for_hour(
    &self,
    date: NaiveDate,
    hour: u32
  ) -> Vec<&'a Appointment> {
    self
      .placed
      .iter()
      .filter(|entry| {
        entry.start.date() == date
          && entry.start.hour() == hour
      })
      .map(|entry| entry.appointment)
      .collect()
  }

  /// Appointments on `days` that start
  /// outside the hour rows.
  pub fn outside_hours(
    &self,
    days: &[NaiveDate],
    hours: HourRange
  ) -> usize {
    self
      .placed
      .iter()
      .filter(|entry| {
        days.contains(&entry.start.date())
          && !hours
            .contains(entry.start.hour())
      })
      .count()
  }
}

/// What a month cell shows: the leading
/// appointments and how many are hidden.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayPreview<'a> {
  pub shown:  &'a [Appointment],
  pub hidden: usize
}

impl<'a> DayPreview<'a> {
  pub fn new(
    appointments: &'a [Appointment],
    limit: usize
  ) -> Self {
    let shown_len =
      appointments.len().min(limit);
    Self {
      shown:  &appointments[..shown_len],
      hidden: appointments.len()
        - shown_len
    }
  }

  pub fn overflow_label(
    &self
  ) -> Option<String> {
    (self.hidden > 0).then(|| {
      format!("+{} more", self.hidden)
    })
  }
}
