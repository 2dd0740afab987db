use chrono::{
  NaiveDate,
  NaiveDateTime
};
use tracing::{
  debug,
  warn
};

use super::binder::AppointmentBinder;
use super::grid::{
  CalendarGrid,
  GridInputs,
  build_grid
};
use super::navigation::NavigationController;
use super::{
  CalendarSettings,
  CursorSync,
  ViewMode
};
use crate::appointment::Appointment;

/// Callbacks the host wires into the
/// calendar.
pub trait CalendarEvents {
  /// A cell's date became the selection.
  fn on_date_select(
    &mut self,
    date: NaiveDate
  );

  /// Request to start booking at `at`
  /// (midnight in month view, the hour
  /// row otherwise).
  fn on_date_click(
    &mut self,
    at: NaiveDateTime
  );

  fn on_appointment_click(
    &mut self,
    appointment: &Appointment
  );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
  /// Empty space of the cell at this
  /// index in `CalendarGrid::cells`.
  Cell(usize),
  /// An appointment chip inside a cell.
  Appointment {
    cell:           usize,
    appointment_id: String
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  DateClicked(NaiveDateTime),
  AppointmentOpened(String),
  Ignored
}

#[derive(Debug, Default)]
struct ClickEvent {
  propagation_stopped: bool
}

impl ClickEvent {
  fn stop_propagation(&mut self) {
    self.propagation_stopped = true;
  }
}

/// The calendar component. Owns only the
/// navigation cursor and the last known
/// selection; appointments are borrowed
/// per render.
#[derive(Debug, Clone)]
pub struct CalendarView {
  nav:      NavigationController,
  selected: NaiveDate,
  settings: CalendarSettings
}

impl CalendarView {
  pub fn mount(
    view: ViewMode,
    selected: NaiveDate,
    settings: CalendarSettings
  ) -> Self {
    debug!(
      %view,
      %selected,
      sync = ?settings.cursor_sync,
      "mounting calendar"
    );
    Self {
      nav: NavigationController::new(
        view, selected
      ),
      selected,
      settings
    }
  }

  pub fn view(&self) -> ViewMode {
    self.nav.view()
  }

  pub fn cursor(&self) -> NaiveDate {
    self.nav.date()
  }

  pub fn selected(&self) -> NaiveDate {
    self.selected
  }

  pub fn settings(
    &self
  ) -> &CalendarSettings {
    &self.settings
  }

  pub fn set_view(
    &mut self,
    view: ViewMode
  ) {
    self.nav.set_view(view);
  }

  /// Records a new host selection. The
  /// cursor follows only under
  /// `CursorSync::FollowSelection`.
  pub fn set_selected_date(
    &mut self,
    date: NaiveDate
  ) {
    self.selected = date;
    if self.settings.cursor_sync
      == CursorSync::FollowSelection
    {
      self.nav.jump_to(date);
    }
  }

  pub fn next(&mut self) -> NaiveDate {
    self.nav.next()
  }

  pub fn prev(&mut self) -> NaiveDate {
    self.nav.prev()
  }

  pub fn step(
    &mut self,
    step: i64
  ) -> NaiveDate {
    self.nav.step(step)
  }

  pub fn today(
    &mut self,
    today: NaiveDate
  ) -> NaiveDate {
    self.nav.today(today)
  }

  pub fn label(&self) -> String {
    self.nav.label()
  }

  #[tracing::instrument(
    skip(self, appointments),
    fields(view = %self.nav.view(), cursor = %self.nav.date())
  )]
  pub fn render(
    &self,
    appointments: &[Appointment],
    today: NaiveDate
  ) -> CalendarGrid {
    let binder = AppointmentBinder::new(
      appointments,
      self.settings.timezone
    );

    let grid = build_grid(GridInputs {
      view: self.nav.view(),
      reference: self.nav.date(),
      selected: self.selected,
      today,
      hours: self.settings.hours,
      month_preview: self
        .settings
        .month_preview,
      label: self.nav.label(),
      binder: &binder
    });

    if grid.unplaceable > 0 {
      warn!(
        unplaceable = grid.unplaceable,
        "skipped appointments without a usable time span"
      );
    }
    if grid.outside_hours > 0 {
      debug!(
        outside_hours = grid.outside_hours,
        first_hour = self.settings.hours.start(),
        last_hour = self.settings.hours.end(),
        "appointments fall outside the hour rows"
      );
    }
    debug!(
      cells = grid.cells.len(),
      bound = grid.appointment_count(),
      "calendar rendered"
    );
    grid
  }

  /// Dispatches a click. A chip handles
  /// the event first and stops it, so
  /// the enclosing cell never sees it.
  pub fn click(
    &self,
    grid: &CalendarGrid,
    target: &ClickTarget,
    events: &mut dyn CalendarEvents
  ) -> ClickOutcome {
    let cell_index = match target {
      | ClickTarget::Cell(index) => *index,
      | ClickTarget::Appointment {
        cell,
        ..
      } => *cell
    };
    let Some(cell) =
      grid.cells.get(cell_index)
    else {
      warn!(
        cell = cell_index,
        cells = grid.cells.len(),
        "click outside the grid"
      );
      return ClickOutcome::Ignored;
    };

    let mut event = ClickEvent::default();
    let mut outcome = ClickOutcome::Ignored;

    if let ClickTarget::Appointment {
      appointment_id,
      ..
    } = target
    {
      let Some(appointment) = grid
        .clickable_appointments(cell)
        .iter()
        .find(|appointment| {
          appointment.id == *appointment_id
        })
      else {
        warn!(
          cell = cell_index,
          appointment = %appointment_id,
          "no such appointment chip in cell"
        );
        return ClickOutcome::Ignored;
      };

      event.stop_propagation();
      events.on_appointment_click(
        appointment
      );
      outcome =
        ClickOutcome::AppointmentOpened(
          appointment.id.clone()
        );
    }

    if !event.propagation_stopped {
      let at = cell.slot_start();
      events.on_date_select(cell.date);
      events.on_date_click(at);
      outcome =
        ClickOutcome::DateClicked(at);
    }

    debug!(?outcome, "calendar click handled");
    outcome
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::appointment::tests::sample;

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

  #[derive(Default)]
  struct Recorder {
    selected: Vec<NaiveDate>,
    clicked:  Vec<NaiveDateTime>,
    opened:   Vec<String>
  }

  impl CalendarEvents for Recorder {
    fn on_date_select(
      &mut self,
      date: NaiveDate
    ) {
      self.selected.push(date);
    }

    fn on_date_click(
      &mut self,
      at: NaiveDateTime
    ) {
      self.clicked.push(at);
    }

    fn on_appointment_click(
      &mut self,
      appointment: &Appointment
    ) {
      self.opened.push(appointment.id.clone());
    }
  }

  fn abc() -> Vec<Appointment> {
    vec![
      sample(
        "A",
        "Ann",
        "2024-03-25T09:00",
        "2024-03-25T09:30"
      ),
      sample(
        "B",
        "Bob",
        "2024-03-25T14:00",
        "2024-03-25T14:30"
      ),
      sample(
        "C",
        "Cara",
        "2024-03-26T09:00",
        "2024-03-26T09:30"
      ),
    ]
  }

  fn cell_index(
    grid: &CalendarGrid,
    date: NaiveDate,
    hour: Option<u32>
  ) -> usize {
    grid
      .cells
      .iter()
      .position(|cell| {
        cell.date == date && cell.hour == hour
      })
      .expect("cell in grid")
  }

  #[test]
  fn month_render_flags_cells() {
    let view = CalendarView::mount(
      ViewMode::Month,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    let grid =
      view.render(&abc(), ymd(2024, 3, 26));

    assert_eq!(grid.cells.len(), 42);
    assert!(grid.hours.is_empty());
    assert_eq!(grid.label, "March 2024");
    assert_eq!(
      grid
        .cells
        .iter()
        .filter(|c| c.is_current_period)
        .count(),
      31
    );

    let monday = &grid.cells[cell_index(
      &grid,
      ymd(2024, 3, 25),
      None
    )];
    assert!(monday.is_selected);
    assert!(!monday.is_today);
    let ids: Vec<&str> = monday
      .appointments
      .iter()
      .map(|a| a.id.as_str())
      .collect();
    assert_eq!(ids, vec!["A", "B"]);

    let tuesday = &grid.cells[cell_index(
      &grid,
      ymd(2024, 3, 26),
      None
    )];
    assert!(tuesday.is_today);
    assert_eq!(tuesday.appointments.len(), 1);
  }

  #[test]
  fn week_and_day_render_hour_cells() {
    let mut view = CalendarView::mount(
      ViewMode::Week,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    let grid =
      view.render(&abc(), ymd(2024, 3, 25));
    assert_eq!(grid.days.len(), 7);
    assert_eq!(grid.hours.len(), 12);
    assert_eq!(grid.cells.len(), 84);

    let nine = &grid.cells[cell_index(
      &grid,
      ymd(2024, 3, 25),
      Some(9)
    )];
    assert_eq!(nine.appointments.len(), 1);
    assert_eq!(nine.appointments[0].id, "A");
    let two = &grid.cells[cell_index(
      &grid,
      ymd(2024, 3, 25),
      Some(14)
    )];
    assert_eq!(two.appointments[0].id, "B");
    assert_eq!(grid.hour_row(9).count(), 7);

    view.set_view(ViewMode::Day);
    let day =
      view.render(&abc(), ymd(2024, 3, 25));
    assert_eq!(day.days, vec![ymd(2024, 3, 25)]);
    assert_eq!(day.cells.len(), 12);
    assert_eq!(day.appointment_count(), 2);
  }

  #[test]
  fn week_render_reports_out_of_hours() {
    let mut appointments = abc();
    appointments.push(sample(
      "night",
      "Nia",
      "2024-03-27T21:00",
      "2024-03-27T21:30"
    ));
    let view = CalendarView::mount(
      ViewMode::Week,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    let grid =
      view.render(&appointments, ymd(2024, 3, 25));
    assert_eq!(grid.outside_hours, 1);
    assert_eq!(grid.appointment_count(), 3);
  }

  #[test]
  fn empty_collection_renders_valid_grid() {
    for mode in ViewMode::all() {
      let view = CalendarView::mount(
        mode,
        ymd(2024, 2, 10),
        CalendarSettings::default()
      );
      let grid =
        view.render(&[], ymd(2024, 2, 10));
      assert_eq!(grid.appointment_count(), 0);
      assert_eq!(grid.unplaceable, 0);
      assert!(!grid.cells.is_empty());
    }
  }

  #[test]
  fn unparsable_start_is_excluded_everywhere() {
    let mut appointments = abc();
    appointments.push(sample(
      "broken",
      "Ann",
      "25/03/2024 09:00",
      "2024-03-25T09:30"
    ));

    for mode in ViewMode::all() {
      let view = CalendarView::mount(
        mode,
        ymd(2024, 3, 25),
        CalendarSettings::default()
      );
      let grid =
        view.render(&appointments, ymd(2024, 3, 25));
      assert_eq!(grid.unplaceable, 1);
      assert!(grid.cells.iter().all(|cell| {
        cell
          .appointments
          .iter()
          .all(|a| a.id != "broken")
      }));
    }
  }

  #[test]
  fn month_cell_previews_two_and_counts_rest() {
    let appointments: Vec<Appointment> =
      (0..5)
        .map(|n| {
          sample(
            &format!("a{n}"),
            "Ann",
            &format!("2024-03-25T{:02}:00", 16 - n),
            &format!("2024-03-25T{:02}:30", 16 - n)
          )
        })
        .collect();
    let view = CalendarView::mount(
      ViewMode::Month,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    let grid =
      view.render(&appointments, ymd(2024, 3, 25));
    let cell = &grid.cells[cell_index(
      &grid,
      ymd(2024, 3, 25),
      None
    )];

    let preview =
      cell.preview(grid.month_preview);
    let shown: Vec<&str> = preview
      .shown
      .iter()
      .map(|a| a.id.as_str())
      .collect();
    assert_eq!(shown, vec!["a4", "a3"]);
    assert_eq!(
      preview.overflow_label().as_deref(),
      Some("+3 more")
    );
  }

  #[test]
  fn chip_click_does_not_reach_cell() {
    let view = CalendarView::mount(
      ViewMode::Month,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    let grid =
      view.render(&abc(), ymd(2024, 3, 25));
    let index = cell_index(
      &grid,
      ymd(2024, 3, 25),
      None
    );

    let mut recorder = Recorder::default();
    let outcome = view.click(
      &grid,
      &ClickTarget::Appointment {
        cell:           index,
        appointment_id: "B".to_string()
      },
      &mut recorder
    );

    assert_eq!(
      outcome,
      ClickOutcome::AppointmentOpened(
        "B".to_string()
      )
    );
    assert_eq!(recorder.opened, vec!["B"]);
    assert!(recorder.selected.is_empty());
    assert!(recorder.clicked.is_empty());
  }

  #[test]
  fn cell_click_selects_and_requests_booking() {
    let view = CalendarView::mount(
      ViewMode::Week,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    let grid =
      view.render(&abc(), ymd(2024, 3, 25));
    let index = cell_index(
      &grid,
      ymd(2024, 3, 27),
      Some(15)
    );

    let mut recorder = Recorder::default();
    let outcome = view.click(
      &grid,
      &ClickTarget::Cell(index),
      &mut recorder
    );

    let at = ymd(2024, 3, 27)
      .and_hms_opt(15, 0, 0)
      .expect("time");
    assert_eq!(outcome, ClickOutcome::DateClicked(at));
    assert_eq!(recorder.selected, vec![ymd(2024, 3, 27)]);
    assert_eq!(recorder.clicked, vec![at]);
    assert!(recorder.opened.is_empty());
  }

  #[test]
  fn hidden_or_unknown_chips_are_not_clickable() {
    let appointments: Vec<Appointment> =
      (0..3)
        .map(|n| {
          sample(
            &format!("a{n}"),
            "Ann",
            &format!("2024-03-25T{:02}:00", 9 + n),
            &format!("2024-03-25T{:02}:30", 9 + n)
          )
        })
        .collect();
    let view = CalendarView::mount(
      ViewMode::Month,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    let grid =
      view.render(&appointments, ymd(2024, 3, 25));
    let index = cell_index(
      &grid,
      ymd(2024, 3, 25),
      None
    );

    let mut recorder = Recorder::default();
    for id in ["a2", "nope"] {
      let outcome = view.click(
        &grid,
        &ClickTarget::Appointment {
          cell:           index,
          appointment_id: id.to_string()
        },
        &mut recorder
      );
      assert_eq!(outcome, ClickOutcome::Ignored);
    }
    assert_eq!(
      view.click(
        &grid,
        &ClickTarget::Cell(99),
        &mut recorder
      ),
      ClickOutcome::Ignored
    );
    assert!(recorder.opened.is_empty());
    assert!(recorder.clicked.is_empty());
  }

  #[test]
  fn manual_cursor_ignores_selection_changes() {
    let mut view = CalendarView::mount(
      ViewMode::Month,
      ymd(2024, 3, 25),
      CalendarSettings::default()
    );
    view.next();
    view.set_selected_date(ymd(2024, 7, 4));

    assert_eq!(view.cursor(), ymd(2024, 4, 25));
    assert_eq!(view.selected(), ymd(2024, 7, 4));
    assert_eq!(view.label(), "April 2024");
  }

  #[test]
  fn following_cursor_tracks_selection() {
    let settings = CalendarSettings {
      cursor_sync:
        CursorSync::FollowSelection,
      ..CalendarSettings::default()
    };
    let mut view = CalendarView::mount(
      ViewMode::Month,
      ymd(2024, 3, 25),
      settings
    );
    view.next();
    view.set_selected_date(ymd(2024, 7, 4));

    assert_eq!(view.cursor(), ymd(2024, 7, 4));
    assert_eq!(view.label(), "July 2024");
  }
}
