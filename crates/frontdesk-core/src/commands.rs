use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::appointment::{
    Appointment, AppointmentDraft, AppointmentPatch, ListQuery, PatientRef,
};
use crate::calendar::{
    CalendarEvents, CalendarGrid, CalendarSettings, CalendarView, ClickOutcome, ClickTarget,
    ViewMode,
};
use crate::cli::{AddArgs, BrowseArgs, Command, EditArgs, ListArgs, PatientAddArgs, ShowArgs};
use crate::datastore::{AppointmentSource, DataStore};
use crate::datetime::{now_in_timezone, parse_date_arg, today_in_timezone};
use crate::patient::Patient;
use crate::render::Renderer;
use crate::summary::summarize_dashboard;

#[instrument(skip(store, renderer, settings, command))]
pub fn dispatch(
    store: &DataStore,
    renderer: &Renderer,
    settings: CalendarSettings,
    command: Command,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Show(args) => cmd_show(store, renderer, settings, args),
        Command::Browse(args) => cmd_browse(store, renderer, settings, args),
        Command::Add(args) => cmd_add(store, settings, args),
        Command::Edit(args) => cmd_edit(store, settings, args),
        Command::Delete { id } => cmd_delete(store, &id),
        Command::List(args) => cmd_list(store, renderer, settings, args),
        Command::PatientAdd(args) => cmd_patient_add(store, args),
        Command::Patients => cmd_patients(store, renderer),
        Command::Export { output } => cmd_export(store, output.as_deref()),
        Command::Import { file } => cmd_import(store, settings, &file),
        Command::Summary => cmd_summary(store, renderer, settings),
    }
}

fn mount_calendar(
    settings: CalendarSettings,
    view: Option<ViewMode>,
    date: Option<&str>,
    today: NaiveDate,
) -> anyhow::Result<CalendarView> {
    let selected = match date {
        Some(raw) => parse_date_arg(raw, today)?,
        None => today,
    };
    Ok(CalendarView::mount(
        view.unwrap_or(settings.view),
        selected,
        settings,
    ))
}

#[instrument(skip(store, renderer, settings))]
fn cmd_show(
    store: &DataStore,
    renderer: &Renderer,
    settings: CalendarSettings,
    args: ShowArgs,
) -> anyhow::Result<()> {
    info!("command show");

    let today = today_in_timezone(settings.timezone);
    let mut calendar = mount_calendar(settings, args.view, args.date.as_deref(), today)?;
    if args.step != 0 {
        calendar.step(args.step);
    }

    let appointments = store.appointments()?;
    let grid = calendar.render(&appointments, today);
    renderer.print_calendar(&grid, settings.hours)
}

#[instrument(skip(store, renderer, settings))]
fn cmd_browse(
    store: &DataStore,
    renderer: &Renderer,
    settings: CalendarSettings,
    args: BrowseArgs,
) -> anyhow::Result<()> {
    info!("command browse");

    let today = today_in_timezone(settings.timezone);
    let calendar = mount_calendar(settings, args.view, args.date.as_deref(), today)?;
    let appointments = store.appointments()?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    browse_loop(
        stdin.lock(),
        stdout.lock(),
        calendar,
        &appointments,
        renderer,
        today,
    )
}

/// Collects what the calendar reported during one click so the loop can
/// apply the selection and echo the rest.
#[derive(Debug, Default)]
struct BrowseHost {
    selected: Option<NaiveDate>,
    messages: Vec<String>,
}

impl CalendarEvents for BrowseHost {
    fn on_date_select(&mut self, date: NaiveDate) {
        self.selected = Some(date);
        self.messages.push(format!("selected {date}"));
    }

    fn on_date_click(&mut self, at: NaiveDateTime) {
        self.messages.push(format!(
            "book at {}: frontdesk add --start {} --end ... --patient ... --title ...",
            at.format("%Y-%m-%d %H:%M"),
            at.format("%Y-%m-%dT%H:%M")
        ));
    }

    fn on_appointment_click(&mut self, appointment: &Appointment) {
        self.messages.push(format!(
            "appointment {}: {} with {} ({})",
            appointment.id,
            appointment.title,
            appointment.patient_name(),
            appointment.status.as_str()
        ));
    }
}

const BROWSE_HELP: &str = "commands: n, p, t, month, week, day, select DATE, cells, \
                           click INDEX, chip INDEX ID, q";

pub(crate) fn browse_loop<R: BufRead, W: Write>(
    input: R,
    mut out: W,
    mut calendar: CalendarView,
    appointments: &[Appointment],
    renderer: &Renderer,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let hours = calendar.settings().hours;
    let mut grid = calendar.render(appointments, today);
    renderer.write_calendar(&mut out, &grid, hours)?;
    writeln!(out, "{BROWSE_HELP}")?;

    for line in input.lines() {
        let line = line.context("failed reading stdin")?;
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();
        debug!(command = word, args = ?rest, "browse input");

        let redraw = match (word, rest.as_slice()) {
            ("q" | "quit", _) => break,
            ("n" | "next", _) => {
                calendar.next();
                true
            }
            ("p" | "prev", _) => {
                calendar.prev();
                true
            }
            ("t" | "today", _) => {
                calendar.today(today);
                true
            }
            ("month" | "week" | "day", _) => {
                calendar.set_view(word.parse()?);
                true
            }
            ("select", [raw]) => match parse_date_arg(raw, today) {
                Ok(date) => {
                    calendar.set_selected_date(date);
                    true
                }
                Err(err) => {
                    writeln!(out, "{err}")?;
                    false
                }
            },
            ("cells", _) => {
                write_cell_index(&mut out, &grid)?;
                false
            }
            ("click", [index]) => {
                let Ok(index) = index.parse::<usize>() else {
                    writeln!(out, "invalid cell index: {index}")?;
                    continue;
                };
                click(&mut out, &mut calendar, &grid, ClickTarget::Cell(index))?
            }
            ("chip", [index, id]) => {
                let Ok(index) = index.parse::<usize>() else {
                    writeln!(out, "invalid cell index: {index}")?;
                    continue;
                };
                let target = ClickTarget::Appointment {
                    cell: index,
                    appointment_id: id.to_string(),
                };
                click(&mut out, &mut calendar, &grid, target)?
            }
            _ => {
                writeln!(out, "{BROWSE_HELP}")?;
                false
            }
        };

        if redraw {
            grid = calendar.render(appointments, today);
            writeln!(out)?;
            renderer.write_calendar(&mut out, &grid, hours)?;
        }
    }

    Ok(())
}

fn click<W: Write>(
    out: &mut W,
    calendar: &mut CalendarView,
    grid: &CalendarGrid,
    target: ClickTarget,
) -> anyhow::Result<bool> {
    let mut host = BrowseHost::default();
    let outcome = calendar.click(grid, &target, &mut host);
    for message in &host.messages {
        writeln!(out, "{message}")?;
    }
    if outcome == ClickOutcome::Ignored {
        writeln!(out, "nothing to click there")?;
    }

    match host.selected {
        Some(date) if date != calendar.selected() => {
            calendar.set_selected_date(date);
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn write_cell_index<W: Write>(out: &mut W, grid: &CalendarGrid) -> anyhow::Result<()> {
    for (index, cell) in grid.cells.iter().enumerate() {
        if cell.appointments.is_empty() {
            continue;
        }
        let slot = match cell.hour {
            Some(hour) => format!("{} {hour:02}:00", cell.date),
            None => cell.date.to_string(),
        };
        let ids: Vec<&str> = grid
            .clickable_appointments(cell)
            .iter()
            .map(|appointment| appointment.id.as_str())
            .collect();
        writeln!(out, "{index:>3}  {slot}  {}", ids.join(" "))?;
    }
    Ok(())
}

fn lookup_patient(store: &DataStore, patient_id: &str) -> anyhow::Result<Option<PatientRef>> {
    let patient = store.get::<Patient>(patient_id)?;
    if patient.is_none() {
        warn!(patient_id, "unknown patient id; storing appointment without a name");
    }
    Ok(patient.map(|patient| patient.to_ref()))
}

#[instrument(skip(store, settings))]
fn cmd_add(store: &DataStore, settings: CalendarSettings, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let patient = lookup_patient(store, &args.patient)?;
    let draft = AppointmentDraft {
        title: args.title,
        description: args.description,
        patient_id: args.patient,
        doctor_id: args.doctor,
        start_time: args.start,
        end_time: args.end,
        status: args.status.unwrap_or_default(),
    };

    let appointment = Appointment::new(draft, patient, Utc::now(), settings.timezone)?;
    let id = appointment.id.clone();
    store.insert(appointment)?;

    println!("Created appointment {id}.");
    Ok(())
}

#[instrument(skip(store, settings))]
fn cmd_edit(store: &DataStore, settings: CalendarSettings, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");

    let mut appointment = store
        .get::<Appointment>(&args.id)?
        .ok_or_else(|| anyhow!("no appointment with id {}", args.id))?;

    let patient = match args.patient.as_deref() {
        Some(patient_id) if patient_id != appointment.patient_id => {
            Some(lookup_patient(store, patient_id)?)
        }
        _ => None,
    };

    let patch = AppointmentPatch {
        title: args.title,
        description: args.description,
        patient_id: args.patient,
        doctor_id: args.doctor,
        start_time: args.start,
        end_time: args.end,
        status: args.status,
    };
    appointment.apply(patch, patient, Utc::now(), settings.timezone)?;
    store.update(appointment)?;

    println!("Modified appointment {}.", args.id);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_delete(store: &DataStore, id: &str) -> anyhow::Result<()> {
    info!("command delete");

    if !store.delete::<Appointment>(id)? {
        return Err(anyhow!("no appointment with id {id}"));
    }

    println!("Deleted appointment {id}.");
    Ok(())
}

#[instrument(skip(store, renderer, settings))]
fn cmd_list(
    store: &DataStore,
    renderer: &Renderer,
    settings: CalendarSettings,
    args: ListArgs,
) -> anyhow::Result<()> {
    info!("command list");

    let today = today_in_timezone(settings.timezone);
    let query = ListQuery {
        search: args.search,
        status: args.status,
        patient_id: args.patient,
        from: args
            .from
            .as_deref()
            .map(|raw| parse_date_arg(raw, today))
            .transpose()?,
        to: args
            .to
            .as_deref()
            .map(|raw| parse_date_arg(raw, today))
            .transpose()?,
        sort: args.sort,
    };

    let rows = query.apply(store.appointments()?, settings.timezone);
    debug!(count = rows.len(), "filtered appointments");
    renderer.print_appointment_table(&rows)
}

#[instrument(skip(store))]
fn cmd_patient_add(store: &DataStore, args: PatientAddArgs) -> anyhow::Result<()> {
    info!("command patient-add");

    let mut patient = Patient::new(&args.name, Utc::now())?;
    patient.email = args.email;
    patient.phone = args.phone;
    patient.notes = args.notes;
    let id = patient.id.clone();
    store.insert(patient)?;

    println!("Created patient {id}.");
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_patients(store: &DataStore, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command patients");

    let mut patients = store.load::<Patient>()?;
    patients.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    renderer.print_patient_table(&patients)
}

#[instrument(skip(store))]
fn cmd_export(store: &DataStore, output: Option<&Path>) -> anyhow::Result<()> {
    info!("command export");

    let rows = store.appointments()?;
    let out = serde_json::to_string_pretty(&rows)?;
    match output {
        Some(path) => {
            fs::write(path, format!("{out}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported {} appointment(s).", rows.len());
        }
        None => println!("{out}"),
    }
    Ok(())
}

#[instrument(skip(store, settings))]
fn cmd_import(store: &DataStore, settings: CalendarSettings, file: &Path) -> anyhow::Result<()> {
    info!("command import");

    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let incoming: Vec<Appointment> = serde_json::from_str(trimmed)
        .with_context(|| format!("failed to parse {} as a JSON array", file.display()))?;
    for appointment in &incoming {
        if let Err(err) = appointment.validate(settings.timezone) {
            warn!(id = %appointment.id, error = %err, "imported appointment will not show on the calendar");
        }
    }

    let report = store.merge(incoming)?;
    println!(
        "Imported {} appointment(s): {} new, {} replaced.",
        report.inserted + report.replaced,
        report.inserted,
        report.replaced
    );
    Ok(())
}

#[instrument(skip(store, renderer, settings))]
fn cmd_summary(
    store: &DataStore,
    renderer: &Renderer,
    settings: CalendarSettings,
) -> anyhow::Result<()> {
    info!("command summary");

    let appointments = store.appointments()?;
    let summary = summarize_dashboard(
        &appointments,
        now_in_timezone(settings.timezone),
        settings.timezone,
    );
    renderer.print_summary(&summary)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::appointment::tests::sample;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn run_browse(view: ViewMode, script: &str) -> String {
        let appointments = vec![
            sample("A", "Ann", "2024-03-25T09:00", "2024-03-25T09:30"),
            sample("B", "Bob", "2024-03-25T14:00", "2024-03-25T14:30"),
        ];
        let today = ymd(2024, 3, 25);
        let calendar = CalendarView::mount(view, today, CalendarSettings::default());

        let mut out = Vec::new();
        browse_loop(
            Cursor::new(script.to_string()),
            &mut out,
            calendar,
            &appointments,
            &Renderer::plain(chrono_tz::UTC),
            today,
        )
        .expect("browse");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn browse_navigates_and_switches_views() {
        let text = run_browse(ViewMode::Month, "n\np\nweek\nday\nq\nn\n");
        assert!(text.contains("April 2024"));
        assert!(text.contains("Mar 24 - Mar 30, 2024"));
        assert!(text.contains("Monday, March 25, 2024"));
        assert!(!text.contains("Tuesday, March 26, 2024"));
    }

    #[test]
    fn browse_chip_click_opens_without_booking() {
        // Day view, 08:00 is cell 0 so 09:00 is cell 1.
        let text = run_browse(ViewMode::Day, "chip 1 A\nq\n");
        assert!(text.contains("appointment A: Visit A with Ann (scheduled)"));
        assert!(!text.contains("book at"));
    }

    #[test]
    fn browse_cell_click_selects_and_offers_booking() {
        let text = run_browse(ViewMode::Day, "click 3\nq\n");
        assert!(text.contains("selected 2024-03-25"));
        assert!(text.contains("book at 2024-03-25 11:00"));
    }

    #[test]
    fn browse_reports_bad_input() {
        let text = run_browse(ViewMode::Month, "click x\nchip 999 A\nselect nope\nwhat\n");
        assert!(text.contains("invalid cell index: x"));
        assert!(text.contains("nothing to click there"));
        assert!(text.contains("invalid date 'nope'"));
        assert!(text.matches("commands:").count() >= 2);
    }

    #[test]
    fn browse_lists_clickable_cells() {
        let text = run_browse(ViewMode::Month, "cells\nq\n");
        assert!(text.contains("2024-03-25  A B"));
    }
}
