use std::io::{self, IsTerminal, Write};

use chrono::Datelike;
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::appointment::Appointment;
use crate::calendar::{CalendarCell, CalendarGrid, HourRange, ViewMode};
use crate::config::Config;
use crate::patient::Patient;
use crate::summary::{DashboardSummary, PeriodStats};

const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    timezone: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, timezone: Tz) -> anyhow::Result<Self> {
        let color = cfg.color_enabled()? && io::stdout().is_terminal();
        Ok(Self { color, timezone })
    }

    pub fn plain(timezone: Tz) -> Self {
        Self {
            color: false,
            timezone,
        }
    }

    #[tracing::instrument(skip(self, grid))]
    pub fn print_calendar(&self, grid: &CalendarGrid, hours: HourRange) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_calendar(&mut out, grid, hours)
    }

    pub fn write_calendar<W: Write>(
        &self,
        mut out: W,
        grid: &CalendarGrid,
        hours: HourRange,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&grid.label, "1"))?;
        writeln!(out)?;

        match grid.view {
            ViewMode::Month => self.write_month(&mut out, grid)?,
            ViewMode::Week => self.write_week(&mut out, grid)?,
            ViewMode::Day => self.write_day(&mut out, grid)?,
        }

        if grid.outside_hours > 0 {
            writeln!(
                out,
                "{} appointment(s) outside {:02}:00-{:02}:59 not shown",
                grid.outside_hours,
                hours.start(),
                hours.end()
            )?;
        }
        if grid.unplaceable > 0 {
            writeln!(
                out,
                "{} appointment(s) without a valid time skipped",
                grid.unplaceable
            )?;
        }
        Ok(())
    }

    fn write_month<W: Write>(&self, out: &mut W, grid: &CalendarGrid) -> anyhow::Result<()> {
        let headers = WEEKDAY_LABELS.iter().map(|s| s.to_string()).collect();
        let rows: Vec<Vec<Vec<String>>> = grid
            .week_rows()
            .map(|week| {
                week.iter()
                    .map(|cell| {
                        let mut lines = vec![self.day_label(cell, cell.date.day().to_string())];
                        let preview = cell.preview(grid.month_preview);
                        for appointment in preview.shown {
                            lines.push(format!(
                                "{} {}",
                                self.time_of(appointment),
                                chip_name(appointment)
                            ));
                        }
                        if let Some(more) = preview.overflow_label() {
                            lines.push(self.paint(&more, "2"));
                        }
                        lines
                    })
                    .collect()
            })
            .collect();

        write_grid(out, headers, rows)
    }

    fn write_week<W: Write>(&self, out: &mut W, grid: &CalendarGrid) -> anyhow::Result<()> {
        let mut headers = vec![String::new()];
        headers.extend(grid.days.iter().map(|day| {
            let label = day.format("%a %-d").to_string();
            let today = grid
                .cells
                .iter()
                .any(|cell| cell.date == *day && cell.is_today);
            if today {
                self.paint(&format!("{label}*"), "1;33")
            } else {
                label
            }
        }));

        let rows: Vec<Vec<Vec<String>>> = grid
            .hours
            .iter()
            .map(|&hour| {
                let mut row = vec![vec![format!("{hour:02}:00")]];
                row.extend(grid.hour_row(hour).map(|cell| {
                    cell.appointments.iter().map(chip_name).collect::<Vec<_>>()
                }));
                row
            })
            .collect();

        write_grid(out, headers, rows)
    }

    fn write_day<W: Write>(&self, out: &mut W, grid: &CalendarGrid) -> anyhow::Result<()> {
        let headers = vec!["Hour".to_string(), "Appointments".to_string()];
        let rows: Vec<Vec<Vec<String>>> = grid
            .hours
            .iter()
            .map(|&hour| {
                let lines = grid
                    .hour_row(hour)
                    .flat_map(|cell| cell.appointments.iter())
                    .map(|appointment| {
                        format!(
                            "{} - {} ({} - {})",
                            chip_name(appointment),
                            appointment.title,
                            self.time_of(appointment),
                            appointment
                                .end(self.timezone)
                                .map(|end| end.format("%H:%M").to_string())
                                .unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>();
                vec![vec![format!("{hour:02}:00")], lines]
            })
            .collect();

        write_grid(out, headers, rows)
    }

    fn day_label(&self, cell: &CalendarCell, text: String) -> String {
        let text = if cell.is_selected {
            format!("[{text}]")
        } else {
            text
        };
        let text = if cell.is_today {
            format!("{text}*")
        } else {
            text
        };

        if cell.is_today {
            self.paint(&text, "1;33")
        } else if !cell.is_current_period {
            self.paint(&text, "2")
        } else {
            text
        }
    }

    fn time_of(&self, appointment: &Appointment) -> String {
        appointment
            .start(self.timezone)
            .map(|start| start.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string())
    }

    #[tracing::instrument(skip(self, appointments))]
    pub fn print_appointment_table(&self, appointments: &[Appointment]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_appointment_table(&mut out, appointments)
    }

    pub fn write_appointment_table<W: Write>(
        &self,
        out: W,
        appointments: &[Appointment],
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "When".to_string(),
            "Patient".to_string(),
            "Title".to_string(),
            "Status".to_string(),
        ];

        let rows = appointments
            .iter()
            .map(|appointment| {
                let when = appointment
                    .start(self.timezone)
                    .map(|start| start.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| self.paint("invalid", "31"));
                let status = match appointment.status.as_str() {
                    "cancelled" => self.paint("cancelled", "31"),
                    "completed" => self.paint("completed", "2"),
                    other => other.to_string(),
                };
                vec![
                    self.paint(&appointment.id, "33"),
                    when,
                    appointment.patient_name().to_string(),
                    appointment.title.clone(),
                    status,
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, patients))]
    pub fn print_patient_table(&self, patients: &[Patient]) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Email".to_string(),
            "Phone".to_string(),
        ];

        let rows = patients
            .iter()
            .map(|patient| {
                vec![
                    self.paint(&patient.id, "33"),
                    patient.name.clone(),
                    patient.email.clone().unwrap_or_default(),
                    patient.phone.clone().unwrap_or_default(),
                ]
            })
            .collect();

        write_table(io::stdout().lock(), headers, rows)
    }

    #[tracing::instrument(skip(self, summary))]
    pub fn print_summary(&self, summary: &DashboardSummary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_stats(&mut out, "Today", &summary.today)?;
        write_stats(&mut out, "This week", &summary.this_week)?;
        write_stats(&mut out, "Next month", &summary.next_month)?;
        writeln!(out)?;
        writeln!(out, "{}", self.paint("Upcoming", "1"))?;
        if summary.upcoming.is_empty() {
            writeln!(out, "No upcoming appointments")?;
        } else {
            self.write_appointment_table(&mut out, &summary.upcoming)?;
        }
        if summary.unplaceable > 0 {
            writeln!(
                out,
                "{} appointment(s) without a valid time not counted",
                summary.unplaceable
            )?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_stats<W: Write>(out: &mut W, label: &str, stats: &PeriodStats) -> anyhow::Result<()> {
    writeln!(
        out,
        "{label:<11} {:>3} total  {:>3} scheduled  {:>3} completed  {:>3} cancelled",
        stats.total(),
        stats.scheduled,
        stats.completed,
        stats.cancelled
    )?;
    Ok(())
}

fn chip_name(appointment: &Appointment) -> String {
    let name = appointment.patient_name();
    if name.is_empty() {
        appointment.title.clone()
    } else {
        name.to_string()
    }
}

fn visible_width(s: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(s).as_str())
}

fn write_table<W: Write>(
    writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let rows = rows
        .into_iter()
        .map(|row| row.into_iter().map(|cell| vec![cell]).collect())
        .collect();
    write_rows(writer, headers, rows, false)
}

/// Like `write_table`, but cells may span several lines and rows are
/// separated by rules.
fn write_grid<W: Write>(
    writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<Vec<String>>>,
) -> anyhow::Result<()> {
    write_rows(writer, headers, rows, true)
}

fn write_rows<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<Vec<String>>>,
    ruled: bool,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(visible_width(header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            for line in cell {
                widths[idx] = widths[idx].max(visible_width(line));
            }
        }
    }

    let write_line = |writer: &mut W, cells: Vec<&str>| -> anyhow::Result<()> {
        for (idx, cell) in cells.iter().enumerate() {
            let padding = widths[idx].saturating_sub(visible_width(cell));
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
        Ok(())
    };
    let write_rule = |writer: &mut W| -> anyhow::Result<()> {
        for width in &widths {
            write!(writer, "{:-<width$} ", "", width = *width)?;
        }
        writeln!(writer)?;
        Ok(())
    };

    write_line(&mut writer, headers.iter().map(String::as_str).collect())?;
    write_rule(&mut writer)?;

    for row in rows {
        let height = row.iter().map(Vec::len).max().unwrap_or(0).max(1);
        for line_idx in 0..height {
            let cells = (0..column_count)
                .map(|idx| {
                    row.get(idx)
                        .and_then(|cell| cell.get(line_idx))
                        .map(String::as_str)
                        .unwrap_or("")
                })
                .collect();
            write_line(&mut writer, cells)?;
        }
        if ruled {
            write_rule(&mut writer)?;
        }
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
