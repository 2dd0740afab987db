use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::datetime::parse_timestamp;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            other => Err(anyhow!(
                "invalid status '{other}': must be one of scheduled, completed, cancelled"
            )),
        }
    }
}

/// Denormalized patient identity carried on an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub patient_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub start_time: Option<String>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub end_time: Option<String>,

    #[serde(default)]
    pub patient: Option<PatientRef>,

    #[serde(default, deserialize_with = "lenient_status")]
    pub status: AppointmentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Keeps a stored time whatever its JSON type. Non-string values are kept
/// as their JSON text, which never parses, so the record stays unplaceable
/// instead of failing the whole table.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(raw),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_status<'de, D>(deserializer: D) -> Result<AppointmentStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(AppointmentStatus::default()),
        Some(Value::String(raw)) => raw,
        Some(other) => other.to_string(),
    };
    Ok(raw.parse().unwrap_or_else(|_| {
        warn!(status = %raw, "unknown appointment status; treating as scheduled");
        AppointmentStatus::default()
    }))
}

/// Fields a host supplies when booking a new appointment.
#[derive(Debug, Clone)]
pub struct AppointmentDraft {
    pub title: String,
    pub description: Option<String>,
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub status: AppointmentStatus,
}

/// Partial edit; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl Appointment {
    pub fn new(
        draft: AppointmentDraft,
        patient: Option<PatientRef>,
        now: DateTime<Utc>,
        timezone: Tz,
    ) -> anyhow::Result<Self> {
        let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let appointment = Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            patient_id: draft.patient_id,
            doctor_id: draft.doctor_id,
            start_time: Some(draft.start_time),
            end_time: Some(draft.end_time),
            patient,
            status: draft.status,
            created_at: Some(stamp.clone()),
            updated_at: Some(stamp),
            extra: BTreeMap::new(),
        };
        appointment.validate(timezone)?;
        Ok(appointment)
    }

    /// Applies `patch` and re-validates. `patient` replaces the
    /// denormalized reference when the patient id changed.
    pub fn apply(
        &mut self,
        patch: AppointmentPatch,
        patient: Option<Option<PatientRef>>,
        now: DateTime<Utc>,
        timezone: Tz,
    ) -> anyhow::Result<()> {
        let mut next = self.clone();
        if let Some(title) = patch.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            next.description = Some(description);
        }
        if let Some(patient_id) = patch.patient_id {
            next.patient_id = patient_id;
        }
        if let Some(doctor_id) = patch.doctor_id {
            next.doctor_id = Some(doctor_id);
        }
        if let Some(start) = patch.start_time {
            next.start_time = Some(start);
        }
        if let Some(end) = patch.end_time {
            next.end_time = Some(end);
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(patient) = patient {
            next.patient = patient;
        }

        next.validate(timezone)
            .with_context(|| format!("invalid edit for appointment {}", self.id))?;
        next.updated_at = Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
        *self = next;
        Ok(())
    }

    pub fn validate(&self, timezone: Tz) -> anyhow::Result<()> {
        if self.title.is_empty() {
            return Err(anyhow!("appointment title cannot be empty"));
        }
        if self.patient_id.trim().is_empty() {
            return Err(anyhow!("appointment patient id cannot be empty"));
        }

        let start = self
            .start(timezone)
            .ok_or_else(|| anyhow!("invalid start time: {:?}", self.start_time))?;
        let end = self
            .end(timezone)
            .ok_or_else(|| anyhow!("invalid end time: {:?}", self.end_time))?;
        if end <= start {
            return Err(anyhow!("end time must be after start time"));
        }
        Ok(())
    }

    pub fn start(&self, timezone: Tz) -> Option<NaiveDateTime> {
        self.start_time
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, timezone))
    }

    pub fn end(&self, timezone: Tz) -> Option<NaiveDateTime> {
        self.end_time
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, timezone))
    }

    /// Start and end when both parse and `start < end`.
    pub fn span(&self, timezone: Tz) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = self.start(timezone)?;
        let end = self.end(timezone)?;
        (start < end).then_some((start, end))
    }

    pub fn patient_name(&self) -> &str {
        self.patient
            .as_ref()
            .map(|patient| patient.name.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Date,
    Patient,
    Status,
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(SortKey::Date),
            "patient" => Ok(SortKey::Patient),
            "status" => Ok(SortKey::Status),
            other => Err(anyhow!("invalid sort key '{other}': use date, patient or status")),
        }
    }
}

/// Search, status and date-range filtering for appointment listings.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub patient_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub sort: SortKey,
}

impl ListQuery {
    pub fn matches(&self, appointment: &Appointment, timezone: Tz) -> bool {
        if let Some(term) = self.search.as_deref() {
            let term = term.to_lowercase();
            let in_name = appointment.patient_name().to_lowercase().contains(&term);
            let in_title = appointment.title.to_lowercase().contains(&term);
            if !in_name && !in_title {
                return false;
            }
        }

        if let Some(status) = self.status
            && appointment.status != status
        {
            return false;
        }

        if let Some(patient_id) = self.patient_id.as_deref()
            && appointment.patient_id != patient_id
        {
            return false;
        }

        if self.from.is_some() || self.to.is_some() {
            let Some(start) = appointment.start(timezone) else {
                return false;
            };
            let day = start.date();
            if self.from.is_some_and(|from| day < from) || self.to.is_some_and(|to| day > to) {
                return false;
            }
        }

        true
    }

    pub fn apply(&self, appointments: Vec<Appointment>, timezone: Tz) -> Vec<Appointment> {
        let mut out: Vec<Appointment> = appointments
            .into_iter()
            .filter(|appointment| self.matches(appointment, timezone))
            .collect();

        match self.sort {
            SortKey::Date => out.sort_by(|a, b| compare_start(a, b, timezone)),
            SortKey::Patient => out.sort_by(|a, b| a.patient_name().cmp(b.patient_name())),
            SortKey::Status => out.sort_by(|a, b| a.status.as_str().cmp(b.status.as_str())),
        }
        out
    }
}

/// Orders by start time; unparsable starts sort last.
fn compare_start(a: &Appointment, b: &Appointment, timezone: Tz) -> Ordering {
    match (a.start(timezone), b.start(timezone)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
