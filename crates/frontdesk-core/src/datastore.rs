use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::appointment::Appointment;
use crate::patient::Patient;

/// A row type persisted in its own table file.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const TABLE: &'static str;

    fn record_id(&self) -> &str;
}

impl Record for Appointment {
    const TABLE: &'static str = "appointments";

    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Record for Patient {
    const TABLE: &'static str = "patients";

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Read access to the appointment collection a calendar renders.
pub trait AppointmentSource {
    fn appointments(&self) -> anyhow::Result<Vec<Appointment>>;
}

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub replaced: usize,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let store = Self { data_dir };
        for table in [Appointment::TABLE, Patient::TABLE] {
            let path = store.table_path(table);
            if !path.exists() {
                fs::write(&path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(data_dir = %store.data_dir.display(), "opened datastore");
        Ok(store)
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.data"))
    }

    #[tracing::instrument(skip(self), fields(table = T::TABLE))]
    pub fn load<T: Record>(&self) -> anyhow::Result<Vec<T>> {
        load_jsonl(&self.table_path(T::TABLE))
            .with_context(|| format!("failed to load {}.data", T::TABLE))
    }

    #[tracing::instrument(skip(self, records), fields(table = T::TABLE))]
    pub fn save<T: Record>(&self, records: &[T]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.table_path(T::TABLE), records)
            .with_context(|| format!("failed to save {}.data", T::TABLE))
    }

    #[tracing::instrument(skip(self, filter), fields(table = T::TABLE))]
    pub fn query<T, F>(&self, filter: F) -> anyhow::Result<Vec<T>>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        let rows: Vec<T> = self.load::<T>()?.into_iter().filter(|row| filter(row)).collect();
        debug!(count = rows.len(), "query matched rows");
        Ok(rows)
    }

    pub fn get<T: Record>(&self, id: &str) -> anyhow::Result<Option<T>> {
        Ok(self
            .load::<T>()?
            .into_iter()
            .find(|row| row.record_id() == id))
    }

    #[tracing::instrument(skip(self, record), fields(table = T::TABLE, id = record.record_id()))]
    pub fn insert<T: Record>(&self, record: T) -> anyhow::Result<()> {
        let mut rows = self.load::<T>()?;
        if rows.iter().any(|row| row.record_id() == record.record_id()) {
            return Err(anyhow!(
                "{} already contains id {}",
                T::TABLE,
                record.record_id()
            ));
        }
        rows.push(record);
        self.save(&rows)
    }

    #[tracing::instrument(skip(self, record), fields(table = T::TABLE, id = record.record_id()))]
    pub fn update<T: Record>(&self, record: T) -> anyhow::Result<()> {
        let mut rows = self.load::<T>()?;
        let slot = rows
            .iter_mut()
            .find(|row| row.record_id() == record.record_id())
            .ok_or_else(|| anyhow!("{} has no id {}", T::TABLE, record.record_id()))?;
        *slot = record;
        self.save(&rows)
    }

    #[tracing::instrument(skip(self), fields(table = T::TABLE))]
    pub fn delete<T: Record>(&self, id: &str) -> anyhow::Result<bool> {
        let rows = self.load::<T>()?;
        let before = rows.len();
        let kept: Vec<T> = rows.into_iter().filter(|row| row.record_id() != id).collect();
        if kept.len() == before {
            return Ok(false);
        }
        self.save(&kept)?;
        info!(id, "deleted record");
        Ok(true)
    }

    /// Upserts by id: matching rows are replaced in place, the rest appended
    /// in input order.
    #[tracing::instrument(skip(self, incoming), fields(table = T::TABLE))]
    pub fn merge<T: Record>(&self, incoming: Vec<T>) -> anyhow::Result<MergeReport> {
        let mut rows = self.load::<T>()?;
        let mut report = MergeReport::default();

        for record in incoming {
            match rows
                .iter_mut()
                .find(|row| row.record_id() == record.record_id())
            {
                Some(slot) => {
                    *slot = record;
                    report.replaced += 1;
                }
                None => {
                    rows.push(record);
                    report.inserted += 1;
                }
            }
        }

        self.save(&rows)?;
        info!(
            inserted = report.inserted,
            replaced = report.replaced,
            "merged records"
        );
        Ok(report)
    }
}

impl AppointmentSource for DataStore {
    fn appointments(&self) -> anyhow::Result<Vec<Appointment>> {
        self.load::<Appointment>()
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::appointment::tests::sample;

    #[test]
    fn malformed_times_do_not_fail_the_table() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        store
            .insert(sample("ok", "Ann", "2024-03-25T09:00", "2024-03-25T09:30"))
            .expect("insert");

        let path = store.table_path(Appointment::TABLE);
        let mut text = fs::read_to_string(&path).expect("read table");
        text.push_str(
            r#"{"id":"bad","title":"Epoch","patientId":"p","startTime":1711357200000,"endTime":"2024-03-25T10:00","status":"no-show"}"#,
        );
        text.push('\n');
        fs::write(&path, text).expect("write table");

        let rows = store.appointments().expect("load");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].span(chrono_tz::UTC).is_some());
        assert!(rows[1].span(chrono_tz::UTC).is_none());

        store
            .insert(sample("next", "Bob", "2024-03-26T09:00", "2024-03-26T09:30"))
            .expect("insert after bad row");
        assert_eq!(store.load::<Appointment>().expect("reload").len(), 3);
    }

    #[test]
    fn crud_round_trip() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");

        let first = sample("a", "Ann", "2024-03-25T09:00", "2024-03-25T09:30");
        let second = sample("b", "Bob", "2024-03-26T09:00", "2024-03-26T09:30");
        store.insert(first.clone()).expect("insert first");
        store.insert(second).expect("insert second");
        assert!(store.insert(first.clone()).is_err());

        let bobs = store
            .query::<Appointment, _>(|row| row.patient_name() == "Bob")
            .expect("query");
        assert_eq!(bobs.len(), 1);

        let mut edited = first;
        edited.title = "Follow-up".to_string();
        store.update(edited).expect("update");
        let fetched = store.get::<Appointment>("a").expect("get").expect("present");
        assert_eq!(fetched.title, "Follow-up");

        assert!(store.delete::<Appointment>("a").expect("delete"));
        assert!(!store.delete::<Appointment>("a").expect("second delete"));
        assert_eq!(store.appointments().expect("load").len(), 1);
    }

    #[test]
    fn update_of_unknown_id_fails() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let ghost = sample("ghost", "Ann", "2024-03-25T09:00", "2024-03-25T09:30");
        assert!(store.update(ghost).is_err());
    }

    #[test]
    fn merge_replaces_matching_ids() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        store
            .insert(sample("a", "Ann", "2024-03-25T09:00", "2024-03-25T09:30"))
            .expect("insert");

        let mut replacement = sample("a", "Ann", "2024-03-25T10:00", "2024-03-25T10:30");
        replacement.title = "Moved".to_string();
        let report = store
            .merge(vec![
                replacement,
                sample("c", "Cara", "2024-03-27T09:00", "2024-03-27T09:30"),
            ])
            .expect("merge");

        assert_eq!(report, MergeReport { inserted: 1, replaced: 1 });
        let rows = store.load::<Appointment>().expect("load");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Moved");
    }

    #[test]
    fn patients_live_in_their_own_table() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let patient = Patient::new("Michael Brown", chrono::Utc::now()).expect("patient");
        store.insert(patient.clone()).expect("insert patient");

        assert!(store.table_path("patients").exists());
        assert_eq!(store.load::<Patient>().expect("load").len(), 1);
        assert!(store.load::<Appointment>().expect("load").is_empty());
    }
}
