use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::appointment::PatientRef;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Patient {
    pub fn new(name: &str, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("patient name cannot be empty"));
        }

        let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: None,
            phone: None,
            notes: None,
            created_at: Some(stamp.clone()),
            updated_at: Some(stamp),
            extra: BTreeMap::new(),
        })
    }

    pub fn to_ref(&self) -> PatientRef {
        PatientRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_patient_trims_and_rejects_blank_names() {
        let now = Utc::now();
        let patient = Patient::new("  Emily Davis ", now).expect("valid patient");
        assert_eq!(patient.name, "Emily Davis");
        assert_eq!(patient.to_ref().id, patient.id);

        assert!(Patient::new("   ", now).is_err());
    }
}
