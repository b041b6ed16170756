//! Director and storage daemon status parsers

use super::{parse_line, Record};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Section markers printed by `status director` in API mode
const DIRECTOR_SECTIONS: [&str; 3] = ["header:", "running:", "terminated:"];

/// Section the console leaves unmarked after the header
const SCHEDULED_SECTION: &str = "scheduled";

/// Storage status records with this many keys or fewer are incomplete
const MIN_STORAGE_RECORD_KEYS: usize = 10;

/// Parsed `status director` output
///
/// Sections keep the order in which they first appear in the output and
/// serialize as a JSON object of section name to list of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectorStatus {
    sections: Vec<(String, Vec<Record>)>,
}

impl DirectorStatus {
    /// Records of a section, if the section appeared
    pub fn section(&self, name: &str) -> Option<&[Record]> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, records)| records.as_slice())
    }

    /// Section names in output order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(n, _)| n.as_str())
    }

    /// Whether no section appeared
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn contains(&self, name: &str) -> bool {
        self.sections.iter().any(|(n, _)| n == name)
    }

    fn records_mut(&mut self, name: &str) -> &mut Vec<Record> {
        let idx = match self.sections.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                self.sections.push((name.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx].1
    }
}

impl Serialize for DirectorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for (name, records) in &self.sections {
            map.serialize_entry(name, records)?;
        }
        map.end()
    }
}

/// Parse `status director` output captured in API mode.
///
/// A `key=value` line opening a section that has no records yet only
/// registers the section and is not stored. Existing clients rely on this
/// output shape.
pub fn director_status<S: AsRef<str>>(lines: &[S]) -> DirectorStatus {
    let mut status = DirectorStatus::default();
    let mut section: Option<String> = None;
    let mut pending = Record::new();

    for line in lines {
        let line = line.as_ref();

        if DIRECTOR_SECTIONS.contains(&line) {
            section = Some(line.trim_end_matches(':').to_string());
            continue;
        }

        if section.as_deref() == Some("header") && pending.is_empty() && line.is_empty() {
            section = Some(SCHEDULED_SECTION.to_string());
            continue;
        }

        let Some(name) = section.as_deref() else {
            continue;
        };

        match parse_line(line) {
            Some((key, value)) => {
                if !status.contains(name) {
                    status.records_mut(name);
                    continue;
                }
                pending.insert(key.to_string(), Value::String(value.to_string()));
            }
            None if !pending.is_empty() => {
                status.records_mut(name).push(std::mem::take(&mut pending));
            }
            None => {}
        }
    }

    status
}

/// Output type requested from `.status storage`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageStatusKind {
    /// Daemon header, a single record
    #[default]
    Header,
    /// Running jobs
    Running,
    /// Terminated jobs
    Terminated,
    /// Attached devices
    Devices,
}

impl StorageStatusKind {
    /// Console keyword for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Running => "running",
            Self::Terminated => "terminated",
            Self::Devices => "devices",
        }
    }
}

impl fmt::Display for StorageStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageStatusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header" => Ok(Self::Header),
            "running" => Ok(Self::Running),
            "terminated" => Ok(Self::Terminated),
            "devices" => Ok(Self::Devices),
            other => Err(format!("unknown storage status type: {}", other)),
        }
    }
}

/// Parsed `.status storage` output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StorageStatus {
    /// Last complete header record, if any
    Header(Option<Record>),
    /// Complete records of a list type
    List(Vec<Record>),
}

/// Parse `.status storage` output captured in API mode.
///
/// A blank line closes the pending record. Records with at most ten keys are
/// dropped as incomplete.
pub fn storage_status<S: AsRef<str>>(lines: &[S], kind: StorageStatusKind) -> StorageStatus {
    let mut records = Vec::new();
    let mut pending = Record::new();

    for line in lines {
        let line = line.as_ref();
        if line.is_empty() {
            if pending.len() > MIN_STORAGE_RECORD_KEYS {
                records.push(std::mem::take(&mut pending));
            } else {
                pending.clear();
            }
        } else if let Some((key, value)) = parse_line(line) {
            pending.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    match kind {
        StorageStatusKind::Header => StorageStatus::Header(records.pop()),
        _ => StorageStatus::List(records),
    }
}
