use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A manufacturer as discovered on the catalog page. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManufacturerRecord {
    pub name: String,
    /// Page link exactly as listed; may be relative to the catalog site.
    pub source_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoImageRef {
    #[serde(rename = "source")]
    pub source_url: String,
    #[serde(rename = "path")]
    pub local_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoRecord {
    pub name: String,
    pub slug: String,
    pub image: LogoImageRef,
}

/// Logo records sorted by name, one per name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    records: Vec<LogoRecord>,
}

impl Manifest {
    /// Collapse records by name (last one wins) and sort them.
    pub fn from_records(records: impl IntoIterator<Item = LogoRecord>) -> Self {
        let by_name: BTreeMap<String, LogoRecord> = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        Self {
            records: by_name.into_values().collect(),
        }
    }

    pub fn records(&self) -> &[LogoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.name.as_str())
    }
}
