use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{BidsPrefix, SampleId, SubjectId};
use crate::error::CurateError;
use crate::fs_util;

/// One participant-level column beyond `participant_id`, with the
/// description that ends up in the `participants.json` data dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub subject: SubjectId,
    pub attributes: BTreeMap<String, String>,
}

/// Accumulated participant/sample rows. Keyed by subject id, so rows come out
/// sorted and a subject encountered through many files yields exactly one row.
#[derive(Debug, Default)]
pub struct Manifest {
    records: BTreeMap<SubjectId, SubjectRecord>,
    samples: BTreeSet<(SubjectId, SampleId)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, prefix: &BidsPrefix, fixed_attributes: &BTreeMap<String, String>) {
        let record = self
            .records
            .entry(prefix.subject.clone())
            .or_insert_with(|| SubjectRecord {
                subject: prefix.subject.clone(),
                attributes: BTreeMap::new(),
            });
        for (key, value) in fixed_attributes {
            record
                .attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if let Some(sample) = &prefix.sample {
            self.samples
                .insert((prefix.subject.clone(), sample.clone()));
        }
    }

    pub fn subject_count(&self) -> usize {
        self.records.len()
    }

    pub fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn subjects(&self) -> impl Iterator<Item = &SubjectId> {
        self.records.keys()
    }

    pub fn write_participants_tsv(
        &self,
        path: &Utf8Path,
        columns: &[ColumnSpec],
    ) -> Result<(), CurateError> {
        let mut out = String::from("participant_id");
        for column in columns {
            out.push('\t');
            out.push_str(&column.name);
        }
        out.push('\n');
        for record in self.records.values() {
            out.push_str(&record.subject.to_string());
            for column in columns {
                out.push('\t');
                out.push_str(record.attributes.get(&column.name).map_or("n/a", |v| v));
            }
            out.push('\n');
        }
        fs_util::write_bytes_atomic(path, out.as_bytes())
    }

    pub fn write_participants_json(
        &self,
        path: &Utf8Path,
        columns: &[ColumnSpec],
    ) -> Result<(), CurateError> {
        let mut dict = serde_json::Map::new();
        dict.insert(
            "participant_id".to_string(),
            serde_json::json!({"Description": "Unique participant ID"}),
        );
        for column in columns {
            dict.insert(
                column.name.clone(),
                serde_json::json!({"Description": column.description}),
            );
        }
        fs_util::write_json_pretty(path, &serde_json::Value::Object(dict))
    }

    pub fn write_samples_tsv(&self, path: &Utf8Path, sample_type: &str) -> Result<(), CurateError> {
        let mut out = String::from("sample_id\tparticipant_id\tsample_type\n");
        for (subject, sample) in &self.samples {
            out.push_str(&format!("{sample}\t{subject}\t{sample_type}\n"));
        }
        fs_util::write_bytes_atomic(path, out.as_bytes())
    }

    pub fn write_samples_json(&self, path: &Utf8Path) -> Result<(), CurateError> {
        let dict = serde_json::json!({
            "sample_id": {"Description": "Sample ID"},
            "participant_id": {
                "Description": "Participant ID from whom tissue samples have been acquired"
            },
            "sample_type": {
                "Description": "Type of sample from ENCODE Biosample Type (https://www.encodeproject.org/profiles/biosample_type)"
            }
        });
        fs_util::write_json_pretty(path, &dict)
    }
}

pub fn write_dataset_description(
    path: &Utf8Path,
    name: &str,
    bids_version: &str,
    dataset_type: &str,
    license: Option<&str>,
) -> Result<(), CurateError> {
    let mut dict = serde_json::Map::new();
    dict.insert("Name".to_string(), serde_json::json!(name));
    dict.insert("BIDSVersion".to_string(), serde_json::json!(bids_version));
    dict.insert("DatasetType".to_string(), serde_json::json!(dataset_type));
    if let Some(license) = license {
        dict.insert("License".to_string(), serde_json::json!(license));
    }
    fs_util::write_json_pretty(path, &serde_json::Value::Object(dict))
}

pub fn write_labels_description(
    path: &Utf8Path,
    name: &str,
    bids_version: &str,
    pipeline: &str,
) -> Result<(), CurateError> {
    let dict = serde_json::json!({
        "Name": format!("{name} labels"),
        "BIDSVersion": bids_version,
        "PipelineDescription": {"Name": pipeline}
    });
    fs_util::write_json_pretty(path, &dict)
}

pub fn write_readme(path: &Utf8Path, text: &str) -> Result<(), CurateError> {
    let mut content = text.trim_end().to_string();
    content.push('\n');
    fs_util::write_bytes_atomic(path, content.as_bytes())
}
