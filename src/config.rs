use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::CurateError;
use crate::manifest::ColumnSpec;
use crate::materialize::StitchRule;
use crate::mpm::MpmSpec;
use crate::naming::{MatchMode, NamingRule, NamingTable, SubjectOverride};
use crate::resolver::ResolverSpec;
use crate::sidecar::SidecarTemplate;

/// Per-dataset curation parameters, loadable from JSON. Everything the
/// original per-dataset scripts hard-coded as module-level dictionaries
/// lives here instead, validated before the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    #[serde(default = "default_bids_version")]
    pub bids_version: String,
    #[serde(default = "default_dataset_type")]
    pub dataset_type: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub readme: String,
    #[serde(default = "default_match_mode")]
    pub match_mode: MatchMode,
    pub images: Vec<NamingRule>,
    #[serde(default)]
    pub derivatives: Vec<NamingRule>,
    #[serde(default)]
    pub subject_overrides: Vec<SubjectOverride>,
    pub resolver: ResolverSpec,
    #[serde(default = "empty_sidecar")]
    pub image_sidecar: SidecarTemplate,
    #[serde(default = "empty_sidecar")]
    pub derivative_sidecar: SidecarTemplate,
    #[serde(default)]
    pub participant_columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub fixed_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub samples: Option<SamplesSpec>,
    #[serde(default)]
    pub mpm: Option<MpmSpec>,
    #[serde(default)]
    pub stitch: Vec<StitchRule>,
    #[serde(default)]
    pub stitch_tool: Option<StitchTool>,
    #[serde(default)]
    pub labels_pipeline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesSpec {
    #[serde(default = "default_sample_type")]
    pub sample_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchTool {
    pub program: String,
    #[serde(default)]
    pub pre_args: Vec<String>,
    #[serde(default)]
    pub post_args: Vec<String>,
}

fn default_bids_version() -> String {
    "1.6.0".to_string()
}

fn default_dataset_type() -> String {
    "raw".to_string()
}

fn default_match_mode() -> MatchMode {
    MatchMode::Exact
}

fn default_sample_type() -> String {
    "tissue".to_string()
}

fn empty_sidecar() -> SidecarTemplate {
    SidecarTemplate::Empty
}

/// Validated form of [`DatasetConfig`] handed to the curator.
#[derive(Debug, Clone)]
pub struct ResolvedDataset {
    pub name: String,
    pub bids_version: String,
    pub dataset_type: String,
    pub license: Option<String>,
    pub readme: String,
    pub table: NamingTable,
    pub resolver: ResolverSpec,
    pub image_sidecar: SidecarTemplate,
    pub derivative_sidecar: SidecarTemplate,
    pub participant_columns: Vec<ColumnSpec>,
    pub fixed_attributes: BTreeMap<String, String>,
    pub samples: Option<SamplesSpec>,
    pub mpm: Option<MpmSpec>,
    pub stitch: Vec<StitchRule>,
    pub stitch_tool: Option<StitchTool>,
    pub labels_pipeline: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: &Utf8Path) -> Result<ResolvedDataset, CurateError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| CurateError::ConfigRead(path.to_path_buf()))?;
        let config: DatasetConfig = serde_json::from_str(&content)
            .map_err(|err| CurateError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: DatasetConfig) -> Result<ResolvedDataset, CurateError> {
        if config.name.trim().is_empty() {
            return Err(CurateError::ConfigInvalid(
                "dataset name must not be empty".to_string(),
            ));
        }
        if config.images.is_empty() {
            return Err(CurateError::ConfigInvalid(
                "image naming table must not be empty".to_string(),
            ));
        }
        for rule in &config.stitch {
            if rule.inputs.len() < 2 {
                return Err(CurateError::ConfigInvalid(format!(
                    "stitch rule '{}' needs at least two inputs",
                    rule.output
                )));
            }
        }
        let table = NamingTable::new(
            config.match_mode,
            config.images,
            config.derivatives,
            config.subject_overrides,
        )?;
        Ok(ResolvedDataset {
            name: config.name,
            bids_version: config.bids_version,
            dataset_type: config.dataset_type,
            license: config.license,
            readme: config.readme,
            table,
            resolver: config.resolver,
            image_sidecar: config.image_sidecar,
            derivative_sidecar: config.derivative_sidecar,
            participant_columns: config.participant_columns,
            fixed_attributes: config.fixed_attributes,
            samples: config.samples,
            mpm: config.mpm,
            stitch: config.stitch,
            stitch_tool: config.stitch_tool,
            labels_pipeline: config.labels_pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r#"{
            "name": "dcm-zurich",
            "match_mode": "substring",
            "images": [
                {"pattern": "t2_tse_sag", "suffix": "acq-sagittal_T2w.nii.gz", "modality": "anat"}
            ],
            "resolver": {"strategy": "path-segment", "index": 0}
        }"#;
        let config: DatasetConfig = serde_json::from_str(json).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.name, "dcm-zurich");
        assert_eq!(resolved.bids_version, "1.6.0");
        assert!(resolved
            .table
            .lookup("250791", "t2_tse_sag_384_25mm_0005.nii")
            .is_some());
    }

    #[test]
    fn empty_image_table_is_rejected() {
        let config = DatasetConfig {
            name: "x".to_string(),
            bids_version: default_bids_version(),
            dataset_type: default_dataset_type(),
            license: None,
            readme: String::new(),
            match_mode: MatchMode::Exact,
            images: Vec::new(),
            derivatives: Vec::new(),
            subject_overrides: Vec::new(),
            resolver: ResolverSpec::PathSegment { index: 0 },
            image_sidecar: SidecarTemplate::Empty,
            derivative_sidecar: SidecarTemplate::Empty,
            participant_columns: Vec::new(),
            fixed_attributes: BTreeMap::new(),
            samples: None,
            mpm: None,
            stitch: Vec::new(),
            stitch_tool: None,
            labels_pipeline: None,
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, CurateError::ConfigInvalid(_));
    }
}
