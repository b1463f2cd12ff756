//! Built-in dataset presets. Each constructor captures the naming tables and
//! conventions of one source dataset that used to live in its own script.

use std::collections::BTreeMap;

use crate::config::{DatasetConfig, SamplesSpec, StitchTool};
use crate::domain::Modality;
use crate::error::CurateError;
use crate::manifest::ColumnSpec;
use crate::materialize::StitchRule;
use crate::mpm::MpmSpec;
use crate::naming::{MatchMode, NamingRule, SubjectOverride};
use crate::resolver::{CodeSegment, ResolverSpec};
use crate::sidecar::SidecarTemplate;

pub const PRESETS: &[&str] = &["inspired", "axondeepseg-tem", "dcm-zurich"];

pub fn preset(name: &str) -> Result<DatasetConfig, CurateError> {
    match name {
        "inspired" => Ok(inspired()),
        "axondeepseg-tem" => Ok(axondeepseg_tem()),
        "dcm-zurich" => Ok(dcm_zurich()),
        other => Err(CurateError::UnknownDataset(other.to_string())),
    }
}

fn rule(pattern: &str, suffix: &str, modality: Modality) -> NamingRule {
    NamingRule {
        pattern: pattern.to_string(),
        suffix: suffix.to_string(),
        modality,
        copy_sidecar: false,
    }
}

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// INSPIRED: spinal cord and brain MRI from two centres (Toronto, Zurich)
/// across three pathologies (DCM, SCI, HC). Input layout:
/// `<centre>/<pathology>/<subject>/bl/<region>/<image>`. Brain
/// multi-parameter-mapping scans live under `brain/mpm_raw/` and are named
/// from their own sidecars.
pub fn inspired() -> DatasetConfig {
    DatasetConfig {
        name: "INSPIRED".to_string(),
        bids_version: "1.6.0".to_string(),
        dataset_type: "raw".to_string(),
        license: None,
        readme: "INSPIRED spinal cord and brain MRI dataset, curated to BIDS.\n\
                 Centres: Toronto (01), Zurich (02). Pathologies: DCM, SCI, HC.\n\
                 Spine imaging carries the acq-cspine label to differentiate it from brain."
            .to_string(),
        match_mode: MatchMode::Substring,
        images: vec![
            rule("cord/dwi.nii.gz", "acq-cspine_dir-AP_dwi.nii.gz", Modality::Dwi),
            rule("cord/dwi.bval", "acq-cspine_dir-AP_dwi.bval", Modality::Dwi),
            rule("cord/dwi.bvec", "acq-cspine_dir-AP_dwi.bvec", Modality::Dwi),
            rule(
                "cord/dwi_reversed_blip.nii.gz",
                "acq-cspine_dir-PA_dwi.nii.gz",
                Modality::Dwi,
            ),
            rule("cord/t1_sag.nii.gz", "acq-cspine_T1w.nii.gz", Modality::Anat),
            rule(
                "cord/t2_sag.nii.gz",
                "acq-cspineCoronal_T2w.nii.gz",
                Modality::Anat,
            ),
            rule(
                "cord/t2_tra.nii.gz",
                "acq-cspineAxial_T2w.nii.gz",
                Modality::Anat,
            ),
            rule(
                "cord/pd_medic.nii.gz",
                "acq-cspine_T2star.nii.gz",
                Modality::Anat,
            ),
            rule("brain/dwi.nii.gz", "dir-AP_dwi.nii.gz", Modality::Dwi),
            rule("brain/dwi.bval", "dir-AP_dwi.bval", Modality::Dwi),
            rule("brain/dwi.bvec", "dir-AP_dwi.bvec", Modality::Dwi),
            rule(
                "brain/dwi_reversed_blip.nii.gz",
                "dir-PA_dwi.nii.gz",
                Modality::Dwi,
            ),
        ],
        derivatives: Vec::new(),
        subject_overrides: Vec::new(),
        resolver: ResolverSpec::CodeLookup {
            segments: vec![
                CodeSegment {
                    index: 0,
                    map: map(&[("01", "toronto"), ("02", "zurich")]),
                },
                CodeSegment {
                    index: 1,
                    map: map(&[("csm", "DCM"), ("hc", "HC"), ("sci", "SCI")]),
                },
            ],
            subject_index: 2,
            pad: 3,
        },
        image_sidecar: SidecarTemplate::Empty,
        derivative_sidecar: SidecarTemplate::Empty,
        participant_columns: Vec::new(),
        fixed_attributes: BTreeMap::new(),
        samples: None,
        mpm: Some(MpmSpec {
            pattern: "brain/mpm_raw/".to_string(),
        }),
        stitch: Vec::new(),
        stitch_tool: None,
        labels_pipeline: None,
    }
}

/// TEM microscopy of mouse brain (splenium) with axon/myelin manual
/// segmentation labels. Input layout: one directory per acquisition,
/// `20160718_nyu_mouse_<N>_<sample>/{image.png,mask*.png}`.
pub fn axondeepseg_tem() -> DatasetConfig {
    let mut template = BTreeMap::new();
    template.insert(
        "PixelSize".to_string(),
        serde_json::json!([0.00236, 0.00236]),
    );
    template.insert("FieldOfView".to_string(), serde_json::json!([8.88, 5.39]));
    template.insert("BodyPart".to_string(), serde_json::json!("BRAIN"));
    template.insert("BodyPartDetails".to_string(), serde_json::json!("splenium"));
    template.insert(
        "SampleFixation".to_string(),
        serde_json::json!("2% paraformaldehyde, 2.5% glutaraldehyde"),
    );
    template.insert("Environment".to_string(), serde_json::json!("exvivo"));

    DatasetConfig {
        name: "data_axondeepseg_tem".to_string(),
        bids_version: "1.6.0 - BEP031 v0.0.4".to_string(),
        dataset_type: "raw".to_string(),
        license: Some("MIT".to_string()),
        readme: "TEM dataset for AxonDeepSeg (https://axondeepseg.readthedocs.io/).\n\
                 Brain (splenium) samples from 20 mice with axon and myelin manual \
                 segmentation labels.\n\
                 Reference: Jelescu, I. O. et al. Neuroimage 132, 104-114 (2016)."
            .to_string(),
        match_mode: MatchMode::Exact,
        images: vec![rule("image.png", "TEM.png", Modality::Microscopy)],
        derivatives: vec![
            rule(
                "mask.png",
                "TEM_seg-axonmyelin-manual.png",
                Modality::Microscopy,
            ),
            rule(
                "mask_seg-axon-manual.png",
                "TEM_seg-axon-manual.png",
                Modality::Microscopy,
            ),
            rule(
                "mask_seg-myelin-manual.png",
                "TEM_seg-myelin-manual.png",
                Modality::Microscopy,
            ),
        ],
        subject_overrides: Vec::new(),
        resolver: ResolverSpec::NameSplit {
            dir_index: 0,
            separator: "_".to_string(),
            index: 3,
            sample_index: Some(4),
            prefix: Some("nyuMouse".to_string()),
        },
        image_sidecar: SidecarTemplate::Template(template),
        derivative_sidecar: SidecarTemplate::Empty,
        participant_columns: vec![ColumnSpec {
            name: "species".to_string(),
            description: "Binomial species name from the NCBI Taxonomy \
                          (https://www.ncbi.nlm.nih.gov/Taxonomy/Browser/wwwtax.cgi)"
                .to_string(),
        }],
        fixed_attributes: map(&[("species", "mus musculus")]),
        samples: Some(SamplesSpec {
            sample_type: "tissue".to_string(),
        }),
        mpm: None,
        stitch: Vec::new(),
        stitch_tool: None,
        labels_pipeline: Some("Axon and myelin manual segmentation labels".to_string()),
    }
}

/// dcm-zurich: spinal cord MRI of DCM patients. Input layout:
/// `<subject>/<sequence-dir>/<scan>.nii`. The top and bottom axial T2w FOVs
/// are stitched into one axial image by an external tool; subject 798435
/// ships with a different sequence naming convention.
pub fn dcm_zurich() -> DatasetConfig {
    DatasetConfig {
        name: "dcm-zurich".to_string(),
        bids_version: "1.8.0".to_string(),
        dataset_type: "raw".to_string(),
        license: None,
        readme: "Spinal cord MRI data from DCM patients: sagittal T2w, axial T2w \
                 (top and bottom FOV, stitched), and sagittal T1w.\n\
                 Non-stitched axial images are kept as acq-axialTop / acq-axialBottom."
            .to_string(),
        match_mode: MatchMode::Substring,
        images: vec![
            rule(
                "t2_tse_sag_384_25mm",
                "acq-sagittal_T2w.nii.gz",
                Modality::Anat,
            ),
            rule("t2_tse_tra_oben", "acq-axialTop_T2w.nii.gz", Modality::Anat),
            rule(
                "t2_tse_tra_unten",
                "acq-axialBottom_T2w.nii.gz",
                Modality::Anat,
            ),
            rule("t1_tse_sag_fit", "T1w.nii.gz", Modality::Anat),
        ],
        derivatives: Vec::new(),
        subject_overrides: vec![SubjectOverride {
            subject: "798435".to_string(),
            images: vec![
                rule(
                    "t2_tse_sag_384_25mmT2_TSE_SAG_384_25MM_0009",
                    "acq-sagittal_T2w.nii.gz",
                    Modality::Anat,
                ),
                rule(
                    "t2_tse_tra_p2T2_TSE_TRA_P2_0011",
                    "acq-axialTop_T2w.nii.gz",
                    Modality::Anat,
                ),
                rule(
                    "t2_tse_tra_p2T2_TSE_TRA_P2_0012",
                    "acq-axialBottom_T2w.nii.gz",
                    Modality::Anat,
                ),
                rule(
                    "t1_tse_sag_p2T1_TSE_SAG_P2_0010",
                    "T1w.nii.gz",
                    Modality::Anat,
                ),
            ],
        }],
        resolver: ResolverSpec::PathSegment { index: 0 },
        image_sidecar: SidecarTemplate::Empty,
        derivative_sidecar: SidecarTemplate::Empty,
        participant_columns: vec![ColumnSpec {
            name: "pathology".to_string(),
            description: "The diagnosis of pathology of the participant".to_string(),
        }],
        fixed_attributes: map(&[("pathology", "DCM")]),
        samples: None,
        mpm: None,
        stitch: vec![StitchRule {
            inputs: vec![
                "acq-axialTop_T2w.nii.gz".to_string(),
                "acq-axialBottom_T2w.nii.gz".to_string(),
            ],
            output: "acq-axial_T2w.nii.gz".to_string(),
            modality: Modality::Anat,
        }],
        stitch_tool: Some(StitchTool {
            program: "sct_image".to_string(),
            pre_args: vec!["-i".to_string()],
            post_args: vec!["-stitch".to_string()],
        }),
        labels_pipeline: None,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::config::ConfigLoader;
    use crate::error::CurateError;

    use super::*;

    #[test]
    fn all_presets_resolve() {
        for name in PRESETS {
            let config = preset(name).unwrap();
            ConfigLoader::resolve_config(config).unwrap();
        }
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let err = preset("ukbiobank").unwrap_err();
        assert_matches!(err, CurateError::UnknownDataset(_));
    }

    #[test]
    fn inspired_matches_spine_t1() {
        let resolved = ConfigLoader::resolve_config(inspired()).unwrap();
        let hit = resolved
            .table
            .lookup("torontoDCM003", "01/csm/003/bl/cord/t1_sag.nii.gz")
            .unwrap();
        assert_eq!(hit.rule.suffix, "acq-cspine_T1w.nii.gz");
    }

    #[test]
    fn dcm_zurich_override_keeps_suffixes() {
        let resolved = ConfigLoader::resolve_config(dcm_zurich()).unwrap();
        let hit = resolved
            .table
            .lookup(
                "798435",
                "798435/t2_tse_tra_p2T2_TSE_TRA_P2_0011/s798435-1.nii",
            )
            .unwrap();
        assert_eq!(hit.rule.suffix, "acq-axialTop_T2w.nii.gz");
    }
}
