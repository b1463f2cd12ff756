//! Multi-parameter-mapping (MPM) acquisitions. Their BIDS names cannot come
//! from a static table: the contrast, echo and flip entities are derived from
//! each scan's own scanner-exported sidecar, and that sidecar travels with
//! the image instead of a generated one.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::CurateError;
use crate::fs_util;
use crate::sidecar;

/// Selects the raw MPM files of a dataset by a relative-path substring
/// (e.g. `brain/mpm_raw/`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpmSpec {
    pub pattern: String,
}

impl MpmSpec {
    pub fn matches(&self, rel: &str) -> bool {
        rel.contains(&self.pattern) && (rel.ends_with(".nii") || rel.ends_with(".nii.gz"))
    }
}

/// One raw MPM scan with the acquisition parameters read from its sidecar.
#[derive(Debug, Clone)]
pub struct MpmScan {
    pub source: Utf8PathBuf,
    pub metadata: serde_json::Value,
    pub series_description: String,
    pub flip_angle: f64,
    pub echo_time: f64,
}

impl MpmScan {
    /// Reads the scan's co-located sidecar. Scanner exports nest the
    /// acquisition parameters under `acqpar[0]`; plain sidecars keep them at
    /// the top level.
    pub fn read(source: &Utf8Path) -> Result<Self, CurateError> {
        let decode_err = |message: &str| CurateError::MetadataDecode {
            path: source.to_path_buf(),
            message: message.to_string(),
        };
        let sidecar_path =
            sidecar::sidecar_path(source).ok_or_else(|| decode_err("no sidecar path"))?;
        if !sidecar_path.as_std_path().is_file() {
            return Err(decode_err("missing sidecar"));
        }
        let metadata = fs_util::read_json_lenient(&sidecar_path)?;
        let params = metadata
            .get("acqpar")
            .and_then(|acqpar| acqpar.get(0))
            .unwrap_or(&metadata);
        let series_description = params
            .get("SeriesDescription")
            .and_then(|v| v.as_str())
            .ok_or_else(|| decode_err("missing SeriesDescription"))?
            .to_string();
        let flip_angle = params
            .get("FlipAngle")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| decode_err("missing FlipAngle"))?;
        let echo_time = params
            .get("EchoTime")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| decode_err("missing EchoTime"))?;
        Ok(Self {
            source: source.to_path_buf(),
            metadata,
            series_description,
            flip_angle,
            echo_time,
        })
    }
}

/// Assigns each scan of one subject its destination suffix,
/// `acq-<contrast>_echo-<e>_flip-<f>_mt-<on|off>_MPM.nii.gz`. Echo and flip
/// indices are 1-based positions in the sorted set of values seen across the
/// subject's scans. `None` for a scan whose series description matches no
/// known contrast.
pub fn assign_suffixes(scans: &[MpmScan]) -> Vec<Option<String>> {
    let mut echoes: Vec<f64> = scans.iter().map(|scan| scan.echo_time).collect();
    echoes.sort_by(f64::total_cmp);
    echoes.dedup_by(|a, b| a.total_cmp(b).is_eq());
    let mut flips: Vec<f64> = scans.iter().map(|scan| scan.flip_angle).collect();
    flips.sort_by(f64::total_cmp);
    flips.dedup_by(|a, b| a.total_cmp(b).is_eq());

    scans
        .iter()
        .map(|scan| {
            let (acq, mt) = contrast(&scan.series_description)?;
            let echo = index_of(&echoes, scan.echo_time);
            let flip = index_of(&flips, scan.flip_angle);
            Some(format!("acq-{acq}_echo-{echo}_flip-{flip}_mt-{mt}_MPM.nii.gz"))
        })
        .collect()
}

fn contrast(series_description: &str) -> Option<(&'static str, &'static str)> {
    if series_description.contains("_mt_") {
        Some(("MTw", "on"))
    } else if series_description.contains("_pd_") {
        Some(("PDw", "off"))
    } else if series_description.contains("_t1_") {
        Some(("T1w", "off"))
    } else {
        None
    }
}

fn index_of(values: &[f64], value: f64) -> usize {
    values
        .iter()
        .position(|v| v.total_cmp(&value).is_eq())
        .map_or(0, |i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(series: &str, flip: f64, echo: f64) -> MpmScan {
        MpmScan {
            source: Utf8PathBuf::from(format!("{series}.nii")),
            metadata: serde_json::json!({}),
            series_description: series.to_string(),
            flip_angle: flip,
            echo_time: echo,
        }
    }

    #[test]
    fn contrasts_map_to_acq_and_mt_entities() {
        let scans = vec![
            scan("mtw_fl3d_mt_on", 6.0, 2.3),
            scan("pdw_fl3d_pd_sag", 6.0, 2.3),
            scan("t1w_fl3d_t1_sag", 21.0, 2.3),
        ];
        let suffixes = assign_suffixes(&scans);
        assert_eq!(
            suffixes[0].as_deref(),
            Some("acq-MTw_echo-1_flip-1_mt-on_MPM.nii.gz")
        );
        assert_eq!(
            suffixes[1].as_deref(),
            Some("acq-PDw_echo-1_flip-1_mt-off_MPM.nii.gz")
        );
        assert_eq!(
            suffixes[2].as_deref(),
            Some("acq-T1w_echo-1_flip-2_mt-off_MPM.nii.gz")
        );
    }

    #[test]
    fn echo_indices_follow_sorted_echo_times() {
        let scans = vec![
            scan("t1w_fl3d_t1_e2", 21.0, 4.92),
            scan("t1w_fl3d_t1_e1", 21.0, 2.3),
        ];
        let suffixes = assign_suffixes(&scans);
        assert_eq!(
            suffixes[0].as_deref(),
            Some("acq-T1w_echo-2_flip-1_mt-off_MPM.nii.gz")
        );
        assert_eq!(
            suffixes[1].as_deref(),
            Some("acq-T1w_echo-1_flip-1_mt-off_MPM.nii.gz")
        );
    }

    #[test]
    fn unknown_series_description_yields_none() {
        let scans = vec![scan("localizer", 6.0, 2.3)];
        assert_eq!(assign_suffixes(&scans), vec![None]);
    }

    #[test]
    fn spec_matches_only_images_under_the_pattern() {
        let spec = MpmSpec {
            pattern: "brain/mpm_raw/".to_string(),
        };
        assert!(spec.matches("01/csm/003/bl/brain/mpm_raw/scan1.nii"));
        assert!(spec.matches("01/csm/003/bl/brain/mpm_raw/scan1.nii.gz"));
        assert!(!spec.matches("01/csm/003/bl/brain/mpm_raw/scan1.json"));
        assert!(!spec.matches("01/csm/003/bl/brain/dwi.nii.gz"));
    }
}
