use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CurateError;
use crate::fs_util;

/// What to put into a generated sidecar: an empty object, or a fixed
/// per-dataset metadata template (pixel size, field of view, staining, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarTemplate {
    Empty,
    Template(BTreeMap<String, serde_json::Value>),
}

impl SidecarTemplate {
    fn to_value(&self) -> serde_json::Value {
        match self {
            SidecarTemplate::Empty => serde_json::json!({}),
            SidecarTemplate::Template(map) => {
                serde_json::Value::Object(map.clone().into_iter().collect())
            }
        }
    }
}

/// Sidecar path for an image file: extension replaced by `.json`, with
/// `.nii` and `.nii.gz` collapsing to the same sidecar name. Returns `None`
/// for non-image payloads (`.bval`, `.bvec`, level files) which carry no
/// sidecar in BIDS.
pub fn sidecar_path(image: &Utf8Path) -> Option<Utf8PathBuf> {
    let name = image.file_name()?;
    let nii = Regex::new(r"\.nii(\.gz)?$").unwrap();
    if nii.is_match(name) {
        return Some(image.with_file_name(nii.replace(name, ".json").into_owned()));
    }
    match image.extension() {
        Some("png") | Some("tif") | Some("tiff") => Some(image.with_extension("json")),
        _ => None,
    }
}

/// Creates the sidecar for a destination image if it does not exist yet.
/// Pre-existing sidecars are left alone so that metadata curated by hand
/// after an earlier run survives re-runs. Returns whether a file was written.
pub fn ensure_sidecar(
    dest_image: &Utf8Path,
    template: &SidecarTemplate,
) -> Result<bool, CurateError> {
    ensure_sidecar_value(dest_image, &template.to_value())
}

/// Same never-overwrite policy, but with explicit metadata (a scan's own
/// scanner-exported parameters rather than a per-dataset template).
pub fn ensure_sidecar_value(
    dest_image: &Utf8Path,
    value: &serde_json::Value,
) -> Result<bool, CurateError> {
    let Some(path) = sidecar_path(dest_image) else {
        return Ok(false);
    };
    if path.as_std_path().exists() {
        debug!(sidecar = %path, "sidecar already present, keeping");
        return Ok(false);
    }
    fs_util::write_json_pretty(&path, value)?;
    Ok(true)
}

/// Copies the source image's own co-located sidecar to the destination,
/// re-encoded as UTF-8 JSON. Falls back to `template` when the source has
/// none, so the destination image never ends up bare.
pub fn copy_or_generate_sidecar(
    source_image: &Utf8Path,
    dest_image: &Utf8Path,
    template: &SidecarTemplate,
) -> Result<bool, CurateError> {
    let Some(dest_path) = sidecar_path(dest_image) else {
        return Ok(false);
    };
    if dest_path.as_std_path().exists() {
        debug!(sidecar = %dest_path, "sidecar already present, keeping");
        return Ok(false);
    }
    let source_path = sidecar_path(source_image);
    match source_path {
        Some(source_path) if source_path.as_std_path().exists() => {
            let value = fs_util::read_json_lenient(&source_path)?;
            fs_util::write_json_pretty(&dest_path, &value)?;
            Ok(true)
        }
        _ => {
            fs_util::write_json_pretty(&dest_path, &template.to_value())?;
            Ok(true)
        }
    }
}
