use std::fs;
use std::io;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{BidsPrefix, ImageCategory, Modality};
use crate::error::CurateError;
use crate::fs_util;

/// Path layout of one output BIDS dataset: the raw subject tree plus the
/// mirrored `derivatives/labels` subtree for annotations.
#[derive(Debug, Clone)]
pub struct BidsTree {
    root: Utf8PathBuf,
}

impl BidsTree {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn labels_root(&self) -> Utf8PathBuf {
        self.root.join("derivatives").join("labels")
    }

    pub fn modality_dir(
        &self,
        category: ImageCategory,
        prefix: &BidsPrefix,
        modality: Modality,
    ) -> Utf8PathBuf {
        let base = match category {
            ImageCategory::Primary => self.root.clone(),
            ImageCategory::Derivative => self.labels_root(),
        };
        base.join(prefix.subject.to_string()).join(modality.dirname())
    }

    pub fn image_path(
        &self,
        category: ImageCategory,
        prefix: &BidsPrefix,
        modality: Modality,
        suffix: &str,
    ) -> Utf8PathBuf {
        self.modality_dir(category, prefix, modality)
            .join(prefix.filename(suffix))
    }

    pub fn participants_tsv(&self) -> Utf8PathBuf {
        self.root.join("participants.tsv")
    }

    pub fn participants_json(&self) -> Utf8PathBuf {
        self.root.join("participants.json")
    }

    pub fn samples_tsv(&self) -> Utf8PathBuf {
        self.root.join("samples.tsv")
    }

    pub fn samples_json(&self) -> Utf8PathBuf {
        self.root.join("samples.json")
    }

    pub fn dataset_description(&self) -> Utf8PathBuf {
        self.root.join("dataset_description.json")
    }

    pub fn labels_dataset_description(&self) -> Utf8PathBuf {
        self.labels_root().join("dataset_description.json")
    }

    pub fn readme(&self) -> Utf8PathBuf {
        self.root.join("README")
    }

    /// Removes and recreates the output root for a clean-slate run.
    pub fn clear(&self) -> Result<(), CurateError> {
        if self.root.as_std_path().exists() {
            fs::remove_dir_all(self.root.as_std_path())
                .map_err(|err| CurateError::Filesystem(format!("clear {}: {err}", self.root)))?;
        }
        fs_util::ensure_dir(&self.root)
    }

    pub fn ensure_root(&self) -> Result<(), CurateError> {
        fs_util::ensure_dir(&self.root)
    }
}

/// Copies one matched source file into place. A missing source is not an
/// error: datasets are known to have incomplete per-subject coverage, so the
/// file is skipped. Returns whether anything was written.
pub fn materialize(source: &Utf8Path, dest: &Utf8Path) -> Result<bool, CurateError> {
    if !source.as_std_path().is_file() {
        debug!(source = %source, "source file missing, skipping");
        return Ok(false);
    }
    let recompress = source.as_str().ends_with(".nii") && dest.as_str().ends_with(".nii.gz");
    if recompress {
        info!(source = %source, dest = %dest, "compressing");
        fs_util::gzip_copy(source, dest)?;
    } else {
        info!(source = %source, dest = %dest, "copying");
        fs_util::copy_file_atomic(source, dest)?;
    }
    Ok(true)
}

/// Two or more materialized acquisitions merged into one derived image by an
/// external tool (e.g. stitching a top and a bottom axial FOV).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchRule {
    pub inputs: Vec<String>,
    pub output: String,
    pub modality: Modality,
}

/// Narrow seam around the external imaging toolchain, so the core workflow
/// stays deterministic and testable without the tool installed.
pub trait DerivedImageProducer {
    /// Produces `output` from `inputs`. `Ok(false)` means the producer chose
    /// to skip (no tool configured); the output file is then absent.
    fn produce(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<bool, CurateError>;
}

/// Shells out to a configured command line tool:
/// `<program> <pre_args> <inputs...> <post_args> -o <output>`
/// (e.g. `sct_image -i top.nii.gz bottom.nii.gz -stitch -o merged.nii.gz`).
pub struct CommandProducer {
    program: String,
    pre_args: Vec<String>,
    post_args: Vec<String>,
}

impl CommandProducer {
    pub fn new(program: impl Into<String>, pre_args: Vec<String>, post_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            pre_args,
            post_args,
        }
    }
}

impl DerivedImageProducer for CommandProducer {
    fn produce(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<bool, CurateError> {
        if let Some(parent) = output.parent() {
            fs_util::ensure_dir(parent)?;
        }
        let mut command = Command::new(&self.program);
        command.args(&self.pre_args);
        for input in inputs {
            command.arg(input.as_str());
        }
        command.args(&self.post_args);
        command.arg("-o").arg(output.as_str());
        info!(program = %self.program, output = %output, "running derived image producer");
        let status = command.status().map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                CurateError::MissingTool(self.program.clone())
            } else {
                CurateError::ProducerFailed(err.to_string())
            }
        })?;
        if !status.success() {
            return Err(CurateError::ProducerFailed(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(true)
    }
}

/// Used when no external tool is configured; stitch groups are skipped.
pub struct NopProducer;

impl DerivedImageProducer for NopProducer {
    fn produce(&self, _inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<bool, CurateError> {
        warn!(output = %output, "no derived image producer configured, skipping");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> BidsPrefix {
        BidsPrefix {
            subject: "torontoDCM003".parse().unwrap(),
            sample: None,
        }
    }

    #[test]
    fn layout_paths() {
        let tree = BidsTree::new(Utf8PathBuf::from("/out"));
        let path = tree.image_path(
            ImageCategory::Primary,
            &prefix(),
            Modality::Anat,
            "acq-cspine_T1w.nii.gz",
        );
        assert_eq!(
            path,
            Utf8PathBuf::from("/out/sub-torontoDCM003/anat/sub-torontoDCM003_acq-cspine_T1w.nii.gz")
        );

        let path = tree.image_path(
            ImageCategory::Derivative,
            &prefix(),
            Modality::Microscopy,
            "TEM_seg-axon-manual.png",
        );
        assert!(path.starts_with("/out/derivatives/labels/sub-torontoDCM003"));
    }

    #[test]
    fn missing_source_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let copied = materialize(&root.join("absent.nii.gz"), &root.join("out.nii.gz")).unwrap();
        assert!(!copied);
        assert!(!root.join("out.nii.gz").as_std_path().exists());
    }

    #[test]
    fn bare_nii_is_recompressed() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let source = root.join("scan.nii");
        let dest = root.join("sub-x_T2w.nii.gz");
        std::fs::write(source.as_std_path(), b"voxels").unwrap();

        assert!(materialize(&source, &dest).unwrap());
        let bytes = std::fs::read(dest.as_std_path()).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn nop_producer_skips() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let produced = NopProducer
            .produce(&[root.join("a.nii.gz")], &root.join("merged.nii.gz"))
            .unwrap();
        assert!(!produced);
    }
}
