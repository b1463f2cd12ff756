use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedDataset;
use crate::domain::{BidsPrefix, ImageCategory, Modality, SubjectId};
use crate::error::CurateError;
use crate::fs_util;
use crate::manifest::{self, Manifest};
use crate::materialize::{self, BidsTree, DerivedImageProducer};
use crate::mpm::{self, MpmScan};
use crate::resolver::Resolver;
use crate::sidecar;

#[derive(Debug, Clone, Default)]
pub struct CurateOptions {
    /// Reuse a pre-existing output tree instead of clearing it first.
    pub append: bool,
    /// Walk and report without writing anything.
    pub dry_run: bool,
    /// Remove directories extracted from per-subject archives once the
    /// archive itself is confirmed still present.
    pub cleanup_extracted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurateReport {
    pub dataset: String,
    pub completed_at: String,
    pub subjects: usize,
    pub files_copied: usize,
    pub sidecars_created: usize,
    pub stitched: usize,
    pub skipped: usize,
    pub items: Vec<CurateItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurateItem {
    pub source: String,
    pub destination: String,
    pub category: ImageCategory,
}

/// One curation run: a single linear pass over the source tree, then the
/// dataset-level descriptors. No retries, no rollback.
pub struct Curator<P: DerivedImageProducer> {
    dataset: ResolvedDataset,
    producer: P,
}

impl<P: DerivedImageProducer> Curator<P> {
    pub fn new(dataset: ResolvedDataset, producer: P) -> Self {
        Self { dataset, producer }
    }

    pub fn run(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        options: &CurateOptions,
    ) -> Result<CurateReport, CurateError> {
        if !input.as_std_path().is_dir() {
            return Err(CurateError::InputMissing(input.to_path_buf()));
        }

        let tree = BidsTree::new(output.to_path_buf());
        if !options.dry_run {
            if options.append {
                tree.ensure_root()?;
            } else {
                tree.clear()?;
            }
        }

        let extracted = if options.dry_run {
            Vec::new()
        } else {
            self.extract_archives(input)?
        };

        let mut resolver = Resolver::new(self.dataset.resolver.clone());
        let mut manifest = Manifest::new();
        let mut mpm_groups: BTreeMap<SubjectId, (BidsPrefix, Vec<Utf8PathBuf>)> = BTreeMap::new();
        let mut report = CurateReport {
            dataset: self.dataset.name.clone(),
            completed_at: String::new(),
            subjects: 0,
            files_copied: 0,
            sidecars_created: 0,
            stitched: 0,
            skipped: 0,
            items: Vec::new(),
        };

        for source in fs_util::walk_files_sorted(input)? {
            // Guard against an output tree nested inside the input.
            if source.starts_with(output) {
                continue;
            }
            // Archives are handled by the extraction pass; source-side JSON
            // is metadata picked up alongside its image, never an image.
            if matches!(source.extension(), Some("zip") | Some("json"))
                || source.as_str().ends_with(".tar.gz")
            {
                continue;
            }
            let rel = source
                .strip_prefix(input)
                .map_err(|_| CurateError::Filesystem(format!("path escapes input: {source}")))?;

            let Some(resolved) = resolver.resolve(rel)? else {
                report.skipped += 1;
                continue;
            };
            let prefix = resolved.prefix;

            // MPM scans are named from their own sidecars, per subject, once
            // the walk has gathered the whole group.
            if let Some(spec) = &self.dataset.mpm {
                if spec.matches(rel.as_str()) {
                    manifest.record(&prefix, &self.dataset.fixed_attributes);
                    mpm_groups
                        .entry(prefix.subject.clone())
                        .or_insert_with(|| (prefix.clone(), Vec::new()))
                        .1
                        .push(source.clone());
                    continue;
                }
            }

            let Some(hit) = self
                .dataset
                .table
                .lookup(prefix.subject.token(), rel.as_str())
            else {
                report.skipped += 1;
                continue;
            };

            let dest = tree.image_path(hit.category, &prefix, hit.rule.modality, &hit.rule.suffix);
            manifest.record(&prefix, &self.dataset.fixed_attributes);

            if options.dry_run {
                report.files_copied += 1;
                report.items.push(CurateItem {
                    source: source.to_string(),
                    destination: dest.to_string(),
                    category: hit.category,
                });
                continue;
            }

            if !materialize::materialize(&source, &dest)? {
                report.skipped += 1;
                continue;
            }
            report.files_copied += 1;
            report.items.push(CurateItem {
                source: source.to_string(),
                destination: dest.to_string(),
                category: hit.category,
            });

            let template = match hit.category {
                ImageCategory::Primary => &self.dataset.image_sidecar,
                ImageCategory::Derivative => &self.dataset.derivative_sidecar,
            };
            let created = if hit.rule.copy_sidecar {
                sidecar::copy_or_generate_sidecar(&source, &dest, template)?
            } else {
                sidecar::ensure_sidecar(&dest, template)?
            };
            if created {
                report.sidecars_created += 1;
            }
        }

        self.curate_mpm_groups(&tree, &mpm_groups, options.dry_run, &mut report)?;
        if !options.dry_run {
            report.stitched = self.stitch_subjects(&tree, &manifest)?;
            self.write_descriptors(&tree, &manifest)?;
            self.cleanup_extracted(&extracted, options)?;
        }

        report.subjects = manifest.subject_count();
        report.completed_at = chrono::Utc::now().to_rfc3339();
        info!(
            dataset = %report.dataset,
            subjects = report.subjects,
            files = report.files_copied,
            "curation finished"
        );
        Ok(report)
    }

    /// Subject directories shipped as `.zip` or `.tar.gz` archives are
    /// extracted next to the archive before the walk. Returns the extracted
    /// directories together with their archives, for the optional cleanup
    /// pass.
    fn extract_archives(
        &self,
        input: &Utf8Path,
    ) -> Result<Vec<(Utf8PathBuf, Utf8PathBuf)>, CurateError> {
        let mut extracted = Vec::new();
        for archive in fs_util::walk_files_sorted(input)? {
            let Some(parent) = archive.parent() else {
                continue;
            };
            let Some(name) = archive.file_name() else {
                continue;
            };
            let stem = if let Some(stem) = name.strip_suffix(".zip") {
                stem
            } else if let Some(stem) = name.strip_suffix(".tar.gz") {
                stem
            } else {
                continue;
            };
            let target = parent.join(stem);
            if target.as_std_path().is_dir() {
                continue;
            }
            if name.ends_with(".zip") {
                let files = fs_util::extract_zip(&archive, parent)?;
                info!(archive = %archive, files, "extracted subject archive");
            } else {
                info!(archive = %archive, "extracting subject archive");
                fs_util::extract_tar_gz(&archive, parent)?;
            }
            extracted.push((target, archive.clone()));
        }
        Ok(extracted)
    }

    /// Names and materializes each subject's multi-parameter-mapping scans
    /// from their own sidecars; the scanner metadata travels with the image.
    fn curate_mpm_groups(
        &self,
        tree: &BidsTree,
        groups: &BTreeMap<SubjectId, (BidsPrefix, Vec<Utf8PathBuf>)>,
        dry_run: bool,
        report: &mut CurateReport,
    ) -> Result<(), CurateError> {
        for (prefix, sources) in groups.values() {
            let mut scans = Vec::with_capacity(sources.len());
            for source in sources {
                scans.push(MpmScan::read(source)?);
            }
            let suffixes = mpm::assign_suffixes(&scans);
            for (scan, suffix) in scans.iter().zip(suffixes) {
                let Some(suffix) = suffix else {
                    warn!(source = %scan.source, "unrecognized MPM series description, skipping");
                    report.skipped += 1;
                    continue;
                };
                let dest = tree.image_path(ImageCategory::Primary, prefix, Modality::Anat, &suffix);
                if !dry_run && !materialize::materialize(&scan.source, &dest)? {
                    report.skipped += 1;
                    continue;
                }
                report.files_copied += 1;
                report.items.push(CurateItem {
                    source: scan.source.to_string(),
                    destination: dest.to_string(),
                    category: ImageCategory::Primary,
                });
                if !dry_run && sidecar::ensure_sidecar_value(&dest, &scan.metadata)? {
                    report.sidecars_created += 1;
                }
            }
        }
        Ok(())
    }

    /// Runs the configured stitch groups per subject: when every input image
    /// exists, the external producer merges them into the derived output.
    fn stitch_subjects(&self, tree: &BidsTree, manifest: &Manifest) -> Result<usize, CurateError> {
        if self.dataset.stitch.is_empty() {
            return Ok(0);
        }
        let mut stitched = 0;
        for subject in manifest.subjects() {
            let prefix = BidsPrefix {
                subject: subject.clone(),
                sample: None,
            };
            for group in &self.dataset.stitch {
                let output =
                    tree.image_path(ImageCategory::Primary, &prefix, group.modality, &group.output);
                if output.as_std_path().exists() {
                    continue;
                }
                let inputs: Vec<Utf8PathBuf> = group
                    .inputs
                    .iter()
                    .map(|suffix| {
                        tree.image_path(ImageCategory::Primary, &prefix, group.modality, suffix)
                    })
                    .collect();
                let existing: Vec<Utf8PathBuf> = inputs
                    .iter()
                    .filter(|path| path.as_std_path().is_file())
                    .cloned()
                    .collect();
                match existing.len() {
                    0 => continue,
                    // A lone field of view needs no merging; it becomes the
                    // merged image as-is.
                    1 => {
                        info!(subject = %subject, output = %group.output, "single stitch input, copying");
                        fs_util::copy_file_atomic(&existing[0], &output)?;
                        sidecar::ensure_sidecar(&output, &self.dataset.image_sidecar)?;
                        stitched += 1;
                    }
                    n if n < inputs.len() => {
                        warn!(subject = %subject, output = %group.output, "stitch inputs incomplete, skipping");
                    }
                    _ => {
                        if self.producer.produce(&inputs, &output)? {
                            sidecar::ensure_sidecar(&output, &self.dataset.image_sidecar)?;
                            stitched += 1;
                        }
                    }
                }
            }
        }
        Ok(stitched)
    }

    fn write_descriptors(&self, tree: &BidsTree, manifest: &Manifest) -> Result<(), CurateError> {
        manifest.write_participants_tsv(&tree.participants_tsv(), &self.dataset.participant_columns)?;
        manifest.write_participants_json(
            &tree.participants_json(),
            &self.dataset.participant_columns,
        )?;
        manifest::write_dataset_description(
            &tree.dataset_description(),
            &self.dataset.name,
            &self.dataset.bids_version,
            &self.dataset.dataset_type,
            self.dataset.license.as_deref(),
        )?;
        manifest::write_readme(&tree.readme(), &self.dataset.readme)?;

        if self.dataset.samples.is_some() || manifest.has_samples() {
            let sample_type = self
                .dataset
                .samples
                .as_ref()
                .map_or("tissue", |spec| spec.sample_type.as_str());
            manifest.write_samples_tsv(&tree.samples_tsv(), sample_type)?;
            manifest.write_samples_json(&tree.samples_json())?;
        }

        if self.dataset.table.has_derivatives() {
            let pipeline = self
                .dataset
                .labels_pipeline
                .as_deref()
                .unwrap_or("Manual segmentation labels");
            manifest::write_labels_description(
                &tree.labels_dataset_description(),
                &self.dataset.name,
                &self.dataset.bids_version,
                pipeline,
            )?;
        }
        Ok(())
    }

    fn cleanup_extracted(
        &self,
        extracted: &[(Utf8PathBuf, Utf8PathBuf)],
        options: &CurateOptions,
    ) -> Result<(), CurateError> {
        if !options.cleanup_extracted {
            return Ok(());
        }
        for (dir, archive) in extracted {
            // Only drop the working directory while its archive form is
            // still on disk.
            if archive.as_std_path().is_file() && dir.as_std_path().is_dir() {
                info!(dir = %dir, "removing extracted working directory");
                fs::remove_dir_all(dir.as_std_path())
                    .map_err(|err| CurateError::Filesystem(format!("remove {dir}: {err}")))?;
            }
        }
        Ok(())
    }
}
