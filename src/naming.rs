use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ImageCategory, Modality};
use crate::error::CurateError;

/// How source basenames are matched against a table: exact filename match,
/// or substring containment for datasets that embed the sequence name in a
/// longer acquisition filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    Substring,
}

/// One source-pattern to BIDS-suffix mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingRule {
    pub pattern: String,
    pub suffix: String,
    pub modality: Modality,
    /// Copy the source's own co-located `.json` sidecar instead of
    /// generating one (multi-parameter-mapping acquisitions ship theirs).
    #[serde(default)]
    pub copy_sidecar: bool,
}

/// Replacement primary table for a single exceptional subject whose on-disk
/// naming convention differs from the rest of the dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectOverride {
    pub subject: String,
    pub images: Vec<NamingRule>,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub rule: &'a NamingRule,
    pub category: ImageCategory,
}

/// The per-dataset lookup consulted for every file during the tree walk.
/// Primary and derivative tables are disjoint by construction.
#[derive(Debug, Clone)]
pub struct NamingTable {
    mode: MatchMode,
    primary: Vec<NamingRule>,
    derivatives: Vec<NamingRule>,
    overrides: BTreeMap<String, Vec<NamingRule>>,
}

impl NamingTable {
    pub fn new(
        mode: MatchMode,
        primary: Vec<NamingRule>,
        derivatives: Vec<NamingRule>,
        overrides: Vec<SubjectOverride>,
    ) -> Result<Self, CurateError> {
        check_unique(&primary, "images")?;
        check_unique(&derivatives, "derivatives")?;
        for rule in &primary {
            for other in &derivatives {
                let clashes = match mode {
                    MatchMode::Exact => rule.pattern == other.pattern,
                    MatchMode::Substring => {
                        rule.pattern.contains(&other.pattern)
                            || other.pattern.contains(&rule.pattern)
                    }
                };
                if clashes {
                    return Err(CurateError::ConfigInvalid(format!(
                        "pattern '{}' matches both the image and derivative tables",
                        rule.pattern
                    )));
                }
            }
        }
        let overrides = overrides
            .into_iter()
            .map(|entry| (entry.subject, entry.images))
            .collect();
        Ok(Self {
            mode,
            primary,
            derivatives,
            overrides,
        })
    }

    pub fn has_derivatives(&self) -> bool {
        !self.derivatives.is_empty()
    }

    /// Returns the rule for a source file given its path relative to the
    /// input root, or `None` when the file is not one this dataset
    /// recognizes (and is therefore skipped). Exact mode compares the
    /// basename; substring mode searches the whole relative path, so
    /// patterns may pin a parent directory (`cord/dwi.nii.gz`) or a
    /// sequence-directory prefix (`t2_tse_sag`).
    pub fn lookup(&self, subject_token: &str, rel: &str) -> Option<RuleMatch<'_>> {
        let primary = self
            .overrides
            .get(subject_token)
            .map(Vec::as_slice)
            .unwrap_or(&self.primary);
        if let Some(rule) = self.find(primary, rel) {
            return Some(RuleMatch {
                rule,
                category: ImageCategory::Primary,
            });
        }
        self.find(&self.derivatives, rel).map(|rule| RuleMatch {
            rule,
            category: ImageCategory::Derivative,
        })
    }

    fn find<'a>(&self, rules: &'a [NamingRule], rel: &str) -> Option<&'a NamingRule> {
        let basename = rel.rsplit('/').next().unwrap_or(rel);
        rules.iter().find(|rule| match self.mode {
            MatchMode::Exact => rule.pattern == basename,
            MatchMode::Substring => rel.contains(&rule.pattern),
        })
    }
}

fn check_unique(rules: &[NamingRule], table: &str) -> Result<(), CurateError> {
    for (i, rule) in rules.iter().enumerate() {
        if rules[..i].iter().any(|other| other.pattern == rule.pattern) {
            return Err(CurateError::ConfigInvalid(format!(
                "duplicate pattern '{}' in {table} table",
                rule.pattern
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn rule(pattern: &str, suffix: &str, modality: Modality) -> NamingRule {
        NamingRule {
            pattern: pattern.to_string(),
            suffix: suffix.to_string(),
            modality,
            copy_sidecar: false,
        }
    }

    #[test]
    fn exact_lookup_routes_categories() {
        let table = NamingTable::new(
            MatchMode::Exact,
            vec![rule("image.png", "TEM.png", Modality::Microscopy)],
            vec![rule("mask.png", "TEM_seg-axonmyelin-manual.png", Modality::Microscopy)],
            Vec::new(),
        )
        .unwrap();

        let hit = table.lookup("nyuMouse12", "image.png").unwrap();
        assert_eq!(hit.category, ImageCategory::Primary);
        let hit = table.lookup("nyuMouse12", "mask.png").unwrap();
        assert_eq!(hit.category, ImageCategory::Derivative);
        assert!(table.lookup("nyuMouse12", "unrelated.png").is_none());
    }

    #[test]
    fn substring_lookup() {
        let table = NamingTable::new(
            MatchMode::Substring,
            vec![rule("t2_tse_sag", "acq-sagittal_T2w.nii.gz", Modality::Anat)],
            Vec::new(),
            Vec::new(),
        )
        .unwrap();

        let hit = table
            .lookup("250791", "t2_tse_sag_384_25mm_0005.nii")
            .unwrap();
        assert_eq!(hit.rule.suffix, "acq-sagittal_T2w.nii.gz");
    }

    #[test]
    fn per_subject_override_replaces_primary_table() {
        let table = NamingTable::new(
            MatchMode::Exact,
            vec![rule("t1_sag.nii.gz", "T1w.nii.gz", Modality::Anat)],
            Vec::new(),
            vec![SubjectOverride {
                subject: "798435".to_string(),
                images: vec![rule("T1_SAG_ODD.nii.gz", "T1w.nii.gz", Modality::Anat)],
            }],
        )
        .unwrap();

        assert!(table.lookup("798435", "t1_sag.nii.gz").is_none());
        assert!(table.lookup("798435", "T1_SAG_ODD.nii.gz").is_some());
        assert!(table.lookup("250791", "t1_sag.nii.gz").is_some());
    }

    #[test]
    fn pattern_in_both_tables_is_rejected() {
        let err = NamingTable::new(
            MatchMode::Exact,
            vec![rule("mask.png", "TEM.png", Modality::Microscopy)],
            vec![rule("mask.png", "TEM_seg-axon-manual.png", Modality::Microscopy)],
            Vec::new(),
        )
        .unwrap_err();
        assert_matches!(err, CurateError::ConfigInvalid(_));
    }
}
