use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{BidsPrefix, SampleId, SubjectId};
use crate::error::CurateError;

/// Per-dataset strategy turning a source path (relative to the input root)
/// into a canonical subject identifier, and optionally a sample identifier.
/// The three strategies cover the conventions seen across source datasets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum ResolverSpec {
    /// Subject token is a fixed-depth path component, e.g. `250791/...`.
    PathSegment { index: usize },
    /// Subject (and sample) tokens come from splitting one directory name
    /// on a separator, e.g. `20160718_nyu_mouse_25_sampleA`.
    NameSplit {
        #[serde(default)]
        dir_index: usize,
        #[serde(default = "default_separator")]
        separator: String,
        index: usize,
        #[serde(default)]
        sample_index: Option<usize>,
        #[serde(default)]
        prefix: Option<String>,
    },
    /// Coded path components mapped through lookup tables, concatenated with
    /// a zero-padded subject number, e.g. `01/csm/003` -> `torontoDCM003`.
    CodeLookup {
        segments: Vec<CodeSegment>,
        subject_index: usize,
        #[serde(default = "default_pad")]
        pad: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSegment {
    pub index: usize,
    pub map: BTreeMap<String, String>,
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_pad() -> usize {
    3
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub prefix: BidsPrefix,
    /// Source-side identity of the subject, kept to enforce injectivity.
    pub source_key: String,
}

/// Stateful resolver: tracks running indices for non-numeric subject
/// directories and guards against two source subjects collapsing onto one
/// output identifier.
#[derive(Debug)]
pub struct Resolver {
    spec: ResolverSpec,
    seen: BTreeMap<String, String>,
    assigned: BTreeMap<String, u32>,
    counters: BTreeMap<String, u32>,
}

impl Resolver {
    pub fn new(spec: ResolverSpec) -> Self {
        Self {
            spec,
            seen: BTreeMap::new(),
            assigned: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }

    /// Resolves the subject for one source file. `Ok(None)` means the path
    /// does not belong to the dataset's enumeration and the file is skipped.
    pub fn resolve(&mut self, rel: &Utf8Path) -> Result<Option<Resolved>, CurateError> {
        let components: Vec<&str> = rel.components().map(|c| c.as_str()).collect();
        let spec = self.spec.clone();
        let (token, sample, source_key) = match &spec {
            ResolverSpec::PathSegment { index } => {
                let Some(raw) = components.get(*index) else {
                    return Ok(None);
                };
                let token = sanitize(raw);
                if token.is_empty() {
                    return Ok(None);
                }
                (token, None, raw.to_string())
            }
            ResolverSpec::NameSplit {
                dir_index,
                separator,
                index,
                sample_index,
                prefix,
            } => {
                let Some(dir) = components.get(*dir_index) else {
                    return Ok(None);
                };
                let tokens: Vec<&str> = dir.split(separator.as_str()).collect();
                let Some(raw) = tokens.get(*index) else {
                    return Ok(None);
                };
                let mut token = sanitize(raw);
                if token.is_empty() {
                    return Ok(None);
                }
                if let Some(prefix) = prefix {
                    token = format!("{prefix}{token}");
                }
                let sample = match sample_index {
                    Some(sample_index) => match tokens.get(*sample_index) {
                        Some(raw) => Some(sanitize(raw)),
                        None => return Ok(None),
                    },
                    None => None,
                };
                // Key on the subject token alone: the same mouse shows up in
                // one directory per sample, and those must not collide.
                (token, sample, (*raw).to_string())
            }
            ResolverSpec::CodeLookup {
                segments,
                subject_index,
                pad,
            } => {
                let mut codes = String::new();
                let mut raw_key = Vec::new();
                for segment in segments {
                    let Some(raw) = components.get(segment.index) else {
                        return Ok(None);
                    };
                    let Some(mapped) = segment.map.get(*raw) else {
                        return Ok(None);
                    };
                    codes.push_str(mapped);
                    raw_key.push(raw.to_string());
                }
                let Some(subject_dir) = components.get(*subject_index) else {
                    return Ok(None);
                };
                raw_key.push(subject_dir.to_string());
                let number = self.subject_number(&codes, subject_dir);
                let token = format!("{codes}{number:0width$}", width = *pad);
                (token, None, raw_key.join("/"))
            }
        };

        let subject: SubjectId = token.parse()?;
        let sample: Option<SampleId> = sample.map(|s| s.parse()).transpose()?;

        if let Some(existing) = self.seen.get(subject.token()) {
            if existing != &source_key {
                return Err(CurateError::SubjectCollision {
                    subject: subject.to_string(),
                    existing: existing.clone(),
                    incoming: source_key,
                });
            }
        } else {
            self.seen
                .insert(subject.token().to_string(), source_key.clone());
        }

        Ok(Some(Resolved {
            prefix: BidsPrefix { subject, sample },
            source_key,
        }))
    }

    /// Numeric subject directories keep their own number; everything else
    /// gets a running index per code group, in walk (sorted) order.
    fn subject_number(&mut self, group: &str, subject_dir: &str) -> u32 {
        if let Ok(number) = subject_dir.parse::<u32>() {
            return number;
        }
        let key = format!("{group}/{subject_dir}");
        if let Some(assigned) = self.assigned.get(&key) {
            return *assigned;
        }
        let counter = self.counters.entry(group.to_string()).or_insert(0);
        *counter += 1;
        let number = *counter;
        self.assigned.insert(key, number);
        number
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars().filter(|ch| ch.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    fn inspired_spec() -> ResolverSpec {
        let centres = [("01", "toronto"), ("02", "zurich")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let pathologies = [("csm", "DCM"), ("hc", "HC"), ("sci", "SCI")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ResolverSpec::CodeLookup {
            segments: vec![
                CodeSegment {
                    index: 0,
                    map: centres,
                },
                CodeSegment {
                    index: 1,
                    map: pathologies,
                },
            ],
            subject_index: 2,
            pad: 3,
        }
    }

    #[test]
    fn path_segment_resolves_and_sanitizes() {
        let mut resolver = Resolver::new(ResolverSpec::PathSegment { index: 0 });
        let rel = Utf8PathBuf::from("AB-12 x/scan/file.nii");
        let resolved = resolver.resolve(&rel).unwrap().unwrap();
        assert_eq!(resolved.prefix.subject.to_string(), "sub-AB12x");
    }

    #[test]
    fn name_split_accepts_many_samples_per_subject() {
        let mut resolver = Resolver::new(ResolverSpec::NameSplit {
            dir_index: 0,
            separator: "_".to_string(),
            index: 3,
            sample_index: Some(4),
            prefix: Some("nyuMouse".to_string()),
        });
        let first = resolver
            .resolve(&Utf8PathBuf::from("20160718_nyu_mouse_12_sampleA/image.png"))
            .unwrap()
            .unwrap();
        let second = resolver
            .resolve(&Utf8PathBuf::from("20160718_nyu_mouse_12_sampleB/image.png"))
            .unwrap()
            .unwrap();
        assert_eq!(first.prefix.subject, second.prefix.subject);
        assert_ne!(first.prefix.sample, second.prefix.sample);
    }

    #[test]
    fn name_split_with_sample_and_prefix() {
        let mut resolver = Resolver::new(ResolverSpec::NameSplit {
            dir_index: 0,
            separator: "_".to_string(),
            index: 3,
            sample_index: Some(4),
            prefix: Some("nyuMouse".to_string()),
        });
        let rel = Utf8PathBuf::from("20160718_nyu_mouse_25_sampleA/image.png");
        let resolved = resolver.resolve(&rel).unwrap().unwrap();
        assert_eq!(resolved.prefix.subject.to_string(), "sub-nyuMouse25");
        assert_eq!(
            resolved.prefix.sample.as_ref().unwrap().to_string(),
            "sample-sampleA"
        );
    }

    #[test]
    fn code_lookup_keeps_numeric_subject_number() {
        let mut resolver = Resolver::new(inspired_spec());
        let rel = Utf8PathBuf::from("01/csm/003/bl/cord/t1_sag.nii.gz");
        let resolved = resolver.resolve(&rel).unwrap().unwrap();
        assert_eq!(resolved.prefix.subject.to_string(), "sub-torontoDCM003");
    }

    #[test]
    fn code_lookup_skips_unmapped_codes() {
        let mut resolver = Resolver::new(inspired_spec());
        let rel = Utf8PathBuf::from("03/csm/001/bl/cord/t1_sag.nii.gz");
        assert!(resolver.resolve(&rel).unwrap().is_none());
    }

    #[test]
    fn code_lookup_assigns_running_index_for_named_dirs() {
        let mut resolver = Resolver::new(inspired_spec());
        let first = resolver
            .resolve(&Utf8PathBuf::from("01/hc/alpha/bl/cord/t1_sag.nii.gz"))
            .unwrap()
            .unwrap();
        let second = resolver
            .resolve(&Utf8PathBuf::from("01/hc/beta/bl/cord/t1_sag.nii.gz"))
            .unwrap()
            .unwrap();
        let first_again = resolver
            .resolve(&Utf8PathBuf::from("01/hc/alpha/bl/cord/t2_sag.nii.gz"))
            .unwrap()
            .unwrap();
        assert_eq!(first.prefix.subject.to_string(), "sub-torontoHC001");
        assert_eq!(second.prefix.subject.to_string(), "sub-torontoHC002");
        assert_eq!(first_again.prefix.subject, first.prefix.subject);
    }

    #[test]
    fn collision_is_detected() {
        let mut resolver = Resolver::new(ResolverSpec::PathSegment { index: 0 });
        resolver
            .resolve(&Utf8PathBuf::from("sub 01/file.nii"))
            .unwrap();
        let err = resolver
            .resolve(&Utf8PathBuf::from("sub-01/file.nii"))
            .unwrap_err();
        assert_matches!(err, CurateError::SubjectCollision { .. });
    }
}
