use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CurateError;

/// BIDS modality directory an image lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Anat,
    Dwi,
    Microscopy,
}

impl Modality {
    pub fn dirname(self) -> &'static str {
        match self {
            Modality::Anat => "anat",
            Modality::Dwi => "dwi",
            Modality::Microscopy => "microscopy",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dirname())
    }
}

/// Whether a matched file is a primary acquisition or an annotation
/// routed under `derivatives/labels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Primary,
    Derivative,
}

/// Canonical subject identifier. Stores the bare token; renders as
/// `sub-<token>` everywhere it reaches the filesystem or a manifest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl FromStr for SubjectId {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().trim_start_matches("sub-");
        let is_valid = !token.is_empty() && token.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(CurateError::InvalidSubjectToken(value.to_string()));
        }
        Ok(Self(token.to_string()))
    }
}

/// Optional biological sample identifier, rendered as `sample-<token>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId(String);

impl SampleId {
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample-{}", self.0)
    }
}

impl FromStr for SampleId {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().trim_start_matches("sample-");
        let is_valid = !token.is_empty() && token.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(CurateError::InvalidSampleToken(value.to_string()));
        }
        Ok(Self(token.to_string()))
    }
}

/// Output filename prefix for one resolved subject, with or without a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsPrefix {
    pub subject: SubjectId,
    pub sample: Option<SampleId>,
}

impl BidsPrefix {
    pub fn filename(&self, suffix: &str) -> String {
        match &self.sample {
            Some(sample) => format!("{}_{}_{}", self.subject, sample, suffix),
            None => format!("{}_{}", self.subject, suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_subject_id_valid() {
        let id: SubjectId = "torontoDCM003".parse().unwrap();
        assert_eq!(id.token(), "torontoDCM003");
        assert_eq!(id.to_string(), "sub-torontoDCM003");
    }

    #[test]
    fn parse_subject_id_strips_prefix() {
        let id: SubjectId = "sub-ucl001".parse().unwrap();
        assert_eq!(id.to_string(), "sub-ucl001");
    }

    #[test]
    fn parse_subject_id_invalid() {
        let err = "to ronto".parse::<SubjectId>().unwrap_err();
        assert_matches!(err, CurateError::InvalidSubjectToken(_));
        let err = "".parse::<SubjectId>().unwrap_err();
        assert_matches!(err, CurateError::InvalidSubjectToken(_));
    }

    #[test]
    fn prefix_filename_with_sample() {
        let prefix = BidsPrefix {
            subject: "nyuMouse25".parse().unwrap(),
            sample: Some("sampleA".parse().unwrap()),
        };
        assert_eq!(
            prefix.filename("TEM.png"),
            "sub-nyuMouse25_sample-sampleA_TEM.png"
        );
    }

    #[test]
    fn prefix_filename_without_sample() {
        let prefix = BidsPrefix {
            subject: "torontoDCM003".parse().unwrap(),
            sample: None,
        };
        assert_eq!(
            prefix.filename("acq-cspine_T1w.nii.gz"),
            "sub-torontoDCM003_acq-cspine_T1w.nii.gz"
        );
    }
}
