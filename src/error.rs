use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CurateError {
    #[error("input path does not exist: {0}")]
    InputMissing(Utf8PathBuf),

    #[error("unknown dataset preset: {0}")]
    UnknownDataset(String),

    #[error("failed to read dataset config at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid dataset config: {0}")]
    ConfigInvalid(String),

    #[error("invalid subject token: {0}")]
    InvalidSubjectToken(String),

    #[error("invalid sample token: {0}")]
    InvalidSampleToken(String),

    #[error("subject collision: {existing} and {incoming} both resolve to {subject}")]
    SubjectCollision {
        subject: String,
        existing: String,
        incoming: String,
    },

    #[error("failed to decode metadata file {path}: {message}")]
    MetadataDecode { path: Utf8PathBuf, message: String },

    #[error("derived image producer failed: {0}")]
    ProducerFailed(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
