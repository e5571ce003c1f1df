use std::path::PathBuf;
use thiserror::Error;

/// Malformed input text or page map. Fatal for the document it names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("Document '{document_id}' has no text to segment")]
    EmptyInput { document_id: String },

    #[error("Document '{document_id}' has an inconsistent page map: {reason}")]
    InconsistentPageMap { document_id: String, reason: String },

    #[error("Document '{document_id}': page boundary at offset {offset} is past the end of the text ({len} chars)")]
    BoundaryOutOfRange {
        document_id: String,
        offset: usize,
        len: usize,
    },
}

impl SegmentationError {
    pub fn document_id(&self) -> &str {
        match self {
            SegmentationError::EmptyInput { document_id }
            | SegmentationError::InconsistentPageMap { document_id, .. }
            | SegmentationError::BoundaryOutOfRange { document_id, .. } => document_id,
        }
    }
}

/// Missing or invalid rule/taxonomy configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to read rule configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid pattern in rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid goal taxonomy: {0}")]
    Taxonomy(String),
}

impl ConfigurationError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Document id '{0}' is used by more than one document in the request")]
    DuplicateDocument(String),
}
