use thiserror::Error;

/// Per-record failures. Every variant is caught at the orchestrator boundary
/// and reported to the collaborator as the `error` status.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("unsupported filetype: no registered dialect matches the file")]
    UnsupportedFiletype,
    #[error("decoding error: {0}")]
    Decoding(String),
    #[error("degenerate numeric input: {0}")]
    NumericDegenerateInput(String),
    #[error("THz analysis failed: {0}")]
    Analysis(String),
    #[error("collaborator call failed: {0}")]
    Collaborator(String),
    #[error("invalid record metadata: {0}")]
    Metadata(String),
}

impl ProcessingError {
    pub fn decoding(msg: impl Into<String>) -> Self {
        ProcessingError::Decoding(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        ProcessingError::Analysis(msg.into())
    }
}

/// Load-time invariant violations in the dialect registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("dialect {0} declares no line matchers")]
    NoLineMatchers(&'static str),
    #[error("dialect {dialect}: invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        dialect: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("dialect {dialect}: split indices ({start}, {end:?}) leave no body")]
    InvalidSplit {
        dialect: &'static str,
        start: isize,
        end: Option<isize>,
    },
    #[error("dialect {0}: column selection must name at least two distinct columns")]
    InvalidColumns(&'static str),
    #[error("dialect {0}: single-column domain must be finite and increasing")]
    InvalidDomain(&'static str),
}

pub type Result<T, E = ProcessingError> = std::result::Result<T, E>;
