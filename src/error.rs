use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Output destination {0} does not exist")]
    MissingOutputDir(String),

    #[error("Output destination must be a directory")]
    OutputNotDirectory,

    #[error("Unable to read input file {path}: {source}")]
    InputUnreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("Unable to parse session file {path}: {source}")]
    SessionParse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Can't read report template file: {0}")]
    TemplateUnreadable(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}
