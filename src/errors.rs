use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for FluoroQuant
#[derive(Error, Debug)]
pub enum FluoroQuantError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Image format error: {0}")]
    Format(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FluoroQuantError {
    /// Whether this error should abort the whole run.
    ///
    /// Processing errors are confined to the channel (or ROI) that raised
    /// them; every other kind is raised before or outside per-channel work.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FluoroQuantError::Processing(_))
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, FluoroQuantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_errors_are_not_fatal() {
        assert!(!FluoroQuantError::Processing("empty channel".into()).is_fatal());
        assert!(FluoroQuantError::Config("rolling_radius must be > 0".into()).is_fatal());
        assert!(FluoroQuantError::Format("bad layout".into()).is_fatal());
    }

    #[test]
    fn messages_name_the_category() {
        let err = FluoroQuantError::Config("brdu_threshold must be within [0, 255]".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: brdu_threshold must be within [0, 255]"
        );
    }
}
