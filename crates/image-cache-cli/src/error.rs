//! Error types for the image cache CLI

use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Image(Box<image::ImageError>),
    Io(Box<std::io::Error>),
    Json(String),
    Config(String),
    NotCached(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Image(err) => write!(f, "Image error: {}", err),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Json(msg) => write!(f, "JSON error: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::NotCached(key) => write!(f, "No cached image for key: {}", key),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Image(err) => Some(err.as_ref()),
            CliError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<image::ImageError> for CliError {
    fn from(err: image::ImageError) -> Self {
        CliError::Image(Box::new(err))
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for CliError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CliError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_cached_display() {
        let err = CliError::NotCached("heron".to_string());
        assert_eq!(format!("{}", err), "No cached image for key: heron");
    }

    #[test]
    fn test_config_error_display() {
        let err = CliError::Config("unknown image format: bmpx".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: unknown image format: bmpx"
        );
    }

    #[test]
    fn test_io_error_has_source() {
        let err = CliError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
