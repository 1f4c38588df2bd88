//! Error types for the image cache
//!
//! These never cross the public cache operations: every failure is logged and
//! degrades to a miss or a no-op at the boundary.

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
    Image(Box<image::ImageError>),
}

impl CacheError {
    /// True when the underlying filesystem error is a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Image(err) => write!(f, "Image codec error: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Image(err) => Some(err.as_ref()),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        CacheError::Image(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_display() {
        let err = CacheError::from(Error::new(ErrorKind::PermissionDenied, "read-only"));
        assert_eq!(format!("{}", err), "IO error: read-only");
    }

    #[test]
    fn test_is_not_found() {
        let missing = CacheError::from(Error::new(ErrorKind::NotFound, "gone"));
        assert!(missing.is_not_found());

        let denied = CacheError::from(Error::new(ErrorKind::PermissionDenied, "nope"));
        assert!(!denied.is_not_found());
    }

    #[test]
    fn test_image_error_has_source() {
        let decode = image::load_from_memory(b"definitely not an image").unwrap_err();
        let err = CacheError::from(decode);
        assert!(format!("{}", err).starts_with("Image codec error"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
