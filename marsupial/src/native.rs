/// Seam between the async bridge and the native object-detection library
///
/// The bridge only ever talks to a `NativeBackend`. Each method is a single
/// blocking call; implementations may take seconds to minutes (training) and
/// must never be invoked on the caller's async context.
use crate::types::{Detection, TrainerConfig, TrainingRecord};
use std::fmt;
use std::path::Path;

/// Failure payload produced by the native layer
///
/// This is whatever text the native library reported (the `what()` of a C++
/// exception, for dlib). The bridge forwards it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeError {
    message: String,
}

impl NativeError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Payload used when the native layer threw something it could not describe
    pub fn unknown() -> Self {
        Self::new("Unknown exception happened")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for NativeError {}

impl From<String> for NativeError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for NativeError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Common interface for the native training and detection routines
pub trait NativeBackend: Send + Sync {
    /// Train a detector from labeled images and serialize it to `output_path`
    ///
    /// The file at `output_path` is overwritten if it exists.
    fn train_object_detector(
        &self,
        records: &[TrainingRecord],
        output_path: &Path,
        config: &TrainerConfig,
    ) -> Result<(), NativeError>;

    /// Run the detector stored at `detector_path` against one image
    fn detect_objects(
        &self,
        image_path: &Path,
        detector_path: &Path,
    ) -> Result<Vec<Detection>, NativeError>;

    /// Backend name (for logging/debugging)
    fn name(&self) -> &str;
}

/// Backend selection for hosts that do not construct one themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// dlib's FHOG scanner with a structural SVM trainer
    #[cfg(feature = "dlib")]
    Dlib,
    /// In-process stand-in that follows the native contracts
    Stub,
}

impl BackendType {
    /// The backend used when nothing else is requested
    pub fn preferred() -> Self {
        #[cfg(feature = "dlib")]
        {
            BackendType::Dlib
        }
        #[cfg(not(feature = "dlib"))]
        {
            BackendType::Stub
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "dlib")]
            BackendType::Dlib => "dlib",
            BackendType::Stub => "stub",
        }
    }

    /// Create a backend instance of this type
    pub fn create(&self) -> std::sync::Arc<dyn NativeBackend> {
        match self {
            #[cfg(feature = "dlib")]
            BackendType::Dlib => std::sync::Arc::new(crate::dlib::DlibBackend::new()),
            BackendType::Stub => std::sync::Arc::new(crate::backend_stub::StubBackend::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_identity() {
        let a = NativeError::new("error");
        let b: NativeError = "error".into();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "error");
    }

    #[test]
    fn test_unknown_payload() {
        assert_eq!(NativeError::unknown().message(), "Unknown exception happened");
    }

    #[test]
    fn test_preferred_backend_is_constructible() {
        let backend = BackendType::preferred().create();
        assert!(!backend.name().is_empty());
    }
}
