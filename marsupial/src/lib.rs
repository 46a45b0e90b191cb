//! Marsupial: async bridge to dlib's object detector
//!
//! Trains sliding-window HOG/SVM detectors from labeled images and runs them
//! against new images. Both routines are long, blocking native calls; the
//! bridge runs each one on a background worker and hands the caller a
//! [`CompletionHandle`] (or an error-first callback across the C ABI).
//!
//! ```rust,ignore
//! use marsupial::{AsyncBridge, BackendType, TrainingRecord, BoundingBox};
//!
//! let bridge = AsyncBridge::from_current(BackendType::preferred().create())?;
//! let records = vec![TrainingRecord::new("/data/sign.jpg", vec![BoundingBox::new(130, 395, 218, 218)])];
//! bridge.train_object_detector(records, "/tmp/object_detector.svm").await?;
//! let found = bridge.detect_objects("/data/probe.jpg", "/tmp/object_detector.svm").await?;
//! ```

pub mod backend_stub;
pub mod bridge;
#[cfg(feature = "dlib")]
pub mod dlib;
pub mod error;
pub mod ffi;
pub mod native;
pub mod orchestrator;
pub mod types;

pub use bridge::{AsyncBridge, BridgeConfig, CompletionHandle};
pub use error::{MarsupialError, Result};
pub use native::{BackendType, NativeBackend, NativeError};
pub use types::{
    load_training_records, BoundingBox, Detection, DetectionResult, TrainerConfig, TrainingRecord,
};

/// Initialize the library
/// Safe to call more than once
pub fn init() -> Result<()> {
    log::info!(
        "Marsupial {} initialized ({} backend)",
        version(),
        BackendType::preferred().name()
    );
    Ok(())
}

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
