// In-process stand-in for the native library
//
// Follows the same contracts as the dlib backend: training writes an artifact
// at the output path, detection fails on an unreadable artifact or image, and
// results come back in a fixed order. The "model" simply memorizes the boxes
// of every training image, which is enough for hosts without dlib and for
// exercising the bridge.

use crate::native::{NativeBackend, NativeError};
use crate::types::{BoundingBox, Detection, TrainerConfig, TrainingRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const STUB_FORMAT: &str = "marsupial-stub-v1";

/// Serialized form of a stub "detector"
#[derive(Debug, Serialize, Deserialize)]
struct StubModel {
    format: String,
    window: (u64, u64),
    samples: Vec<TrainingRecord>,
}

/// Stub implementation of the native backend
#[derive(Debug, Default)]
pub struct StubBackend {
    failure: Option<NativeError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `err`
    pub fn failing<E: Into<NativeError>>(err: E) -> Self {
        Self {
            failure: Some(err.into()),
            ..Self::default()
        }
    }

    /// Block each call for `delay` before doing any work
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of native calls executed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), NativeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn check_image(path: &Path) -> Result<(), NativeError> {
    image::image_dimensions(path)
        .map(|_| ())
        .map_err(|e| NativeError::new(format!("Unable to open {}: {}", path.display(), e)))
}

/// Average box shape scaled to `target_size` pixels of area
fn pick_window_size(records: &[TrainingRecord], target_size: u64) -> (u64, u64) {
    let boxes: Vec<&BoundingBox> = records.iter().flat_map(|r| &r.bounding_boxes).collect();
    if boxes.is_empty() {
        return (1, 1);
    }

    let n = boxes.len() as f64;
    let avg_width = boxes.iter().map(|b| b.width as f64).sum::<f64>() / n;
    let avg_height = boxes.iter().map(|b| b.height as f64).sum::<f64>() / n;
    let scale = (target_size as f64 / (avg_width * avg_height)).sqrt();

    let width = ((avg_width * scale + 0.5) as u64).max(1);
    let height = ((avg_height * scale + 0.5) as u64).max(1);
    (width, height)
}

impl NativeBackend for StubBackend {
    fn train_object_detector(
        &self,
        records: &[TrainingRecord],
        output_path: &Path,
        config: &TrainerConfig,
    ) -> Result<(), NativeError> {
        self.enter()?;

        if records.is_empty() {
            return Err(NativeError::new("No training images given"));
        }
        for record in records {
            check_image(&record.image_file_name)?;
            if record.bounding_boxes.iter().any(|b| b.area() == 0) {
                return Err(NativeError::new(
                    "An impossible set of object boxes was given for training.",
                ));
            }
        }

        let model = StubModel {
            format: STUB_FORMAT.to_string(),
            window: pick_window_size(records, config.target_size),
            samples: records.to_vec(),
        };
        let bytes = serde_json::to_vec(&model).map_err(|e| NativeError::new(e.to_string()))?;
        fs::write(output_path, bytes).map_err(|e| {
            NativeError::new(format!(
                "Unable to write detector to {}: {}",
                output_path.display(),
                e
            ))
        })
    }

    fn detect_objects(
        &self,
        image_path: &Path,
        detector_path: &Path,
    ) -> Result<Vec<Detection>, NativeError> {
        self.enter()?;

        let bytes = fs::read(detector_path)
            .map_err(|_| NativeError::new("Cannot load svm detector file"))?;
        let model: StubModel = serde_json::from_slice(&bytes)
            .map_err(|_| NativeError::new("Cannot load svm detector file"))?;
        if model.format != STUB_FORMAT {
            return Err(NativeError::new("Cannot load svm detector file"));
        }

        check_image(image_path)?;

        Ok(model
            .samples
            .iter()
            .filter(|sample| sample.image_file_name == image_path)
            .flat_map(|sample| sample.bounding_boxes.iter())
            .map(|bbox| Detection::new(*bbox, None))
            .collect())
    }

    fn name(&self) -> &str {
        "stub"
    }
}
