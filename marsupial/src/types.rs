//! Type definitions shared by the bridge, the native backends and the C ABI

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Axis-aligned rectangle in image pixel coordinates
///
/// `width` and `height` count pixels, so the native (inclusive) corners are
/// `right = left + width - 1` and `bottom = top + height - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
}

impl BoundingBox {
    /// Create new bounding box
    pub fn new(top: i64, left: i64, width: i64, height: i64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Build from inclusive corner coordinates
    pub fn from_corners(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            top,
            left,
            width: right - left + 1,
            height: bottom - top + 1,
        }
    }

    /// Inclusive right edge
    pub fn right(&self) -> i64 {
        self.left + self.width - 1
    }

    /// Inclusive bottom edge
    pub fn bottom(&self) -> i64 {
        self.top + self.height - 1
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) * self.height.max(0)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// One labeled training image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRecord {
    /// Absolute path of the image file
    pub image_file_name: PathBuf,
    /// Every object instance visible in the image
    #[serde(alias = "matchAreas")]
    pub bounding_boxes: Vec<BoundingBox>,
}

impl TrainingRecord {
    /// Create new training record
    pub fn new<P: Into<PathBuf>>(image_file_name: P, bounding_boxes: Vec<BoundingBox>) -> Self {
        Self {
            image_file_name: image_file_name.into(),
            bounding_boxes,
        }
    }

    /// Add one more labeled box
    pub fn with_box(mut self, bbox: BoundingBox) -> Self {
        self.bounding_boxes.push(bbox);
        self
    }

    /// Make a relative image path absolute against `base`
    pub fn resolve_against(mut self, base: &Path) -> Self {
        if self.image_file_name.is_relative() {
            self.image_file_name = base.join(&self.image_file_name);
        }
        self
    }
}

/// Load a JSON array of training records
///
/// Relative `imageFileName` entries are resolved against the directory holding
/// the JSON file.
pub fn load_training_records<P: AsRef<Path>>(path: P) -> crate::Result<Vec<TrainingRecord>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let records: Vec<TrainingRecord> = serde_json::from_str(&contents)?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let records = records
        .into_iter()
        .map(|record| record.resolve_against(base))
        .collect::<Vec<_>>();

    log::debug!(
        "Loaded {} training records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Single detected object instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    /// Detector score, when the native layer reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Detection {
    /// Create new detection
    pub fn new(bbox: BoundingBox, confidence: Option<f64>) -> Self {
        Self { bbox, confidence }
    }
}

/// Ordered detections for one image, exactly as the native layer produced them
pub type DetectionResult = Vec<Detection>;

/// Parameters forwarded to the native structural SVM trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Threads used by the native trainer
    pub num_threads: u32,

    /// SVM regularization parameter
    pub c: f64,

    /// Stopping tolerance of the optimizer
    pub epsilon: f64,

    /// Detection window area, in pixels
    pub target_size: u64,

    /// Number of times images are upsampled before training
    pub upsample_amount: u32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            c: 1.0,
            epsilon: 0.01,
            target_size: 80 * 80,
            upsample_amount: 0,
        }
    }
}
