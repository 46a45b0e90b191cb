//! FFI binding to the dlib shim (`native/marsupial_shim.cc`)
//!
//! The shim catches every C++ exception and hands back its `what()` text,
//! which becomes the [`NativeError`] payload without further interpretation.

use crate::native::{NativeBackend, NativeError};
use crate::types::{BoundingBox, Detection, TrainerConfig, TrainingRecord};

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_long, c_uint, c_ulong};
use std::path::Path;
use std::ptr;
use std::slice;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CRect {
    top: c_long,
    left: c_long,
    width: c_long,
    height: c_long,
    confidence: c_double,
}

#[repr(C)]
struct CRecord {
    image_file_name: *const c_char,
    boxes: *const CRect,
    box_count: usize,
}

#[repr(C)]
struct CTrainerOptions {
    num_threads: c_uint,
    c: c_double,
    epsilon: c_double,
    target_size: c_ulong,
    upsample_amount: c_uint,
}

extern "C" {
    fn marsupial_train(
        records: *const CRecord,
        record_count: usize,
        output_file_name: *const c_char,
        options: *const CTrainerOptions,
    ) -> *mut c_char;

    fn marsupial_detect(
        image_file_name: *const c_char,
        detector_file_name: *const c_char,
        results: *mut *mut CRect,
        result_count: *mut usize,
    ) -> *mut c_char;

    fn marsupial_free_rects(rects: *mut CRect);

    fn marsupial_free_error(error: *mut c_char);
}

impl From<&BoundingBox> for CRect {
    fn from(bbox: &BoundingBox) -> Self {
        CRect {
            top: bbox.top as c_long,
            left: bbox.left as c_long,
            width: bbox.width as c_long,
            height: bbox.height as c_long,
            confidence: 0.0,
        }
    }
}

impl From<&CRect> for Detection {
    fn from(rect: &CRect) -> Self {
        Detection::new(
            BoundingBox::new(
                rect.top as i64,
                rect.left as i64,
                rect.width as i64,
                rect.height as i64,
            ),
            Some(rect.confidence),
        )
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, NativeError> {
    let text = path
        .to_str()
        .ok_or_else(|| NativeError::new(format!("Path is not valid UTF-8: {}", path.display())))?;
    CString::new(text)
        .map_err(|_| NativeError::new(format!("Path contains a NUL byte: {}", path.display())))
}

/// Take ownership of an error string returned by the shim
fn take_error(error: *mut c_char) -> Result<(), NativeError> {
    if error.is_null() {
        return Ok(());
    }
    let message = unsafe { CStr::from_ptr(error) }
        .to_string_lossy()
        .into_owned();
    unsafe { marsupial_free_error(error) };
    Err(NativeError::new(message))
}

/// dlib FHOG + structural SVM detector
#[derive(Debug, Default)]
pub struct DlibBackend;

impl DlibBackend {
    pub fn new() -> Self {
        DlibBackend
    }
}

impl NativeBackend for DlibBackend {
    fn train_object_detector(
        &self,
        records: &[TrainingRecord],
        output_path: &Path,
        config: &TrainerConfig,
    ) -> Result<(), NativeError> {
        // Owned buffers must outlive the call; CRecord only borrows them
        let names = records
            .iter()
            .map(|r| path_to_cstring(&r.image_file_name))
            .collect::<Result<Vec<_>, _>>()?;
        let boxes: Vec<Vec<CRect>> = records
            .iter()
            .map(|r| r.bounding_boxes.iter().map(CRect::from).collect())
            .collect();
        let c_records: Vec<CRecord> = names
            .iter()
            .zip(&boxes)
            .map(|(name, boxes)| CRecord {
                image_file_name: name.as_ptr(),
                boxes: boxes.as_ptr(),
                box_count: boxes.len(),
            })
            .collect();

        let output = path_to_cstring(output_path)?;
        let options = CTrainerOptions {
            num_threads: config.num_threads as c_uint,
            c: config.c,
            epsilon: config.epsilon,
            target_size: config.target_size as c_ulong,
            upsample_amount: config.upsample_amount as c_uint,
        };

        let error = unsafe {
            marsupial_train(
                c_records.as_ptr(),
                c_records.len(),
                output.as_ptr(),
                &options,
            )
        };
        take_error(error)
    }

    fn detect_objects(
        &self,
        image_path: &Path,
        detector_path: &Path,
    ) -> Result<Vec<Detection>, NativeError> {
        let image = path_to_cstring(image_path)?;
        let detector = path_to_cstring(detector_path)?;

        let mut results: *mut CRect = ptr::null_mut();
        let mut count: usize = 0;
        let error =
            unsafe { marsupial_detect(image.as_ptr(), detector.as_ptr(), &mut results, &mut count) };
        take_error(error)?;

        if results.is_null() || count == 0 {
            return Ok(Vec::new());
        }

        let detections = unsafe { slice::from_raw_parts(results, count) }
            .iter()
            .map(Detection::from)
            .collect();
        unsafe { marsupial_free_rects(results) };
        Ok(detections)
    }

    fn name(&self) -> &str {
        "dlib"
    }
}
