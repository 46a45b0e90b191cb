//! C FFI (Foreign Function Interface) bindings for scripting hosts
//!
//! Hosts call `marsupial_init` once, then dispatch training and detection with
//! an error-first completion callback. The call returns immediately; the
//! callback fires exactly once, on a worker thread, when the native routine
//! finishes. `error` is NULL on success. Strings handed to a callback are only
//! valid for the duration of that callback.
//!
//! A negative return value means the arguments could not be marshaled and the
//! callback will never fire.

use crate::bridge::{AsyncBridge, BridgeConfig};
use crate::error::{MarsupialError, Result};
use crate::native::{BackendType, NativeBackend};
use crate::types::TrainingRecord;

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

pub const MARSUPIAL_OK: c_int = 0;
pub const MARSUPIAL_ERR_NOT_INITIALIZED: c_int = -1;
pub const MARSUPIAL_ERR_INVALID_ARGUMENT: c_int = -2;
pub const MARSUPIAL_ERR_RUNTIME: c_int = -3;

/// `callback(error, user_data)`
pub type TrainCallback = extern "C" fn(error: *const c_char, user_data: *mut c_void);

/// `callback(error, results_json, user_data)`; `results_json` is NULL on error
pub type DetectCallback =
    extern "C" fn(error: *const c_char, results_json: *const c_char, user_data: *mut c_void);

// Global bridge shared by every FFI call
static BRIDGE: Mutex<Option<AsyncBridge>> = Mutex::new(None);

fn bridge() -> MutexGuard<'static, Option<AsyncBridge>> {
    BRIDGE.lock().unwrap_or_else(|e| e.into_inner())
}

/// Opaque host pointer carried to the worker thread and back
struct UserData(*mut c_void);

// The host owns whatever `user_data` points to and promises it is usable from
// the callback thread.
unsafe impl Send for UserData {}

fn status_of(err: &MarsupialError) -> c_int {
    match err {
        MarsupialError::NotInitialized => MARSUPIAL_ERR_NOT_INITIALIZED,
        MarsupialError::InvalidArgument(_) | MarsupialError::Serialization(_) => {
            MARSUPIAL_ERR_INVALID_ARGUMENT
        }
        _ => MARSUPIAL_ERR_RUNTIME,
    }
}

fn to_c_message(message: String) -> CString {
    CString::new(message.replace('\0', " ")).unwrap_or_default()
}

unsafe fn str_arg<'a>(ptr: *const c_char, name: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(MarsupialError::invalid_argument(format!("{} is null", name)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| MarsupialError::invalid_argument(format!("{} is not valid UTF-8", name)))
}

/// Replace the backend used by the FFI surface (and start the bridge if needed)
pub fn install_backend(backend: Arc<dyn NativeBackend>) -> Result<()> {
    let new_bridge = AsyncBridge::new(backend, BridgeConfig::default())?;
    let old = bridge().replace(new_bridge);
    drop(old);
    Ok(())
}

/// Initialize the bridge with the preferred native backend
#[no_mangle]
pub extern "C" fn marsupial_init() -> c_int {
    // Held until the bridge is in place so concurrent inits start one runtime
    let mut guard = bridge();
    if guard.is_some() {
        return MARSUPIAL_OK;
    }
    if let Err(e) = crate::init() {
        return status_of(&e);
    }
    match AsyncBridge::new(BackendType::preferred().create(), BridgeConfig::default()) {
        Ok(new_bridge) => {
            *guard = Some(new_bridge);
            MARSUPIAL_OK
        }
        Err(e) => {
            log::error!("Failed to start bridge: {}", e);
            status_of(&e)
        }
    }
}

/// Get library version (static string, do not free)
#[no_mangle]
pub extern "C" fn marsupial_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Describe a status code (static string, do not free)
#[no_mangle]
pub extern "C" fn marsupial_status_message(status: c_int) -> *const c_char {
    let message: &'static str = match status {
        MARSUPIAL_OK => "ok\0",
        MARSUPIAL_ERR_NOT_INITIALIZED => "bridge not initialized\0",
        MARSUPIAL_ERR_INVALID_ARGUMENT => "invalid argument\0",
        MARSUPIAL_ERR_RUNTIME => "runtime error\0",
        _ => "unknown status\0",
    };
    message.as_ptr() as *const c_char
}

fn train_impl(
    records_json: *const c_char,
    output_path: *const c_char,
    callback: Option<TrainCallback>,
    user_data: *mut c_void,
) -> Result<()> {
    let callback =
        callback.ok_or_else(|| MarsupialError::invalid_argument("callback is null"))?;
    let records_json = unsafe { str_arg(records_json, "records_json")? };
    let output_path = unsafe { str_arg(output_path, "output_path")? }.to_string();
    let records: Vec<TrainingRecord> = serde_json::from_str(records_json)?;

    let guard = bridge();
    let bridge = guard.as_ref().ok_or(MarsupialError::NotInitialized)?;

    let user_data = UserData(user_data);
    bridge.train_object_detector_with(records, output_path, move |outcome| {
        let user_data = user_data;
        match outcome {
            Ok(()) => callback(ptr::null(), user_data.0),
            Err(e) => {
                let message = to_c_message(e.to_string());
                callback(message.as_ptr(), user_data.0);
            }
        }
    });
    Ok(())
}

/// Train an object detector
///
/// `records_json` is a JSON array of `{ "imageFileName", "boundingBoxes" }`
/// objects; `output_path` is overwritten by the trained detector.
#[no_mangle]
pub extern "C" fn marsupial_train_object_detector(
    records_json: *const c_char,
    output_path: *const c_char,
    callback: Option<TrainCallback>,
    user_data: *mut c_void,
) -> c_int {
    match train_impl(records_json, output_path, callback, user_data) {
        Ok(()) => MARSUPIAL_OK,
        Err(e) => {
            log::debug!("Rejected training call: {}", e);
            status_of(&e)
        }
    }
}

fn detect_impl(
    image_path: *const c_char,
    detector_path: *const c_char,
    callback: Option<DetectCallback>,
    user_data: *mut c_void,
) -> Result<()> {
    let callback =
        callback.ok_or_else(|| MarsupialError::invalid_argument("callback is null"))?;
    let image_path = unsafe { str_arg(image_path, "image_path")? }.to_string();
    let detector_path = unsafe { str_arg(detector_path, "detector_path")? }.to_string();

    let guard = bridge();
    let bridge = guard.as_ref().ok_or(MarsupialError::NotInitialized)?;

    let user_data = UserData(user_data);
    bridge.detect_objects_with(image_path, detector_path, move |outcome| {
        let user_data = user_data;
        let encoded = outcome.and_then(|detections| Ok(serde_json::to_string(&detections)?));
        match encoded {
            Ok(json) => {
                let json = to_c_message(json);
                callback(ptr::null(), json.as_ptr(), user_data.0);
            }
            Err(e) => {
                let message = to_c_message(e.to_string());
                callback(message.as_ptr(), ptr::null(), user_data.0);
            }
        }
    });
    Ok(())
}

/// Detect objects in an image with a previously trained detector
///
/// On success `results_json` is a JSON array of
/// `{ "top", "left", "width", "height", "confidence" }` objects.
#[no_mangle]
pub extern "C" fn marsupial_detect_objects(
    image_path: *const c_char,
    detector_path: *const c_char,
    callback: Option<DetectCallback>,
    user_data: *mut c_void,
) -> c_int {
    match detect_impl(image_path, detector_path, callback, user_data) {
        Ok(()) => MARSUPIAL_OK,
        Err(e) => {
            log::debug!("Rejected detection call: {}", e);
            status_of(&e)
        }
    }
}

/// Release the bridge; in-flight calls still complete and fire their callbacks
#[no_mangle]
pub extern "C" fn marsupial_cleanup() {
    let old = bridge().take();
    drop(old);
}
