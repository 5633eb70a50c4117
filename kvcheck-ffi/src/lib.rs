//! C FFI bindings for kvcheck
//!
//! Exposes a file-level check to C callers: open a database file, run the
//! full consistency check and hand back every finding as a C string.

use kvcheck::check::{self, CheckOptions};
use kvcheck::storage::tx::{OpenOptions, Tx};
use kvcheck::Error;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

/// Success
pub const KVCHECK_OK: c_int = 0;
/// A required pointer was null or the path was not UTF-8
pub const KVCHECK_ERR_INVALID_ARGUMENT: c_int = 1;
/// The file could not be read or mapped
pub const KVCHECK_ERR_IO: c_int = 2;
/// The file is not a readable database image, or the check hit an unresolvable page
pub const KVCHECK_ERR_CORRUPTION: c_int = 3;
/// Any other failure
pub const KVCHECK_ERR_INTERNAL: c_int = 4;

/// FFI-safe result type
#[repr(C)]
pub struct KvcheckResult {
    /// Success/failure indicator (0 = success, non-zero = error)
    pub code: c_int,
    /// Error message (null if success)
    pub message: *mut c_char,
}

impl KvcheckResult {
    fn success() -> Self {
        Self {
            code: KVCHECK_OK,
            message: ptr::null_mut(),
        }
    }

    fn error(code: c_int, message: &str) -> Self {
        Self {
            code,
            message: to_c_string(message).into_raw(),
        }
    }

    fn from_error(err: &Error) -> Self {
        let code = if err.is_io() {
            KVCHECK_ERR_IO
        } else if err.is_corruption() {
            KVCHECK_ERR_CORRUPTION
        } else {
            KVCHECK_ERR_INTERNAL
        };
        Self::error(code, &err.to_string())
    }
}

/// Findings of one check, one message per finding
#[repr(C)]
pub struct KvcheckReport {
    /// Number of messages
    pub count: usize,
    /// Array of `count` null-terminated messages (null when `count` is 0)
    pub messages: *mut *mut c_char,
}

impl KvcheckReport {
    fn empty() -> Self {
        Self {
            count: 0,
            messages: ptr::null_mut(),
        }
    }

    fn from_messages(messages: Vec<String>) -> Self {
        if messages.is_empty() {
            return Self::empty();
        }
        let raw: Box<[*mut c_char]> = messages
            .iter()
            .map(|m| to_c_string(m).into_raw())
            .collect();
        let count = raw.len();
        Self {
            count,
            messages: Box::into_raw(raw).cast::<*mut c_char>(),
        }
    }
}

fn to_c_string(s: &str) -> CString {
    CString::new(s.replace('\0', " ")).unwrap_or_default()
}

/// Get the kvcheck library version
///
/// The caller must free the returned string with `kvcheck_free_string`.
#[no_mangle]
pub extern "C" fn kvcheck_version() -> *mut c_char {
    to_c_string(kvcheck::VERSION).into_raw()
}

/// Get version components
///
/// # Safety
/// Each output parameter must be null or a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn kvcheck_version_components(major: *mut u32, minor: *mut u32, patch: *mut u32) {
    if !major.is_null() {
        unsafe {
            *major = kvcheck::VERSION_MAJOR;
        }
    }
    if !minor.is_null() {
        unsafe {
            *minor = kvcheck::VERSION_MINOR;
        }
    }
    if !patch.is_null() {
        unsafe {
            *patch = kvcheck::VERSION_PATCH;
        }
    }
}

/// Initialize the kvcheck logging system
///
/// This should be called once at application startup.
#[no_mangle]
pub extern "C" fn kvcheck_init_logging() -> KvcheckResult {
    kvcheck::common::logging::init();
    KvcheckResult::success()
}

/// Check the database file at `path`
///
/// On success `out_report` receives every finding rendered as text, with
/// keys in hex; an empty report means the file is consistent. On failure
/// `out_report` is left empty. Free the report with `kvcheck_free_report`
/// and the result with `kvcheck_free_result`.
///
/// # Safety
/// `path` must be null or a valid null-terminated string. `out_report`
/// must be null or a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn kvcheck_check_file(path: *const c_char, out_report: *mut KvcheckReport) -> KvcheckResult {
    if path.is_null() || out_report.is_null() {
        return KvcheckResult::error(KVCHECK_ERR_INVALID_ARGUMENT, "path and out_report must not be null");
    }
    unsafe {
        *out_report = KvcheckReport::empty();
    }

    let path = match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(path) => path,
        Err(_) => return KvcheckResult::error(KVCHECK_ERR_INVALID_ARGUMENT, "path is not valid UTF-8"),
    };

    let findings = Tx::open_file(path, &OpenOptions::new()).and_then(|tx| check::collect(&tx, CheckOptions::default()));
    match findings {
        Ok(findings) => {
            let messages = findings.iter().map(ToString::to_string).collect();
            unsafe {
                *out_report = KvcheckReport::from_messages(messages);
            }
            KvcheckResult::success()
        }
        Err(e) => KvcheckResult::from_error(&e),
    }
}

/// Free a report filled by `kvcheck_check_file`
///
/// # Safety
/// The report must have been filled by `kvcheck_check_file` and not freed before.
#[no_mangle]
pub unsafe extern "C" fn kvcheck_free_report(report: *mut KvcheckReport) {
    if report.is_null() {
        return;
    }
    unsafe {
        let report = &mut *report;
        if !report.messages.is_null() {
            let raw = Box::from_raw(ptr::slice_from_raw_parts_mut(report.messages, report.count));
            for message in raw.iter() {
                if !message.is_null() {
                    drop(CString::from_raw(*message));
                }
            }
        }
        *report = KvcheckReport::empty();
    }
}

/// Free a string allocated by kvcheck
///
/// # Safety
/// The string must have been allocated by a kvcheck FFI function.
/// After calling this function, the pointer is invalid and must not be used.
#[no_mangle]
pub unsafe extern "C" fn kvcheck_free_string(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}

/// Free a `KvcheckResult`
///
/// This frees any allocated error message in the result.
///
/// # Safety
/// The result must have been returned by a kvcheck FFI function.
#[no_mangle]
pub unsafe extern "C" fn kvcheck_free_result(result: *mut KvcheckResult) {
    if !result.is_null() {
        unsafe {
            let result = &mut *result;
            if !result.message.is_null() {
                drop(CString::from_raw(result.message));
                result.message = ptr::null_mut();
            }
        }
    }
}
